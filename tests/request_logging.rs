//! 内置请求日志切面的端到端行为

mod common;

use std::sync::Arc;

use common::LogCapture;
use crosscut::advice::{
    AdviceDispatcher, AdviceErrorPolicy, AdviceSettings, AdviceToggle, FaultPolicy,
    RequestLoggingAspect,
};
use crosscut::error::Fault;
use crosscut::repository::InMemoryRecordMapper;
use crosscut::{RecordController, RequestContext, RequestMetadata, TargetProxy};
use serde_json::{Value, json};
use tracing::Level;

fn dispatcher(settings: &AdviceSettings) -> AdviceDispatcher {
    let mut builder = settings.registry_builder();
    RequestLoggingAspect::install(&mut builder, settings).unwrap();
    AdviceDispatcher::new(builder.build())
}

fn request(url: &str) -> RequestContext {
    RequestContext::bound(RequestMetadata::parse(url).unwrap())
}

#[test]
fn controller_scenario_logs_every_phase_in_order() {
    let capture = LogCapture::new();
    let result = capture.run(|| {
        let proxy = TargetProxy::new(
            dispatcher(&AdviceSettings::default()),
            "com.crosscut.controller.TestController",
        );
        proxy.invoke(
            "handle",
            vec![json!("1"), json!("2")],
            "String",
            &request("http://localhost:8080/test?a=1&b=2"),
            |_| {
                tracing::info!("target body executed");
                Ok(json!("ok"))
            },
        )
    });

    assert_eq!(result.unwrap(), json!("ok"));
    assert_eq!(capture.count_containing(r#"request parameters: {"a":"1","b":"2"}"#), 1);

    let order = [
        "before advice invoked",
        "target operation: com.crosscut.controller.TestController.handle",
        "request url: http://localhost:8080/test",
        "request parameters:",
        "around advice target method: handle",
        "target body executed",
        "around advice return value: ok",
        "first after-returning advice value: ok",
        "second after-returning advice value: ok",
        "after advice executed",
    ];
    let positions: Vec<usize> = order
        .iter()
        .map(|needle| {
            capture
                .position(needle)
                .unwrap_or_else(|| panic!("missing log line `{needle}` in {:?}", capture.messages()))
        })
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]), "{positions:?}");
}

#[test]
fn zero_argument_calls_do_not_log_parameters() {
    let capture = LogCapture::new();
    let mapper = Arc::new(InMemoryRecordMapper::new());
    let result = capture.run(|| {
        let controller = RecordController::new(dispatcher(&AdviceSettings::default()), mapper);
        controller.index(&request("http://localhost:8080/?a=1"))
    });

    assert_eq!(result.unwrap(), json!("ok"));
    assert_eq!(capture.count_containing("request parameters"), 0);
    assert_eq!(capture.count_containing("request url: http://localhost:8080/"), 1);
    assert_eq!(capture.count_containing("after advice executed"), 1);
}

#[test]
fn insert_goes_through_the_mapper_and_logs_parameters_once() {
    let capture = LogCapture::new();
    let mapper = Arc::new(InMemoryRecordMapper::new());
    let result = capture.run(|| {
        let controller =
            RecordController::new(dispatcher(&AdviceSettings::default()), mapper.clone());
        controller.insert(
            &request("http://localhost:8080/records?name=alice&age=30"),
            "alice",
            30,
        )
    });

    assert_eq!(result.unwrap(), json!("ok"));
    assert_eq!(mapper.len(), 1);
    assert_eq!(
        capture.count_containing(r#"request parameters: {"age":"30","name":"alice"}"#),
        1
    );
}

#[test]
fn null_reference_is_rethrown_and_flagged() {
    let capture = LogCapture::new();
    let mapper = Arc::new(InMemoryRecordMapper::new());
    let result = capture.run(|| {
        let controller = RecordController::new(dispatcher(&AdviceSettings::default()), mapper);
        controller.greet(&request("http://localhost:8080/greet"), None)
    });

    let err = result.unwrap_err();
    assert!(matches!(err.as_fault(), Some(Fault::NullReference(_))));
    assert!(capture.has_level(Level::WARN, "null reference fault raised"));
    assert!(capture.has_level(Level::ERROR, "rethrowing"));
    assert_eq!(capture.count_containing("after-returning advice value"), 0);
    assert!(
        capture.position("after-throwing advice on greet").unwrap()
            < capture.position("after advice executed").unwrap()
    );
}

#[test]
fn suppress_policy_turns_faults_into_null_results() {
    let settings = AdviceSettings {
        fault_policy: FaultPolicy::Suppress,
        ..AdviceSettings::default()
    };
    let capture = LogCapture::new();
    let mapper = Arc::new(InMemoryRecordMapper::new());
    let result = capture.run(|| {
        let controller = RecordController::new(dispatcher(&settings), mapper);
        controller.greet(&request("http://localhost:8080/greet"), None)
    });

    assert_eq!(result.unwrap(), Value::Null);
    assert_eq!(capture.count_containing("after-throwing advice"), 0);
    assert_eq!(capture.count_containing("null reference fault raised"), 0);
    assert_eq!(capture.count_containing("after advice executed"), 1);
}

#[test]
fn detached_calls_fail_fast_unless_before_is_relaxed() {
    let mapper = Arc::new(InMemoryRecordMapper::new());
    let strict = RecordController::new(dispatcher(&AdviceSettings::default()), mapper.clone());
    let err = strict.index(&RequestContext::detached()).unwrap_err();
    assert!(err.is_advice_failure());
    assert!(err.to_string().contains(RequestLoggingAspect::BEFORE));

    let mut settings = AdviceSettings::default();
    settings.toggles.insert(
        RequestLoggingAspect::BEFORE.to_string(),
        AdviceToggle {
            enabled: true,
            error_policy: AdviceErrorPolicy::Ignore,
        },
    );
    let relaxed = RecordController::new(dispatcher(&settings), mapper);
    assert_eq!(relaxed.index(&RequestContext::detached()).unwrap(), json!("ok"));
}

#[test]
fn types_outside_the_pointcut_are_not_logged() {
    let capture = LogCapture::new();
    let result = capture.run(|| {
        let proxy = TargetProxy::new(
            dispatcher(&AdviceSettings::default()),
            "com.crosscut.service.RecordService",
        );
        proxy.invoke(
            "save",
            vec![json!("x")],
            "String",
            &request("http://localhost:8080/save?a=1"),
            |_| Ok(json!("saved")),
        )
    });

    assert_eq!(result.unwrap(), json!("saved"));
    assert_eq!(capture.count_containing("before advice invoked"), 0);
    assert_eq!(capture.count_containing("request parameters"), 0);
}
