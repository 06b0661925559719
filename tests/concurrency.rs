//! 并发调用之间的请求上下文隔离

use std::sync::Arc;

use crosscut::advice::{
    AdviceDispatcher, AdviceMetadata, AdviceRegistry, AfterReturningAdvice, BeforeAdvice,
    JoinPoint, Selector, ValueType,
};
use crosscut::{RequestContext, RequestMetadata, TargetProxy};
use parking_lot::Mutex;
use serde_json::{Value, json};

/// 校验请求参数 `id` 与第一个调用参数一致
struct RequestMatchesArgs {
    mismatches: Arc<Mutex<Vec<String>>>,
}

impl BeforeAdvice for RequestMatchesArgs {
    fn before(&self, jp: &JoinPoint<'_>) -> anyhow::Result<()> {
        let metadata = jp.request_metadata()?;
        let from_request = metadata.parameter("id").unwrap_or_default();
        let from_args = jp.args().first().and_then(Value::as_str).unwrap_or_default();
        if from_request != from_args {
            self.mismatches
                .lock()
                .push(format!("request={from_request} args={from_args}"));
        }
        Ok(())
    }
}

struct CollectResults {
    seen: Arc<Mutex<Vec<(String, Value)>>>,
}

impl AfterReturningAdvice for CollectResults {
    fn after_returning(&self, jp: &JoinPoint<'_>, value: &Value) -> anyhow::Result<()> {
        let id = jp.request_metadata()?.parameter("id").unwrap_or_default().to_string();
        self.seen.lock().push((id, value.clone()));
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_invocations_keep_request_contexts_apart() {
    let mismatches = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::new(Mutex::new(Vec::new()));

    let selector = Arc::new(Selector::parse("execution(* com.crosscut.controller.*.*(..))").unwrap());
    let mut builder = AdviceRegistry::builder();
    builder
        .before(
            AdviceMetadata::named("request-matches-args"),
            selector.clone(),
            RequestMatchesArgs {
                mismatches: mismatches.clone(),
            },
        )
        .after_returning(
            AdviceMetadata::named("collect"),
            selector,
            ValueType::Any,
            CollectResults { seen: seen.clone() },
        );
    let proxy = TargetProxy::new(
        AdviceDispatcher::new(builder.build()),
        "com.crosscut.controller.EchoController",
    );

    let mut handles = Vec::new();
    for i in 0..64 {
        let proxy = proxy.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            let id = i.to_string();
            let request = RequestContext::bound(
                RequestMetadata::parse(&format!("http://localhost/echo?id={id}")).unwrap(),
            );
            proxy.invoke("echo", vec![json!(id)], "String", &request, |args| {
                Ok(json!(format!("echo-{}", args[0].as_str().unwrap_or_default())))
            })
        }));
    }

    for (i, handle) in handles.into_iter().enumerate() {
        let value = handle.await.unwrap().unwrap();
        assert_eq!(value, json!(format!("echo-{i}")));
    }

    assert!(mismatches.lock().is_empty(), "{:?}", mismatches.lock());
    let seen = seen.lock();
    assert_eq!(seen.len(), 64);
    for (id, value) in seen.iter() {
        assert_eq!(value, &json!(format!("echo-{id}")));
    }
}
