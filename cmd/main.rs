//! # Crosscut 演示入口
//!
//! 加载配置、发布生命周期阶段、装配请求日志切面，并发执行几次示例控制器调用。

use std::sync::Arc;

use anyhow::{Context, Result};
use crosscut::advice::{AdviceDispatcher, GlobalAdviceRegistry, RequestLoggingAspect};
use crosscut::config::load_config;
use crosscut::lifecycle::{LifecycleBus, LifecyclePhase};
use crosscut::metrics::gather_metrics;
use crosscut::repository::InMemoryRecordMapper;
use crosscut::tracing::init_tracing_from_config;
use crosscut::{RecordController, RequestContext, RequestMetadata};

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::var("CONFIG_FILE").ok();
    let config = load_config(config_path.as_deref())
        .with_context(|| format!("failed to load configuration from {config_path:?}"))?;
    init_tracing_from_config(Some(&config.logging))?;

    let bus = LifecycleBus::new();
    bus.subscribe(LifecyclePhase::EnvironmentPrepared, |phase: LifecyclePhase| -> anyhow::Result<()> {
        tracing::info!(phase = %phase, "environment prepared event received");
        Ok(())
    })
    .subscribe(LifecyclePhase::Prepared, |phase: LifecyclePhase| -> anyhow::Result<()> {
        tracing::info!(phase = %phase, "application prepared event received");
        Ok(())
    })
    .subscribe(LifecyclePhase::Started, |phase: LifecyclePhase| -> anyhow::Result<()> {
        tracing::info!(phase = %phase, "application started event received");
        Ok(())
    });

    bus.publish(LifecyclePhase::EnvironmentPrepared)?;

    let mut builder = config.advice.registry_builder();
    RequestLoggingAspect::install(&mut builder, &config.advice)
        .context("failed to install request logging aspect")?;
    let registry = GlobalAdviceRegistry::init(builder.build())?;
    let mapper = Arc::new(InMemoryRecordMapper::new());
    let controller = Arc::new(RecordController::new(
        AdviceDispatcher::new(registry),
        mapper.clone(),
    ));
    bus.publish(LifecyclePhase::Prepared)?;
    bus.publish(LifecyclePhase::Started)?;

    tracing::info!(
        service = %config.service.name,
        version = %config.service.version,
        "crosscut demo started"
    );

    let requests = [
        "http://localhost:8080/records?name=alice&age=30",
        "http://localhost:8080/records?name=bob&age=41",
        "http://localhost:8080/",
        "http://localhost:8080/greet",
    ];

    let mut handles = Vec::new();
    for (idx, raw_url) in requests.into_iter().enumerate() {
        let controller = Arc::clone(&controller);
        handles.push(tokio::task::spawn_blocking(move || -> Result<()> {
            let metadata = RequestMetadata::parse(raw_url)?;
            let name = metadata.parameter("name").map(str::to_string);
            let age = metadata.parameter("age").and_then(|age| age.parse::<i32>().ok());
            let request = RequestContext::bound(metadata);

            let outcome = match (idx, name, age) {
                (_, Some(name), Some(age)) => controller.insert(&request, &name, age),
                (2, _, _) => controller.index(&request),
                _ => controller.greet(&request, None),
            };
            match outcome {
                Ok(value) => tracing::info!(url = %raw_url, "request completed: {value}"),
                Err(err) => tracing::warn!(url = %raw_url, error = %err, "request failed"),
            }
            Ok(())
        }));
    }

    for handle in handles {
        handle.await.context("request task panicked")??;
    }

    tracing::info!(records = mapper.len(), "demo finished");
    tracing::debug!("metrics snapshot:\n{}", gather_metrics());
    Ok(())
}
