//! # Prometheus 指标收集模块
//!
//! 记录拦截调用与通知执行情况。

use once_cell::sync::Lazy;
use prometheus::{Histogram, HistogramOpts, IntCounterVec, Opts, Registry};

use crate::advice::AdviceKind;

/// 全局指标注册表
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

static ADVICE_METRICS: Lazy<AdviceMetrics> = Lazy::new(AdviceMetrics::new);

/// 拦截调用的结果分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Returned,
    Faulted,
    AdviceFailed,
}

impl CallOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallOutcome::Returned => "returned",
            CallOutcome::Faulted => "faulted",
            CallOutcome::AdviceFailed => "advice_failed",
        }
    }
}

/// 通知分发指标
pub struct AdviceMetrics {
    /// 被拦截的调用总数
    pub intercepted_calls_total: IntCounterVec,
    /// 通知执行次数
    pub advice_executions_total: IntCounterVec,
    /// 通知失败次数
    pub advice_failures_total: IntCounterVec,
    /// 被拦截调用耗时（秒）
    pub invocation_duration_seconds: Histogram,
}

impl AdviceMetrics {
    pub fn new() -> Self {
        let intercepted_calls_total = IntCounterVec::new(
            Opts::new(
                "crosscut_intercepted_calls_total",
                "Total number of intercepted calls",
            ),
            &["outcome"],
        )
        .expect("Failed to create crosscut_intercepted_calls_total metric");

        let advice_executions_total = IntCounterVec::new(
            Opts::new(
                "crosscut_advice_executions_total",
                "Total number of advice executions",
            ),
            &["kind"],
        )
        .expect("Failed to create crosscut_advice_executions_total metric");

        let advice_failures_total = IntCounterVec::new(
            Opts::new(
                "crosscut_advice_failures_total",
                "Total number of failed advice executions",
            ),
            &["kind", "advice"],
        )
        .expect("Failed to create crosscut_advice_failures_total metric");

        let invocation_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "crosscut_invocation_duration_seconds",
                "Intercepted call duration in seconds, advice included",
            )
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        )
        .expect("Failed to create crosscut_invocation_duration_seconds metric");

        // 注册指标，忽略重复注册错误
        let _ = REGISTRY.register(Box::new(intercepted_calls_total.clone()));
        let _ = REGISTRY.register(Box::new(advice_executions_total.clone()));
        let _ = REGISTRY.register(Box::new(advice_failures_total.clone()));
        let _ = REGISTRY.register(Box::new(invocation_duration_seconds.clone()));

        Self {
            intercepted_calls_total,
            advice_executions_total,
            advice_failures_total,
            invocation_duration_seconds,
        }
    }

    /// 进程级共享实例
    pub fn global() -> &'static AdviceMetrics {
        &ADVICE_METRICS
    }

    pub fn record_advice(&self, kind: AdviceKind) {
        self.advice_executions_total
            .with_label_values(&[kind.as_str()])
            .inc();
    }

    pub fn record_advice_failure(&self, kind: AdviceKind, advice: &str) {
        self.advice_failures_total
            .with_label_values(&[kind.as_str(), advice])
            .inc();
    }

    pub fn record_call(&self, outcome: CallOutcome, seconds: f64) {
        self.intercepted_calls_total
            .with_label_values(&[outcome.as_str()])
            .inc();
        self.invocation_duration_seconds.observe(seconds);
    }
}

impl Default for AdviceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// 获取 Prometheus 指标导出格式
pub fn gather_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!(error = %err, "failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
