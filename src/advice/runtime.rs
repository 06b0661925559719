use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;

use crate::error::{AopError, Fault, Result};
use crate::metrics::{AdviceMetrics, CallOutcome};
use crate::utils::args_to_json;
use crate::utils::context::RequestContext;

use super::registry::{AdviceEntry, AdvicePlan, AdviceRegistry};
use super::types::{AdviceErrorPolicy, JoinPoint, OperationSignature, ProceedingJoinPoint};

/// 通知调度器：包装被匹配的调用并按约定顺序执行通知
///
/// 执行顺序：Before* → Around（或直接执行目标）→ AfterReturning* / AfterThrowing* → After*
#[derive(Clone)]
pub struct AdviceDispatcher {
    registry: Arc<AdviceRegistry>,
}

impl AdviceDispatcher {
    pub fn new(registry: Arc<AdviceRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<AdviceRegistry> {
        &self.registry
    }

    /// 拦截一次调用
    ///
    /// `proceed` 接收实际参数（Around 通知可能替换参数）并执行目标操作。
    /// 目标操作的错误以 `AopError::Fault` 返回；Around 吞掉的错误不会出现在结果中。
    pub fn intercept<F>(
        &self,
        signature: &OperationSignature,
        request: &RequestContext,
        proceed: F,
    ) -> Result<Value>
    where
        F: FnOnce(&[Value]) -> std::result::Result<Value, Fault>,
    {
        let plan = self.registry.plan(signature);
        if plan.is_empty() {
            return proceed(&signature.args).map_err(AopError::Fault);
        }

        let started = Instant::now();
        let jp = JoinPoint::new(signature, request);
        let _span = tracing::debug_span!(
            "intercept",
            operation = %signature.qualified_name(),
            invocation = %jp.invocation_id(),
        )
        .entered();
        tracing::debug!(args = %args_to_json(&signature.args), matched = plan.len(), "intercepting call");

        let outcome = match self.run_before(&plan, &jp) {
            Some(err) => Err(err),
            None => Ok(self.invoke(&plan, jp, proceed)),
        };

        let mut failure = None;
        match &outcome {
            Ok(Ok(value)) => self.run_after_returning(&plan, &jp, value, &mut failure),
            Ok(Err(fault)) => self.run_after_throwing(&plan, &jp, fault, &mut failure),
            Err(_) => {}
        }
        self.run_after(&plan, &jp, &mut failure);

        let result = match outcome {
            Err(err) => Err(err),
            Ok(Ok(value)) => match failure {
                Some(err) => Err(err),
                None => Ok(value),
            },
            Ok(Err(fault)) => {
                if let Some(err) = failure {
                    tracing::error!(
                        error = %err,
                        fault = %fault,
                        "advice failed while handling a fault, returning the original fault"
                    );
                }
                Err(AopError::Fault(fault))
            }
        };

        let call_outcome = match &result {
            Ok(_) => CallOutcome::Returned,
            Err(AopError::Fault(_)) => CallOutcome::Faulted,
            Err(_) => CallOutcome::AdviceFailed,
        };
        AdviceMetrics::global().record_call(call_outcome, started.elapsed().as_secs_f64());
        result
    }

    fn run_before(&self, plan: &AdvicePlan<'_>, jp: &JoinPoint<'_>) -> Option<AopError> {
        for (entry, handler) in plan.before() {
            let outcome = handler.before(jp);
            if let Some(err) = self.settle(entry, outcome) {
                tracing::warn!(
                    advice = %entry.name(),
                    "before advice failed, target operation will not proceed"
                );
                return Some(err);
            }
        }
        None
    }

    fn invoke<'a, F>(
        &self,
        plan: &AdvicePlan<'_>,
        jp: JoinPoint<'a>,
        proceed: F,
    ) -> std::result::Result<Value, Fault>
    where
        F: FnOnce(&[Value]) -> std::result::Result<Value, Fault> + 'a,
    {
        let mut arounds = plan.around();
        let Some((entry, handler)) = arounds.next() else {
            return proceed(&jp.signature().args);
        };
        let ignored: Vec<&str> = arounds.map(|(ignored, _)| ignored.name()).collect();
        if !ignored.is_empty() && self.registry.first_around_conflict(jp.signature()) {
            tracing::warn!(
                active = %entry.name(),
                ignored = ?ignored,
                operation = %jp.signature().qualified_name(),
                "multiple around advice matched, only the first registered one is applied"
            );
        }

        AdviceMetrics::global().record_advice(entry.kind());
        let outcome = handler.around(ProceedingJoinPoint::new(jp, Box::new(proceed)));
        if let Err(fault) = &outcome {
            tracing::debug!(advice = %entry.name(), fault = %fault, "around advice raised");
        }
        outcome
    }

    fn run_after_returning(
        &self,
        plan: &AdvicePlan<'_>,
        jp: &JoinPoint<'_>,
        value: &Value,
        failure: &mut Option<AopError>,
    ) {
        for (entry, returning, handler) in plan.after_returning() {
            if !returning.accepts(value, &jp.signature().return_type) {
                tracing::trace!(
                    advice = %entry.name(),
                    declared = %returning,
                    "return value does not satisfy declared type, skipped"
                );
                continue;
            }
            let outcome = handler.after_returning(jp, value);
            keep_first(failure, self.settle(entry, outcome));
        }
    }

    fn run_after_throwing(
        &self,
        plan: &AdvicePlan<'_>,
        jp: &JoinPoint<'_>,
        fault: &Fault,
        failure: &mut Option<AopError>,
    ) {
        let class = fault.classify();
        for (entry, throwing, handler) in plan.after_throwing() {
            if !throwing.accepts(fault) {
                continue;
            }
            let outcome = handler.after_throwing(jp, fault, class);
            keep_first(failure, self.settle(entry, outcome));
        }
    }

    fn run_after(&self, plan: &AdvicePlan<'_>, jp: &JoinPoint<'_>, failure: &mut Option<AopError>) {
        for (entry, handler) in plan.after() {
            let outcome = handler.after(jp);
            keep_first(failure, self.settle(entry, outcome));
        }
    }

    /// 根据通知的错误策略处理回调结果
    fn settle(&self, entry: &AdviceEntry, outcome: anyhow::Result<()>) -> Option<AopError> {
        let metrics = AdviceMetrics::global();
        metrics.record_advice(entry.kind());
        let err = outcome.err()?;
        metrics.record_advice_failure(entry.kind(), entry.name());

        match entry.metadata().error_policy {
            AdviceErrorPolicy::Ignore => {
                tracing::warn!(
                    advice = %entry.name(),
                    kind = %entry.kind(),
                    "advice failed but configured to ignore: {err:#}"
                );
                None
            }
            AdviceErrorPolicy::FailFast => {
                tracing::error!(
                    advice = %entry.name(),
                    kind = %entry.kind(),
                    "advice failed: {err:#}"
                );
                Some(AopError::AdviceFailure {
                    advice: Arc::clone(&entry.metadata().name),
                    kind: entry.kind(),
                    source: err,
                })
            }
        }
    }
}

fn keep_first(slot: &mut Option<AopError>, err: Option<AopError>) {
    if slot.is_none() {
        *slot = err;
    }
}
