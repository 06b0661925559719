//! 内置请求日志切面
//!
//! 记录控制器调用的签名、请求 URL 与参数、返回值与异常。

use serde::Deserialize;
use serde_json::Value;

use crate::error::{ExceptionClass, Fault, Result};
use crate::utils::display_value;

use super::config::AdviceSettings;
use super::registry::AdviceRegistryBuilder;
use super::types::{
    AfterAdvice, AfterReturningAdvice, AfterThrowingAdvice, AroundAdvice, BeforeAdvice,
    FaultType, JoinPoint, ProceedingJoinPoint, ValueType,
};

/// 默认切点：控制器包下任意类型的任意方法
pub const DEFAULT_POINTCUT: &str = "execution(* com.crosscut.controller.*.*(..))";

/// Around 通知遇到目标操作错误时的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultPolicy {
    /// 记录后重新抛出
    #[default]
    Rethrow,
    /// 记录后吞掉错误并返回 `null`，调用方视为正常返回
    Suppress,
}

/// 请求日志切面
pub struct RequestLoggingAspect;

impl RequestLoggingAspect {
    pub const BEFORE: &'static str = "request-logging.before";
    pub const AROUND: &'static str = "request-logging.around";
    pub const RETURN_VALUE: &'static str = "request-logging.return-value";
    pub const RETURN_TEXT: &'static str = "request-logging.return-text";
    pub const FAULT: &'static str = "request-logging.fault";
    pub const AFTER: &'static str = "request-logging.after";

    /// 按配置注册切面的全部通知，返回实际注册的数量
    pub fn install(builder: &mut AdviceRegistryBuilder, settings: &AdviceSettings) -> Result<usize> {
        let selector = settings.selector()?;
        let mut installed = 0;

        if let Some(metadata) = settings.metadata(Self::BEFORE, "log signature, url and parameters") {
            builder.before(metadata, selector.clone(), LogInvocation);
            installed += 1;
        }
        if let Some(metadata) = settings.metadata(Self::AROUND, "log target method and return value") {
            builder.around(
                metadata,
                selector.clone(),
                LogAround {
                    policy: settings.fault_policy,
                },
            );
            installed += 1;
        }
        if let Some(metadata) = settings.metadata(Self::RETURN_VALUE, "log any return value") {
            builder.after_returning(metadata, selector.clone(), ValueType::Any, LogReturnValue);
            installed += 1;
        }
        if let Some(metadata) = settings.metadata(Self::RETURN_TEXT, "log string return values") {
            builder.after_returning(metadata, selector.clone(), ValueType::String, LogReturnText);
            installed += 1;
        }
        if let Some(metadata) = settings.metadata(Self::FAULT, "log faults and flag null references") {
            builder.after_throwing(metadata, selector.clone(), FaultType::Any, LogFault);
            installed += 1;
        }
        if let Some(metadata) = settings.metadata(Self::AFTER, "log completion") {
            builder.after(metadata, selector, LogCompletion);
            installed += 1;
        }

        tracing::info!(
            pointcut = %settings.pointcut,
            fault_policy = ?settings.fault_policy,
            installed,
            "request logging aspect installed"
        );
        Ok(installed)
    }
}

struct LogInvocation;

impl BeforeAdvice for LogInvocation {
    fn before(&self, jp: &JoinPoint<'_>) -> anyhow::Result<()> {
        let signature = jp.signature();
        tracing::info!("before advice invoked");
        tracing::info!(
            operation = %signature.qualified_name(),
            "target operation: {}",
            signature.qualified_name()
        );

        let metadata = jp.request_metadata()?;
        tracing::info!(url = %metadata.url(), "request url: {}", metadata.url());

        if !jp.args().is_empty() {
            let params = metadata.parameters_json()?;
            tracing::info!(params = %params, "request parameters: {params}");
        }
        Ok(())
    }
}

struct LogAround {
    policy: FaultPolicy,
}

impl AroundAdvice for LogAround {
    fn around(&self, pjp: ProceedingJoinPoint<'_>) -> std::result::Result<Value, Fault> {
        let signature = pjp.signature();
        tracing::info!(
            method = %signature.method,
            "around advice target method: {}",
            signature.method
        );

        match pjp.proceed() {
            Ok(value) => {
                tracing::info!("around advice return value: {}", display_value(&value));
                Ok(value)
            }
            Err(fault) => match self.policy {
                FaultPolicy::Rethrow => {
                    tracing::error!(
                        method = %signature.method,
                        fault = %fault,
                        "target operation raised, rethrowing"
                    );
                    Err(fault)
                }
                FaultPolicy::Suppress => {
                    tracing::error!(
                        method = %signature.method,
                        fault = %fault,
                        "target operation raised, suppressed into a null result"
                    );
                    Ok(Value::Null)
                }
            },
        }
    }
}

struct LogReturnValue;

impl AfterReturningAdvice for LogReturnValue {
    fn after_returning(&self, _jp: &JoinPoint<'_>, value: &Value) -> anyhow::Result<()> {
        tracing::info!("first after-returning advice value: {}", display_value(value));
        Ok(())
    }
}

struct LogReturnText;

impl AfterReturningAdvice for LogReturnText {
    fn after_returning(&self, _jp: &JoinPoint<'_>, value: &Value) -> anyhow::Result<()> {
        tracing::info!("second after-returning advice value: {}", display_value(value));
        Ok(())
    }
}

struct LogFault;

impl AfterThrowingAdvice for LogFault {
    fn after_throwing(
        &self,
        jp: &JoinPoint<'_>,
        fault: &Fault,
        class: ExceptionClass,
    ) -> anyhow::Result<()> {
        let method = &jp.signature().method;
        tracing::info!(fault = %fault, class = %class, "after-throwing advice on {method}");
        if class == ExceptionClass::NullReference {
            tracing::warn!(method = %method, "null reference fault raised");
        }
        Ok(())
    }
}

struct LogCompletion;

impl AfterAdvice for LogCompletion {
    fn after(&self, jp: &JoinPoint<'_>) -> anyhow::Result<()> {
        tracing::info!(
            elapsed_us = jp.elapsed().as_micros() as u64,
            "after advice executed"
        );
        Ok(())
    }
}
