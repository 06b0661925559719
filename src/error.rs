//! Crosscut 错误类型
//!
//! - `Fault`：被拦截操作自身抛出的错误（业务侧错误）
//! - `AopError`：拦截层对外暴露的统一错误类型

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::advice::AdviceKind;

/// 被拦截操作抛出的错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fault {
    /// 空引用 / 缺失引用
    #[error("null reference: {0}")]
    NullReference(String),

    /// 非法参数
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// 非法状态
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// 持久化失败
    #[error("persistence failure: {0}")]
    Persistence(String),

    /// 其他错误
    #[error("{0}")]
    Other(String),
}

impl Fault {
    pub fn null_reference<T: Into<String>>(what: T) -> Self {
        Fault::NullReference(what.into())
    }

    pub fn other<T: Into<String>>(message: T) -> Self {
        Fault::Other(message.into())
    }

    /// 错误的运行时类别
    pub fn kind(&self) -> FaultKind {
        match self {
            Fault::NullReference(_) => FaultKind::NullReference,
            Fault::InvalidArgument(_) => FaultKind::InvalidArgument,
            Fault::IllegalState(_) => FaultKind::IllegalState,
            Fault::Persistence(_) => FaultKind::Persistence,
            Fault::Other(_) => FaultKind::Other,
        }
    }

    /// After-Throwing 阶段使用的异常分类
    pub fn classify(&self) -> ExceptionClass {
        match self.kind() {
            FaultKind::NullReference => ExceptionClass::NullReference,
            _ => ExceptionClass::Other,
        }
    }
}

/// `Fault` 的类别标签（用于声明 After-Throwing 的类型约束）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    NullReference,
    InvalidArgument,
    IllegalState,
    Persistence,
    Other,
}

impl FaultKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FaultKind::NullReference => "null_reference",
            FaultKind::InvalidArgument => "invalid_argument",
            FaultKind::IllegalState => "illegal_state",
            FaultKind::Persistence => "persistence",
            FaultKind::Other => "other",
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 异常分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExceptionClass {
    NullReference,
    Other,
}

impl fmt::Display for ExceptionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExceptionClass::NullReference => write!(f, "NULL_REFERENCE"),
            ExceptionClass::Other => write!(f, "OTHER"),
        }
    }
}

/// 拦截层统一错误类型
#[derive(Debug, Error)]
pub enum AopError {
    /// 在请求作用域之外访问请求上下文
    #[error("no active request bound to the current invocation")]
    NoActiveRequest,

    /// 被拦截操作的错误（经 Around 通知重新抛出）
    #[error(transparent)]
    Fault(#[from] Fault),

    /// 通知回调自身失败
    #[error("advice `{advice}` ({kind}) failed: {source}")]
    AdviceFailure {
        advice: Arc<str>,
        kind: AdviceKind,
        #[source]
        source: anyhow::Error,
    },

    /// 切点表达式无法解析
    #[error("invalid selector `{expr}` at {position}: {reason}")]
    InvalidSelector {
        expr: String,
        position: usize,
        reason: String,
    },

    /// 请求元数据无法解析
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// 序列化失败
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 配置错误
    #[error("configuration error: {0}")]
    Config(String),

    /// 生命周期阶段发布顺序错误
    #[error("lifecycle error: {0}")]
    Lifecycle(String),

    /// 生命周期观察者失败
    #[error("lifecycle observer failed during {phase}: {source}")]
    ObserverFailure {
        phase: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl AopError {
    /// 被拦截操作的原始错误（如有）
    pub fn as_fault(&self) -> Option<&Fault> {
        match self {
            AopError::Fault(fault) => Some(fault),
            _ => None,
        }
    }

    pub fn is_advice_failure(&self) -> bool {
        matches!(self, AopError::AdviceFailure { .. })
    }
}

pub type Result<T, E = AopError> = std::result::Result<T, E>;
