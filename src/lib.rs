//! Crosscut 通知分发库
//!
//! 按声明式切点匹配被拦截的操作，并围绕单次调用按固定顺序执行
//! Before / Around / AfterReturning / AfterThrowing / After 五类通知。

pub mod advice;
pub mod config;
pub mod controller;
pub mod error;
pub mod lifecycle;
pub mod metrics;
pub mod repository;
pub mod tracing;
pub mod utils;

pub use advice::*;
pub use config::{AppConfig, ConfigManager, LoggingConfig, ServiceConfig, app_config, load_config, load_config_from};
pub use controller::{RecordController, TargetProxy};
pub use error::{AopError, ExceptionClass, Fault, FaultKind, Result};
pub use lifecycle::{LifecycleBus, LifecycleObserver, LifecyclePhase};
pub use repository::{InMemoryRecordMapper, PersonRecord, RecordMapper};
pub use utils::*;
