//! 通知分发模块
//!
//! - 切点选择器：`execution(...)` 表达式与 `&&`/`||`/`!` 组合
//! - 通知注册中心：按注册顺序保存五类通知，构建后只读
//! - 通知调度器：按 Before → Around → AfterReturning/AfterThrowing → After 顺序执行
//! - 内置请求日志切面

mod config;
mod logging;
mod registry;
mod runtime;
mod selector;
mod types;

pub use config::{AdviceSettings, AdviceToggle};
pub use logging::{DEFAULT_POINTCUT, FaultPolicy, RequestLoggingAspect};
pub use registry::{Advice, AdviceEntry, AdvicePlan, AdviceRegistry, AdviceRegistryBuilder, GlobalAdviceRegistry};
pub use runtime::AdviceDispatcher;
pub use selector::{ArgsPattern, ExecutionPattern, NamePattern, Selector, TypePattern};
pub use types::{
    AdviceErrorPolicy, AdviceKind, AdviceMetadata, AfterAdvice, AfterReturningAdvice,
    AfterThrowingAdvice, AroundAdvice, BeforeAdvice, FaultType, JoinPoint, OperationSignature,
    ProceedingJoinPoint, ValueType,
};
