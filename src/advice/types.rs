use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{ExceptionClass, Fault, FaultKind, Result};
use crate::utils::context::{RequestContext, RequestMetadata};

/// 通知类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdviceKind {
    Before,
    Around,
    AfterReturning,
    AfterThrowing,
    After,
}

impl AdviceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdviceKind::Before => "before",
            AdviceKind::Around => "around",
            AdviceKind::AfterReturning => "after_returning",
            AdviceKind::AfterThrowing => "after_throwing",
            AdviceKind::After => "after",
        }
    }
}

impl fmt::Display for AdviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 通知执行失败时的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdviceErrorPolicy {
    /// 失败时向调用方返回错误
    #[default]
    FailFast,
    /// 失败时记录告警并继续执行其余通知
    Ignore,
}

/// After-Returning 通知声明的返回值类型约束
///
/// 非空值按运行时类型匹配；`null` 只在操作声明的返回类型与约束一致时匹配，
/// `Null` 约束只接受 `null`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Any,
    Null,
    Bool,
    Number,
    String,
    Array,
    Object,
}

impl ValueType {
    /// 值的运行时类型
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => ValueType::Null,
            Value::Bool(_) => ValueType::Bool,
            Value::Number(_) => ValueType::Number,
            Value::String(_) => ValueType::String,
            Value::Array(_) => ValueType::Array,
            Value::Object(_) => ValueType::Object,
        }
    }

    /// 操作声明的返回类型对应的约束，未知类型视为 `Any`
    pub fn of_declared(type_name: &str) -> Self {
        let simple = type_name.rsplit('.').next().unwrap_or(type_name);
        match simple {
            "void" | "Void" => ValueType::Null,
            "boolean" | "Boolean" | "bool" => ValueType::Bool,
            "byte" | "short" | "int" | "long" | "float" | "double" | "Byte" | "Short"
            | "Integer" | "Long" | "Float" | "Double" | "Number" | "BigDecimal"
            | "BigInteger" => ValueType::Number,
            "String" | "CharSequence" | "str" => ValueType::String,
            "List" | "Set" | "Collection" | "Vec" => ValueType::Array,
            "Map" | "HashMap" => ValueType::Object,
            simple if simple.ends_with("[]") => ValueType::Array,
            _ => ValueType::Any,
        }
    }

    /// `return_type` 为操作声明的返回类型，用于判定 `null` 是否匹配
    pub fn accepts(self, value: &Value, return_type: &str) -> bool {
        match self {
            ValueType::Any => true,
            ValueType::Null => value.is_null(),
            declared if value.is_null() => ValueType::of_declared(return_type) == declared,
            declared => ValueType::of(value) == declared,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Any => "Any",
            ValueType::Null => "Null",
            ValueType::Bool => "Bool",
            ValueType::Number => "Number",
            ValueType::String => "String",
            ValueType::Array => "Array",
            ValueType::Object => "Object",
        };
        f.write_str(name)
    }
}

/// After-Throwing 通知声明的错误类型约束
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FaultType {
    #[default]
    Any,
    Kind(FaultKind),
}

impl FaultType {
    pub fn accepts(self, fault: &Fault) -> bool {
        match self {
            FaultType::Any => true,
            FaultType::Kind(kind) => fault.kind() == kind,
        }
    }
}

impl From<FaultKind> for FaultType {
    fn from(kind: FaultKind) -> Self {
        FaultType::Kind(kind)
    }
}

/// 被拦截操作的签名
#[derive(Debug, Clone, PartialEq)]
pub struct OperationSignature {
    /// 声明类型的全限定名，如 `com.crosscut.controller.RecordController`
    pub declaring_type: String,
    /// 声明类型的父类型（用于 `Type+` 匹配）
    pub supertypes: Vec<String>,
    pub method: String,
    pub args: Vec<Value>,
    pub return_type: String,
}

impl OperationSignature {
    pub fn new<T: Into<String>, M: Into<String>>(declaring_type: T, method: M) -> Self {
        Self {
            declaring_type: declaring_type.into(),
            supertypes: Vec::new(),
            method: method.into(),
            args: Vec::new(),
            return_type: "Object".to_string(),
        }
    }

    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    pub fn with_arg<V: Into<Value>>(mut self, arg: V) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn with_supertypes<I, T>(mut self, supertypes: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.supertypes = supertypes.into_iter().map(Into::into).collect();
        self
    }

    pub fn returning<T: Into<String>>(mut self, return_type: T) -> Self {
        self.return_type = return_type.into();
        self
    }

    pub fn arity(&self) -> usize {
        self.args.len()
    }

    /// 声明类型的简单名
    pub fn simple_type_name(&self) -> &str {
        self.declaring_type
            .rsplit('.')
            .next()
            .unwrap_or(&self.declaring_type)
    }

    /// `声明类型.方法名`
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.declaring_type, self.method)
    }

    pub(crate) fn shape(&self) -> SignatureShape {
        SignatureShape {
            declaring_type: self.declaring_type.clone(),
            supertypes: self.supertypes.clone(),
            method: self.method.clone(),
            arity: self.args.len(),
            return_type: self.return_type.clone(),
        }
    }
}

impl fmt::Display for OperationSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}.{}({} args)",
            self.return_type,
            self.declaring_type,
            self.method,
            self.args.len()
        )
    }
}

/// 选择器匹配只依赖签名的形状（不含参数值），用作匹配缓存的键
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct SignatureShape {
    declaring_type: String,
    supertypes: Vec<String>,
    method: String,
    arity: usize,
    return_type: String,
}

/// 单次调用的连接点
#[derive(Debug, Clone, Copy)]
pub struct JoinPoint<'a> {
    signature: &'a OperationSignature,
    request: &'a RequestContext,
    invocation_id: Uuid,
    started_at: Instant,
}

impl<'a> JoinPoint<'a> {
    pub fn new(signature: &'a OperationSignature, request: &'a RequestContext) -> Self {
        Self {
            signature,
            request,
            invocation_id: Uuid::new_v4(),
            started_at: Instant::now(),
        }
    }

    pub fn signature(&self) -> &'a OperationSignature {
        self.signature
    }

    pub fn args(&self) -> &'a [Value] {
        &self.signature.args
    }

    pub fn request(&self) -> &'a RequestContext {
        self.request
    }

    /// 当前请求的元数据，请求作用域之外返回 `NoActiveRequest`
    pub fn request_metadata(&self) -> Result<&'a RequestMetadata> {
        self.request.current()
    }

    pub fn invocation_id(&self) -> Uuid {
        self.invocation_id
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

type Target<'a> = Box<dyn FnOnce(&[Value]) -> std::result::Result<Value, Fault> + 'a>;

/// Around 通知使用的连接点，持有继续执行目标操作的一次性句柄
pub struct ProceedingJoinPoint<'a> {
    join_point: JoinPoint<'a>,
    target: Target<'a>,
}

impl<'a> ProceedingJoinPoint<'a> {
    pub(crate) fn new(join_point: JoinPoint<'a>, target: Target<'a>) -> Self {
        Self { join_point, target }
    }

    pub fn join_point(&self) -> &JoinPoint<'a> {
        &self.join_point
    }

    pub fn signature(&self) -> &'a OperationSignature {
        self.join_point.signature
    }

    /// 以原始参数执行目标操作
    pub fn proceed(self) -> std::result::Result<Value, Fault> {
        let signature = self.join_point.signature;
        (self.target)(&signature.args)
    }

    /// 以替换后的参数执行目标操作
    pub fn proceed_with(self, args: Vec<Value>) -> std::result::Result<Value, Fault> {
        (self.target)(&args)
    }
}

impl fmt::Debug for ProceedingJoinPoint<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProceedingJoinPoint")
            .field("join_point", &self.join_point)
            .finish_non_exhaustive()
    }
}

/// 前置通知
pub trait BeforeAdvice: Send + Sync {
    fn before(&self, jp: &JoinPoint<'_>) -> anyhow::Result<()>;
}

/// 环绕通知：决定是否、何时执行目标操作，可替换返回值或吞掉错误
pub trait AroundAdvice: Send + Sync {
    fn around(&self, pjp: ProceedingJoinPoint<'_>) -> std::result::Result<Value, Fault>;
}

/// 后置返回通知
pub trait AfterReturningAdvice: Send + Sync {
    fn after_returning(&self, jp: &JoinPoint<'_>, value: &Value) -> anyhow::Result<()>;
}

/// 后置异常通知
pub trait AfterThrowingAdvice: Send + Sync {
    fn after_throwing(
        &self,
        jp: &JoinPoint<'_>,
        fault: &Fault,
        class: ExceptionClass,
    ) -> anyhow::Result<()>;
}

/// 后置最终通知
pub trait AfterAdvice: Send + Sync {
    fn after(&self, jp: &JoinPoint<'_>) -> anyhow::Result<()>;
}

impl<F> BeforeAdvice for F
where
    F: Fn(&JoinPoint<'_>) -> anyhow::Result<()> + Send + Sync,
{
    fn before(&self, jp: &JoinPoint<'_>) -> anyhow::Result<()> {
        self(jp)
    }
}

impl<F> AroundAdvice for F
where
    F: Fn(ProceedingJoinPoint<'_>) -> std::result::Result<Value, Fault> + Send + Sync,
{
    fn around(&self, pjp: ProceedingJoinPoint<'_>) -> std::result::Result<Value, Fault> {
        self(pjp)
    }
}

impl<F> AfterReturningAdvice for F
where
    F: Fn(&JoinPoint<'_>, &Value) -> anyhow::Result<()> + Send + Sync,
{
    fn after_returning(&self, jp: &JoinPoint<'_>, value: &Value) -> anyhow::Result<()> {
        self(jp, value)
    }
}

impl<F> AfterThrowingAdvice for F
where
    F: Fn(&JoinPoint<'_>, &Fault, ExceptionClass) -> anyhow::Result<()> + Send + Sync,
{
    fn after_throwing(
        &self,
        jp: &JoinPoint<'_>,
        fault: &Fault,
        class: ExceptionClass,
    ) -> anyhow::Result<()> {
        self(jp, fault, class)
    }
}

impl<F> AfterAdvice for F
where
    F: Fn(&JoinPoint<'_>) -> anyhow::Result<()> + Send + Sync,
{
    fn after(&self, jp: &JoinPoint<'_>) -> anyhow::Result<()> {
        self(jp)
    }
}

/// 通知注册元信息
#[derive(Debug, Clone)]
pub struct AdviceMetadata {
    pub name: Arc<str>,
    pub description: Option<Arc<str>>,
    pub kind: AdviceKind,
    pub error_policy: AdviceErrorPolicy,
}

impl Default for AdviceMetadata {
    fn default() -> Self {
        Self {
            name: Arc::from("anonymous"),
            description: None,
            kind: AdviceKind::Before,
            error_policy: AdviceErrorPolicy::FailFast,
        }
    }
}

impl AdviceMetadata {
    pub fn named<T: Into<Arc<str>>>(name: T) -> Self {
        Self::default().with_name(name)
    }

    pub fn with_kind(mut self, kind: AdviceKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_name<T: Into<Arc<str>>>(mut self, name: T) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_description<T: Into<Arc<str>>>(mut self, description: Option<T>) -> Self {
        self.description = description.map(Into::into);
        self
    }

    pub fn with_error_policy(mut self, policy: AdviceErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn any_accepts_every_value() {
        for value in [json!(null), json!(1), json!("ok"), json!([1]), json!({"a": 1})] {
            assert!(ValueType::Any.accepts(&value, "Object"));
        }
    }

    #[test]
    fn declared_types_accept_matching_values() {
        assert!(ValueType::String.accepts(&json!("ok"), "Object"));
        assert!(!ValueType::String.accepts(&json!(42), "String"));
        assert!(ValueType::Number.accepts(&json!(42), "Integer"));
        assert!(!ValueType::Null.accepts(&json!("ok"), "void"));
    }

    #[test]
    fn null_matches_only_the_declared_return_type() {
        assert!(ValueType::String.accepts(&Value::Null, "java.lang.String"));
        assert!(!ValueType::String.accepts(&Value::Null, "Integer"));
        assert!(!ValueType::String.accepts(&Value::Null, "Object"));
        assert!(ValueType::Number.accepts(&Value::Null, "long"));
        assert!(ValueType::Array.accepts(&Value::Null, "String[]"));
        assert!(ValueType::Null.accepts(&Value::Null, "Integer"));
    }

    #[test]
    fn fault_type_filters_by_kind() {
        let npe = Fault::null_reference("x");
        assert!(FaultType::Any.accepts(&npe));
        assert!(FaultType::from(FaultKind::NullReference).accepts(&npe));
        assert!(!FaultType::from(FaultKind::Persistence).accepts(&npe));
    }

    #[test]
    fn proceed_with_replaces_arguments() {
        let signature = OperationSignature::new("demo.Echo", "echo").with_arg("original");
        let request = RequestContext::detached();
        let pjp = ProceedingJoinPoint::new(
            JoinPoint::new(&signature, &request),
            Box::new(|args: &[Value]| Ok::<_, Fault>(args[0].clone())),
        );
        assert_eq!(pjp.proceed_with(vec![json!("replaced")]), Ok(json!("replaced")));
    }

    #[test]
    fn signature_names() {
        let signature = OperationSignature::new("com.crosscut.controller.RecordController", "insert")
            .with_arg("alice")
            .with_arg(30)
            .returning("String");
        assert_eq!(signature.simple_type_name(), "RecordController");
        assert_eq!(
            signature.qualified_name(),
            "com.crosscut.controller.RecordController.insert"
        );
        assert_eq!(
            signature.to_string(),
            "String com.crosscut.controller.RecordController.insert(2 args)"
        );
    }
}
