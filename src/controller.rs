//! 被拦截的目标代理与示例控制器
//!
//! 控制器方法通过 `TargetProxy` 调用业务逻辑，匹配切点时由调度器织入通知，
//! 控制器自身不感知通知的存在。

use std::sync::Arc;

use serde_json::{Value, json};

use crate::advice::{AdviceDispatcher, OperationSignature};
use crate::error::{Fault, Result};
use crate::repository::RecordMapper;
use crate::utils::context::RequestContext;

/// 目标类型的调用代理
#[derive(Clone)]
pub struct TargetProxy {
    dispatcher: AdviceDispatcher,
    declaring_type: String,
    supertypes: Vec<String>,
}

impl TargetProxy {
    pub fn new<T: Into<String>>(dispatcher: AdviceDispatcher, declaring_type: T) -> Self {
        Self {
            dispatcher,
            declaring_type: declaring_type.into(),
            supertypes: Vec::new(),
        }
    }

    pub fn with_supertypes<I, T>(mut self, supertypes: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.supertypes = supertypes.into_iter().map(Into::into).collect();
        self
    }

    /// 以给定签名调用 `operation`，匹配的通知在其周围执行
    pub fn invoke<F>(
        &self,
        method: &str,
        args: Vec<Value>,
        return_type: &str,
        request: &RequestContext,
        operation: F,
    ) -> Result<Value>
    where
        F: FnOnce(&[Value]) -> std::result::Result<Value, Fault>,
    {
        let signature = OperationSignature::new(self.declaring_type.as_str(), method)
            .with_supertypes(self.supertypes.iter().cloned())
            .with_args(args)
            .returning(return_type);
        self.dispatcher.intercept(&signature, request, operation)
    }
}

/// 记录控制器
pub struct RecordController {
    proxy: TargetProxy,
    mapper: Arc<dyn RecordMapper>,
}

impl RecordController {
    pub const TYPE_NAME: &'static str = "com.crosscut.controller.RecordController";
    pub const SUPERTYPE: &'static str = "com.crosscut.controller.BaseController";

    pub fn new(dispatcher: AdviceDispatcher, mapper: Arc<dyn RecordMapper>) -> Self {
        Self {
            proxy: TargetProxy::new(dispatcher, Self::TYPE_NAME).with_supertypes([Self::SUPERTYPE]),
            mapper,
        }
    }

    /// 首页，固定返回 `"ok"`
    pub fn index(&self, request: &RequestContext) -> Result<Value> {
        self.proxy
            .invoke("index", Vec::new(), "String", request, |_| Ok(json!("ok")))
    }

    /// 插入一条记录
    pub fn insert(&self, request: &RequestContext, name: &str, age: i32) -> Result<Value> {
        let mapper = Arc::clone(&self.mapper);
        self.proxy.invoke(
            "insert",
            vec![json!(name), json!(age)],
            "String",
            request,
            move |args| {
                let name = args
                    .first()
                    .and_then(Value::as_str)
                    .ok_or_else(|| Fault::null_reference("name"))?;
                let age = args
                    .get(1)
                    .and_then(Value::as_i64)
                    .and_then(|age| i32::try_from(age).ok())
                    .ok_or_else(|| Fault::InvalidArgument("age must be a 32-bit integer".to_string()))?;
                mapper.insert_record(name, age)?;
                Ok(json!("ok"))
            },
        )
    }

    /// 问候，`name` 缺失时抛出空引用错误
    pub fn greet(&self, request: &RequestContext, name: Option<&str>) -> Result<Value> {
        self.proxy.invoke(
            "greet",
            vec![name.map_or(Value::Null, |name| json!(name))],
            "String",
            request,
            |args| {
                let name = args
                    .first()
                    .and_then(Value::as_str)
                    .ok_or_else(|| Fault::null_reference("name"))?;
                Ok(json!(format!("hello, {name}")))
            },
        )
    }
}
