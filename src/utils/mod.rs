//! 工具函数模块
//!
//! 提供请求上下文与值展示等通用工具函数

pub mod context;

pub use context::{RequestContext, RequestMetadata};

use serde_json::Value;

/// 值的日志展示形式：字符串不带引号，其余按 JSON 输出
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// 将参数列表转换为 JSON 数组文本
pub fn args_to_json(args: &[Value]) -> String {
    Value::Array(args.to_vec()).to_string()
}
