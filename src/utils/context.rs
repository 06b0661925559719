//! 请求上下文工具
//!
//! 请求上下文以显式参数的形式随调用传递，通知回调通过 `JoinPoint` 读取，
//! 不依赖任何线程绑定的全局状态。

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use url::Url;

use crate::error::{AopError, Result};

/// 当前请求的元数据快照
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RequestMetadata {
    url: String,
    /// 按出现顺序保存的参数，允许同名参数重复出现
    parameters: Vec<(String, String)>,
}

impl RequestMetadata {
    pub fn new<T: Into<String>>(url: T) -> Self {
        Self {
            url: url.into(),
            parameters: Vec::new(),
        }
    }

    /// 从完整 URL 构建，查询串拆分为参数，`url()` 不含查询串与片段
    pub fn parse(raw_url: &str) -> Result<Self> {
        let mut url = Url::parse(raw_url)
            .map_err(|err| AopError::InvalidRequest(format!("url={raw_url}, err={err}")))?;
        let parameters = url
            .query_pairs()
            .map(|(name, value)| (name.into_owned(), value.into_owned()))
            .collect();
        url.set_query(None);
        url.set_fragment(None);
        Ok(Self {
            url: url.to_string(),
            parameters,
        })
    }

    pub fn with_parameter<T: Into<String>, U: Into<String>>(mut self, name: T, value: U) -> Self {
        self.parameters.push((name.into(), value.into()));
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn parameter_names(&self) -> impl Iterator<Item = &str> {
        self.parameters.iter().map(|(name, _)| name.as_str())
    }

    /// 同名参数以最后一次出现的值为准
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .rev()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// 参数名到参数值的映射（同名参数后写覆盖先写）
    pub fn parameter_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        for (name, value) in &self.parameters {
            map.insert(name.clone(), value.clone());
        }
        map
    }

    /// 参数映射的 JSON 表示
    pub fn parameters_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.parameter_map())?)
    }
}

/// 随调用显式传递的请求上下文
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    metadata: Option<Arc<RequestMetadata>>,
}

impl RequestContext {
    /// 绑定到一个进行中的请求
    pub fn bound(metadata: RequestMetadata) -> Self {
        Self {
            metadata: Some(Arc::new(metadata)),
        }
    }

    /// 不属于任何请求的调用（如启动任务、定时任务）
    pub fn detached() -> Self {
        Self { metadata: None }
    }

    pub fn is_active(&self) -> bool {
        self.metadata.is_some()
    }

    pub fn current(&self) -> Result<&RequestMetadata> {
        self.metadata.as_deref().ok_or(AopError::NoActiveRequest)
    }
}

impl From<RequestMetadata> for RequestContext {
    fn from(metadata: RequestMetadata) -> Self {
        RequestContext::bound(metadata)
    }
}
