use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;

use crate::error::Result;

use super::logging::{DEFAULT_POINTCUT, FaultPolicy};
use super::registry::{AdviceRegistry, AdviceRegistryBuilder};
use super::selector::Selector;
use super::types::{AdviceErrorPolicy, AdviceMetadata};

/// 通知相关配置（`[advice]` 段）
///
/// ```toml
/// [advice]
/// pointcut = "execution(* com.crosscut.controller.*.*(..))"
/// fault_policy = "rethrow"
/// match_cache = true
///
/// [advice.toggles."request-logging.after"]
/// enabled = false
///
/// [advice.toggles."request-logging.before"]
/// error_policy = "ignore"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AdviceSettings {
    /// 内置请求日志切面的切点表达式
    pub pointcut: String,
    /// Around 通知遇到目标操作错误时的处理方式
    pub fault_policy: FaultPolicy,
    /// 是否按签名缓存匹配结果
    pub match_cache: bool,
    /// 按通知名称覆盖的开关与错误策略
    pub toggles: HashMap<String, AdviceToggle>,
}

impl Default for AdviceSettings {
    fn default() -> Self {
        Self {
            pointcut: DEFAULT_POINTCUT.to_string(),
            fault_policy: FaultPolicy::default(),
            match_cache: true,
            toggles: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct AdviceToggle {
    pub enabled: bool,
    pub error_policy: AdviceErrorPolicy,
}

impl Default for AdviceToggle {
    fn default() -> Self {
        Self {
            enabled: true,
            error_policy: AdviceErrorPolicy::FailFast,
        }
    }
}

impl AdviceSettings {
    pub fn selector(&self) -> Result<Arc<Selector>> {
        Ok(Arc::new(Selector::parse(&self.pointcut)?))
    }

    pub fn toggle(&self, name: &str) -> AdviceToggle {
        self.toggles.get(name).copied().unwrap_or_default()
    }

    /// 通知的注册元信息，被禁用时返回 `None`
    pub fn metadata(&self, name: &str, description: &str) -> Option<AdviceMetadata> {
        let toggle = self.toggle(name);
        if !toggle.enabled {
            tracing::info!(advice = %name, "advice disabled, skip");
            return None;
        }
        Some(
            AdviceMetadata::named(name)
                .with_description(Some(description))
                .with_error_policy(toggle.error_policy),
        )
    }

    pub fn registry_builder(&self) -> AdviceRegistryBuilder {
        AdviceRegistry::builder().with_match_cache(self.match_cache)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_target_controllers_and_rethrow() {
        let settings = AdviceSettings::default();
        assert_eq!(settings.pointcut, DEFAULT_POINTCUT);
        assert_eq!(settings.fault_policy, FaultPolicy::Rethrow);
        assert!(settings.match_cache);
        assert!(settings.selector().is_ok());
    }

    #[test]
    fn toggles_disable_and_relax_advice() {
        let settings: AdviceSettings = toml::from_str(
            r#"
            fault_policy = "suppress"

            [toggles."request-logging.after"]
            enabled = false

            [toggles."request-logging.before"]
            error_policy = "ignore"
            "#,
        )
        .unwrap();

        assert_eq!(settings.fault_policy, FaultPolicy::Suppress);
        assert!(settings.metadata("request-logging.after", "after").is_none());
        let before = settings.metadata("request-logging.before", "before").unwrap();
        assert_eq!(before.error_policy, AdviceErrorPolicy::Ignore);
        let around = settings.metadata("request-logging.around", "around").unwrap();
        assert_eq!(around.error_policy, AdviceErrorPolicy::FailFast);
        assert_eq!(around.description.as_deref(), Some("around"));
    }

    #[test]
    fn invalid_pointcut_is_reported() {
        let settings = AdviceSettings {
            pointcut: "execution(".to_string(),
            ..AdviceSettings::default()
        };
        assert!(settings.selector().is_err());
    }
}
