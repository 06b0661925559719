//! 配置管理器 - 负责按运行环境选择覆盖配置

use std::env;
use std::path::{Path, PathBuf};

use anyhow::Result;
use toml::Value;

use super::{load_toml_value, merge_value};

/// 运行环境变量名
pub const ENVIRONMENT_VAR: &str = "CROSSCUT_ENV";

/// 配置管理器
pub struct ConfigManager;

impl ConfigManager {
    /// 获取当前环境名称
    ///
    /// 从环境变量 CROSSCUT_ENV 获取，未设置时默认为 "development"
    pub fn get_environment() -> String {
        env::var(ENVIRONMENT_VAR).unwrap_or_else(|_| "development".to_string())
    }

    /// 环境覆盖文件路径：`{root}/environments/{environment}.toml`
    pub fn environment_file(root: &Path, environment: &str) -> PathBuf {
        root.join("environments").join(format!("{environment}.toml"))
    }

    /// 按当前环境合并覆盖配置
    pub fn apply_environment_overlay(base: &mut Value, root: &Path) -> Result<bool> {
        Self::apply_overlay_for(base, root, &Self::get_environment())
    }

    /// 合并指定环境的覆盖配置，文件不存在时返回 `false`
    pub fn apply_overlay_for(base: &mut Value, root: &Path, environment: &str) -> Result<bool> {
        let path = Self::environment_file(root, environment);
        if !path.exists() {
            return Ok(false);
        }

        let overlay = load_toml_value(&path)?;
        merge_value(base, overlay);
        tracing::info!(
            environment = %environment,
            path = %path.display(),
            "environment config applied"
        );
        Ok(true)
    }
}
