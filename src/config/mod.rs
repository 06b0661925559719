//! 配置模块
//!
//! - 配置文件加载和解析（单文件或 `base.toml` + 片段目录）
//! - 环境特定配置覆盖（`config/environments/{CROSSCUT_ENV}.toml`）
//! - 日志与通知配置定义

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use toml::Value;
use tracing::warn;

use crate::advice::AdviceSettings;

mod manager;
pub use manager::ConfigManager;

/// 全局应用配置实例，使用 OnceLock 确保只初始化一次
static APP_CONFIG: OnceLock<AppConfig> = OnceLock::new();

/// 服务标识
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub version: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "crosscut".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别，`RUST_LOG` 优先
    pub level: String,
    pub with_target: bool,
    pub with_thread_ids: bool,
    pub with_file: bool,
    pub with_line_number: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "debug".to_string(),
            with_target: true,
            with_thread_ids: true,
            with_file: true,
            with_line_number: true,
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceConfig,
    pub logging: LoggingConfig,
    pub advice: AdviceSettings,
}

/// 加载配置
///
/// 显式指定的路径加载失败时直接返回错误；未指定路径时依次尝试 `config/` 目录与
/// `config.toml`，都失败则使用默认配置。
pub fn load_config(path: Option<&str>) -> Result<&'static AppConfig> {
    if let Some(cfg) = APP_CONFIG.get() {
        return Ok(cfg);
    }
    let cfg = resolve_config(path.map(Path::new), Path::new("config"))?;
    Ok(APP_CONFIG.get_or_init(|| cfg))
}

/// 获取应用配置，尚未加载时使用默认配置
pub fn app_config() -> &'static AppConfig {
    APP_CONFIG.get_or_init(AppConfig::default)
}

/// 从指定文件或目录加载配置，不触碰全局实例
///
/// `env_root` 下的 `environments/{env}.toml` 存在时覆盖到结果上。
pub fn load_config_from(path: &Path, env_root: &Path) -> Result<AppConfig> {
    let mut merged = load_value_from_source(path)?;
    ConfigManager::apply_environment_overlay(&mut merged, env_root)?;
    parse_config(merged, path)
}

fn resolve_config(path: Option<&Path>, env_root: &Path) -> Result<AppConfig> {
    match path {
        Some(path) => load_config_from(path, env_root),
        None => Ok(load_with_fallback(
            &[PathBuf::from("config"), PathBuf::from("config.toml")],
            env_root,
        )),
    }
}

/// 使用备选方案加载配置
fn load_with_fallback(candidates: &[PathBuf], env_root: &Path) -> AppConfig {
    for path in candidates {
        match load_config_from(path, env_root) {
            Ok(cfg) => return cfg,
            Err(err) => {
                warn!("failed to load config from {}: {err:#}", path.display());
            }
        }
    }

    warn!("no configuration source succeeded, falling back to defaults");
    AppConfig::default()
}

fn parse_config(value: Value, source: &Path) -> Result<AppConfig> {
    let cfg: AppConfig = value
        .try_into()
        .with_context(|| format!("invalid configuration in {}", source.display()))?;
    cfg.advice
        .selector()
        .with_context(|| format!("invalid advice pointcut in {}", source.display()))?;
    Ok(cfg)
}

/// 从源加载配置
fn load_value_from_source(path: &Path) -> Result<Value> {
    if !path.exists() {
        return Err(anyhow!(
            "configuration path {} does not exist",
            path.display()
        ));
    }

    let metadata = path
        .metadata()
        .with_context(|| format!("unable to read metadata for {}", path.display()))?;

    if metadata.is_dir() {
        load_value_from_directory(path)
    } else {
        load_toml_value(path)
    }
}

/// 从目录加载配置：`base.toml` 之后按文件名顺序合并其余片段
fn load_value_from_directory(path: &Path) -> Result<Value> {
    let base_file = path.join("base.toml");
    if !base_file.exists() {
        return Err(anyhow!(
            "missing base configuration: {}",
            base_file.display()
        ));
    }

    let mut merged = load_toml_value(&base_file)?;
    if !merged.is_table() {
        return Err(anyhow!(
            "base configuration must be a table: {}",
            base_file.display()
        ));
    }

    merge_directory(&mut merged, path)?;
    merge_directory(&mut merged, &path.join("overrides"))?;
    Ok(merged)
}

/// 合并目录中的配置片段
fn merge_directory(root: &mut Value, dir: &Path) -> Result<()> {
    if !dir.exists() {
        return Ok(());
    }

    let mut entries = fs::read_dir(dir)
        .with_context(|| format!("unable to read config directory {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path.file_name() != Some(OsStr::new("base.toml"))
                && path
                    .extension()
                    .and_then(OsStr::to_str)
                    .map(|ext| ext.eq_ignore_ascii_case("toml"))
                    .unwrap_or(false)
        })
        .collect::<Vec<_>>();

    entries.sort();

    for entry in entries {
        let value = load_toml_value(&entry)?;
        merge_value(root, value);
    }

    Ok(())
}

/// 加载 TOML 值
pub(crate) fn load_toml_value(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("unable to read config fragment {}", path.display()))?;
    let value: Value = toml::from_str(&content)
        .with_context(|| format!("invalid TOML content in fragment {}", path.display()))?;
    Ok(value)
}

/// 递归合并，表按键合并，其他值直接覆盖
pub(crate) fn merge_value(base: &mut Value, overlay: Value) {
    match overlay {
        Value::Table(overlay_table) => {
            if let Value::Table(base_table) = base {
                for (key, overlay_value) in overlay_table.into_iter() {
                    match base_table.get_mut(&key) {
                        Some(base_value) => merge_value(base_value, overlay_value),
                        None => {
                            base_table.insert(key, overlay_value);
                        }
                    }
                }
            } else {
                *base = Value::Table(overlay_table);
            }
        }
        other => {
            *base = other;
        }
    }
}
