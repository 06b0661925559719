//! # 日志初始化模块
//!
//! 基于 `tracing-subscriber` 的 fmt 输出，`RUST_LOG` 优先于配置文件中的级别。

use tracing_subscriber::{EnvFilter, fmt};

use crate::config::LoggingConfig;

/// 从配置初始化日志系统
///
/// # 参数
/// * `logging_config` - 日志配置（可选），如果为 None 则使用默认配置（debug 级别）
///
/// # 示例
/// ```rust,ignore
/// use crosscut::config::LoggingConfig;
///
/// // 使用默认配置
/// init_tracing_from_config(None)?;
///
/// // 使用自定义配置
/// let config = LoggingConfig {
///     level: "info".to_string(),
///     with_target: false,
///     with_thread_ids: true,
///     with_file: true,
///     with_line_number: true,
/// };
/// init_tracing_from_config(Some(&config))?;
/// ```
///
/// 全局 subscriber 已存在时返回错误。
pub fn init_tracing_from_config(logging_config: Option<&LoggingConfig>) -> anyhow::Result<()> {
    let env_filter = build_env_filter(logging_config);

    let default_config = LoggingConfig::default();
    let config = logging_config.unwrap_or(&default_config);

    fmt::Subscriber::builder()
        .with_target(config.with_target)
        .with_thread_ids(config.with_thread_ids)
        .with_file(config.with_file)
        .with_line_number(config.with_line_number)
        .with_env_filter(env_filter)
        .try_init()
        .map_err(|err| anyhow::anyhow!("failed to install tracing subscriber: {err}"))
}

/// 优先使用环境变量 RUST_LOG，如果没有则使用配置文件的日志级别
pub fn build_env_filter(logging_config: Option<&LoggingConfig>) -> EnvFilter {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            let level = logging_config.map(|c| c.level.as_str()).unwrap_or("debug");
            EnvFilter::try_new(level).unwrap_or_else(|err| {
                eprintln!("invalid log level `{level}` ({err}), using debug");
                EnvFilter::new("debug")
            })
        }
    }
}
