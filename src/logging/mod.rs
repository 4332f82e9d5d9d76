//! 日志系统

pub mod formatter;

use crate::config::GeneralConfig;
use anyhow::{Context, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// 日志配置
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// 日志级别
    pub level: String,
    /// 日志文件路径（按天轮转，JSON 格式）
    pub file_path: Option<String>,
    /// 是否启用彩色输出
    pub colored: bool,
}

impl LogConfig {
    pub fn from_general(general: &GeneralConfig, level_override: Option<&str>) -> Self {
        Self {
            level: level_override.unwrap_or(&general.log_level).to_string(),
            file_path: general.log_file.as_ref().map(|p| p.display().to_string()),
            colored: general.log_colored,
        }
    }
}

/// 初始化日志系统
///
/// 返回的 guard 必须在程序退出前保持存活，否则文件日志会丢失。
pub fn init_logging(config: LogConfig) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .with_context(|| format!("Invalid log level: {}", config.level))?;

    let console_layer = fmt::layer()
        .with_ansi(config.colored)
        .event_format(formatter::SwitchFormatter::new(config.colored))
        .boxed();

    let registry = tracing_subscriber::registry().with(env_filter).with(console_layer);

    match config.file_path {
        Some(file_path) => {
            let file_path = Path::new(&file_path);
            let directory = file_path.parent().unwrap_or(Path::new("."));
            let file_name = file_path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("hashswitch.log");

            let rolling = tracing_appender::rolling::daily(directory, file_name);
            let (appender, guard) = tracing_appender::non_blocking(rolling);
            let file_layer = fmt::layer()
                .with_writer(appender)
                .with_ansi(false)
                .with_target(true)
                .json();

            registry.with(file_layer).try_init().context("Failed to install tracing subscriber")?;
            Ok(Some(guard))
        }
        None => {
            registry.try_init().context("Failed to install tracing subscriber")?;
            Ok(None)
        }
    }
}

/// 基准测试日志宏
#[macro_export]
macro_rules! bench_info {
    ($($arg:tt)*) => {
        tracing::info!(target: "benchmark", $($arg)*)
    };
}

#[macro_export]
macro_rules! bench_warn {
    ($($arg:tt)*) => {
        tracing::warn!(target: "benchmark", $($arg)*)
    };
}

/// 切换控制日志宏
#[macro_export]
macro_rules! switch_info {
    ($($arg:tt)*) => {
        tracing::info!(target: "switch", $($arg)*)
    };
}

#[macro_export]
macro_rules! switch_warn {
    ($($arg:tt)*) => {
        tracing::warn!(target: "switch", $($arg)*)
    };
}
