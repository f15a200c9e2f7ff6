//! 日志系统配置
//!
//! 控制台输出始终开启；启用文件持久化时按天滚动写入日志目录

use crate::config::LogConfig;
use anyhow::{Context, Result};
use std::fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, time::ChronoLocal},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// 初始化日志系统
///
/// 返回的 `WorkerGuard` 必须在进程生命周期内持有，
/// 否则文件日志的后台写入线程会提前退出
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    // RUST_LOG 优先于配置文件中的级别
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    let console_layer = fmt::layer()
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S%.3f".to_string()))
        .with_target(false);

    if !config.enabled {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .init();
        return Ok(None);
    }

    fs::create_dir_all(&config.log_dir)
        .with_context(|| format!("创建日志目录失败: {:?}", config.log_dir))?;

    let file_appender = tracing_appender::rolling::daily(&config.log_dir, "media-upload-rust.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S%.3f".to_string()))
        .with_target(false)
        .with_ansi(false)
        .with_writer(non_blocking);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    tracing::info!("日志文件持久化已启用: {:?}", config.log_dir);
    Ok(Some(guard))
}
