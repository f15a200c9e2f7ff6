// 配置管理模块

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

/// 默认分块大小: 5MB
pub const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// 分块上传阈值: 50MB（超过该大小才走分块路径）
///
/// 阈值和分块大小是两个独立参数：阈值决定是否分块，
/// 分块大小决定每个块的字节数，不能混用
pub const DEFAULT_CHUNKED_THRESHOLD: u64 = 50 * 1024 * 1024;

/// 默认最大并发上传文件数
pub const DEFAULT_MAX_CONCURRENT_ITEMS: usize = 3;

/// 默认批量分组时间窗口: 5 分钟
pub const DEFAULT_TIME_WINDOW_MS: i64 = 300_000;

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// 上传配置
    #[serde(default)]
    pub upload: UploadConfig,
    /// 批量分组配置
    #[serde(default)]
    pub grouping: GroupingConfig,
    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 上传配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// 分块大小（字节）
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
    /// 分块上传阈值（字节），文件超过该大小才分块
    #[serde(default = "default_chunked_threshold")]
    pub chunked_threshold: u64,
    /// 最大并发上传文件数
    #[serde(default = "default_max_concurrent_items")]
    pub max_concurrent_items: usize,
    /// 单个文件内最大并发分块数
    #[serde(default = "default_max_concurrent_chunks")]
    pub max_concurrent_chunks: usize,
    /// 分块失败最大重试次数（默认 0 = 不重试，预留扩展点）
    #[serde(default)]
    pub max_retries: u32,
    /// 无法推断时使用的内容类型
    #[serde(default = "default_content_type")]
    pub default_content_type: String,
}

fn default_chunk_size() -> u64 {
    DEFAULT_CHUNK_SIZE
}

fn default_chunked_threshold() -> u64 {
    DEFAULT_CHUNKED_THRESHOLD
}

fn default_max_concurrent_items() -> usize {
    DEFAULT_MAX_CONCURRENT_ITEMS
}

fn default_max_concurrent_chunks() -> usize {
    3
}

fn default_content_type() -> String {
    "application/octet-stream".to_string()
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunked_threshold: default_chunked_threshold(),
            max_concurrent_items: default_max_concurrent_items(),
            max_concurrent_chunks: default_max_concurrent_chunks(),
            max_retries: 0,
            default_content_type: default_content_type(),
        }
    }
}

/// 批量分组配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupingConfig {
    /// 时间窗口（毫秒）：同类型文件时间戳落在锚点窗口内归入同一记录
    #[serde(default = "default_time_window_ms")]
    pub time_window_ms: i64,
}

fn default_time_window_ms() -> i64 {
    DEFAULT_TIME_WINDOW_MS
}

impl Default for GroupingConfig {
    fn default() -> Self {
        Self {
            time_window_ms: default_time_window_ms(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 是否启用日志文件持久化
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,
    /// 日志文件保存目录
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// 日志级别（默认 info）
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_enabled() -> bool {
    false
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_log_enabled(),
            log_dir: default_log_dir(),
            level: default_log_level(),
        }
    }
}

impl AppConfig {
    /// 从 TOML 文件加载配置，文件不存在时返回默认配置
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("读取配置文件失败: {:?}", path))?;
        let config: AppConfig =
            toml::from_str(&content).with_context(|| format!("解析配置文件失败: {:?}", path))?;
        Ok(config)
    }

    /// 保存配置到 TOML 文件
    pub async fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("序列化配置失败")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("创建配置目录失败: {:?}", parent))?;
        }

        fs::write(path, content)
            .await
            .with_context(|| format!("写入配置文件失败: {:?}", path))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.upload.chunk_size, 5 * 1024 * 1024);
        assert_eq!(config.upload.chunked_threshold, 50 * 1024 * 1024);
        assert_eq!(config.upload.max_concurrent_items, 3);
        assert_eq!(config.upload.max_retries, 0);
        assert_eq!(config.grouping.time_window_ms, 300_000);
    }

    #[test]
    fn test_threshold_and_chunk_size_are_independent() {
        // 阈值和分块大小不是同一个参数
        let config = UploadConfig::default();
        assert_ne!(config.chunk_size, config.chunked_threshold);
        assert!(config.chunked_threshold > config.chunk_size);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [upload]
            max_concurrent_items = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.upload.max_concurrent_items, 5);
        assert_eq!(config.upload.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(config.grouping.time_window_ms, DEFAULT_TIME_WINDOW_MS);
    }

    #[tokio::test]
    async fn test_config_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = AppConfig::default();
        config.upload.max_retries = 2;
        config.upload.chunk_size = 8 * 1024 * 1024;
        config.save(&path).await.unwrap();

        let loaded = AppConfig::load(&path).await.unwrap();
        assert_eq!(loaded.upload.max_retries, 2);
        assert_eq!(loaded.upload.chunk_size, 8 * 1024 * 1024);
    }

    #[tokio::test]
    async fn test_load_missing_file_returns_default() {
        let loaded = AppConfig::load(Path::new("/nonexistent/config.toml"))
            .await
            .unwrap();
        assert_eq!(loaded.upload.chunk_size, DEFAULT_CHUNK_SIZE);
    }
}
