// Blob 传输抽象
//
// 引擎只依赖该 trait，测试用内存实现替换真实 HTTP 传输

use crate::storage::{BlockId, StorageError};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// 进度回调：(已发送字节数, 总字节数)
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// 预授权写入目标
///
/// 由后端签发的限时 URL 解析而来，查询串即授权令牌
#[derive(Debug, Clone)]
pub struct UploadTarget {
    /// 不含查询串的 blob 地址
    pub base_url: String,
    /// 授权令牌（原始查询串，不含 '?'）
    pub auth_token: String,
}

impl UploadTarget {
    /// 从预授权 URL 解析
    pub fn parse(upload_url: &str) -> Result<Self, StorageError> {
        match upload_url.split_once('?') {
            Some((base, token)) if !token.is_empty() => Ok(Self {
                base_url: base.to_string(),
                auth_token: token.to_string(),
            }),
            _ => Err(StorageError::MissingAuthToken {
                url: upload_url.to_string(),
            }),
        }
    }

    /// 完整的预授权 URL（单次直传用）
    pub fn signed_url(&self) -> String {
        format!("{}?{}", self.base_url, self.auth_token)
    }

    /// 分块上传地址
    pub fn block_url(&self, block_id: &BlockId) -> String {
        format!(
            "{}?comp=block&blockid={}&{}",
            self.base_url,
            urlencoding::encode(&block_id.encoded()),
            self.auth_token
        )
    }

    /// 块清单提交地址
    pub fn commit_url(&self) -> String {
        format!("{}?comp=blocklist&{}", self.base_url, self.auth_token)
    }
}

/// Blob 传输接口
#[async_trait]
pub trait BlobTransport: Send + Sync {
    /// 单次直传整个文件
    async fn put_blob(
        &self,
        target: &UploadTarget,
        content_type: &str,
        data: Vec<u8>,
        progress: ProgressFn,
    ) -> Result<()>;

    /// 上传单个分块
    async fn put_block(
        &self,
        target: &UploadTarget,
        block_id: &BlockId,
        data: Vec<u8>,
        progress: ProgressFn,
    ) -> Result<()>;

    /// 提交块清单，拼装最终对象
    async fn put_block_list(&self, target: &UploadTarget, manifest: &str) -> Result<()>;
}
