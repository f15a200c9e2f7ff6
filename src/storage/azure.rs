// Blob 存储 HTTP 传输实现
//
// 请求体以 64KB 片段流式发送，每个片段被拉取时上报一次进度，
// 近似于"已发送字节 / 分块字节"的比例

use crate::storage::{BlobTransport, BlockId, ProgressFn, StorageError, UploadTarget};
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::Client;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// 流式请求体的片段大小: 64KB
const BODY_PIECE_SIZE: usize = 64 * 1024;

/// Block Blob 类型标头
const BLOB_TYPE_HEADER: &str = "x-ms-blob-type";
const BLOB_TYPE_BLOCK: &str = "BlockBlob";

/// Blob 存储 HTTP 传输
#[derive(Debug, Clone)]
pub struct AzureBlobTransport {
    /// HTTP 客户端
    client: Client,
}

impl AzureBlobTransport {
    /// 创建新的传输客户端
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("创建 HTTP 客户端失败")?;
        Ok(Self { client })
    }

    /// 使用外部构造的客户端（共享连接池）
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

/// 按片段切分数据，片段被拉取时上报累计已发送字节
fn progress_stream(
    data: Vec<u8>,
    progress: ProgressFn,
) -> impl futures::Stream<Item = Result<Vec<u8>, std::io::Error>> {
    let total = data.len() as u64;
    let pieces: Vec<Vec<u8>> = data.chunks(BODY_PIECE_SIZE).map(|c| c.to_vec()).collect();
    let sent = Arc::new(AtomicU64::new(0));

    futures::stream::iter(pieces).map(move |piece| {
        let sent_total = sent.fetch_add(piece.len() as u64, Ordering::SeqCst) + piece.len() as u64;
        progress(sent_total, total);
        Ok(piece)
    })
}

/// 构造带进度上报的流式请求体
fn progress_body(data: Vec<u8>, progress: ProgressFn) -> reqwest::Body {
    if data.is_empty() {
        progress(0, 0);
        return reqwest::Body::from(Vec::new());
    }
    reqwest::Body::wrap_stream(progress_stream(data, progress))
}

/// 检查响应状态，非 2xx 归为 PutStatus 错误
fn check_status(response: &reqwest::Response) -> Result<(), StorageError> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(StorageError::PutStatus {
            status: status.as_u16(),
        })
    }
}

#[async_trait]
impl BlobTransport for AzureBlobTransport {
    async fn put_blob(
        &self,
        target: &UploadTarget,
        content_type: &str,
        data: Vec<u8>,
        progress: ProgressFn,
    ) -> Result<()> {
        let total = data.len() as u64;
        debug!("单次直传: url={}, size={} bytes", target.base_url, total);

        let response = self
            .client
            .put(target.signed_url())
            .header(BLOB_TYPE_HEADER, BLOB_TYPE_BLOCK)
            .header(CONTENT_TYPE, content_type)
            .header(CONTENT_LENGTH, total)
            .body(progress_body(data, progress))
            .send()
            .await
            .map_err(StorageError::Transport)?;

        check_status(&response)?;
        Ok(())
    }

    async fn put_block(
        &self,
        target: &UploadTarget,
        block_id: &BlockId,
        data: Vec<u8>,
        progress: ProgressFn,
    ) -> Result<()> {
        let total = data.len() as u64;
        debug!(
            "分块 PUT: blockid={}, size={} bytes",
            block_id.ordinal(),
            total
        );

        let response = self
            .client
            .put(target.block_url(block_id))
            .header(BLOB_TYPE_HEADER, BLOB_TYPE_BLOCK)
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(CONTENT_LENGTH, total)
            .body(progress_body(data, progress))
            .send()
            .await
            .map_err(StorageError::Transport)?;

        check_status(&response)?;
        Ok(())
    }

    async fn put_block_list(&self, target: &UploadTarget, manifest: &str) -> Result<()> {
        debug!("提交块清单: url={}", target.base_url);

        let response = self
            .client
            .put(target.commit_url())
            .header(CONTENT_TYPE, "application/xml")
            .body(manifest.to_string())
            .send()
            .await
            .map_err(StorageError::Transport)?;

        check_status(&response)?;
        Ok(())
    }
}
