// 测试用内存实现
//
// 用内存版传输层和记录服务替换真实 HTTP，支持按块/按大小注入失败，
// 并记录所有写入以便断言

use anyhow::{bail, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};

use crate::records::{
    ConfirmUploadRequest, CreateRecordRequest, RecordCreated, RecordService, UploadAuthorization,
    UploadRequest,
};
use crate::storage::{BlobTransport, BlockId, ProgressFn, UploadTarget};

const FAKE_UPLOAD_BASE: &str = "https://storage.example.net/media/object";
const FAKE_AUTH_TOKEN: &str = "sv=2024&sig=fake";

/// 内存记录服务
pub(crate) struct FakeRecordService {
    blob_name: String,
    next_record_id: AtomicI64,
    created: Mutex<Vec<CreateRecordRequest>>,
    upload_requests: Mutex<Vec<UploadRequest>>,
    confirmations: Mutex<Vec<ConfirmUploadRequest>>,
    fail_title_marker: Mutex<Option<String>>,
}

impl FakeRecordService {
    pub(crate) fn new(blob_name: impl Into<String>) -> Self {
        Self {
            blob_name: blob_name.into(),
            next_record_id: AtomicI64::new(1),
            created: Mutex::new(Vec::new()),
            upload_requests: Mutex::new(Vec::new()),
            confirmations: Mutex::new(Vec::new()),
            fail_title_marker: Mutex::new(None),
        }
    }

    /// 所有预授权 URL 共用的 base
    pub(crate) fn upload_base() -> String {
        FAKE_UPLOAD_BASE.to_string()
    }

    /// 标题包含该片段的预授权请求直接失败
    pub(crate) fn fail_title_containing(&self, marker: impl Into<String>) {
        *self.fail_title_marker.lock() = Some(marker.into());
    }

    pub(crate) fn created_records(&self) -> Vec<CreateRecordRequest> {
        self.created.lock().clone()
    }

    pub(crate) fn upload_requests(&self) -> Vec<UploadRequest> {
        self.upload_requests.lock().clone()
    }

    pub(crate) fn confirmations(&self) -> Vec<ConfirmUploadRequest> {
        self.confirmations.lock().clone()
    }
}

#[async_trait]
impl RecordService for FakeRecordService {
    async fn create_record(&self, request: &CreateRecordRequest) -> Result<RecordCreated> {
        self.created.lock().push(request.clone());
        Ok(RecordCreated {
            id: self.next_record_id.fetch_add(1, Ordering::SeqCst),
        })
    }

    async fn request_upload(
        &self,
        _record_id: i64,
        request: &UploadRequest,
    ) -> Result<UploadAuthorization> {
        if let Some(marker) = self.fail_title_marker.lock().as_deref() {
            if request.title.contains(marker) {
                bail!("forbidden: 上传预授权被拒");
            }
        }
        self.upload_requests.lock().push(request.clone());
        Ok(UploadAuthorization {
            upload_url: format!("{}?{}", FAKE_UPLOAD_BASE, FAKE_AUTH_TOKEN),
            blob_name: self.blob_name.clone(),
        })
    }

    async fn confirm_upload(&self, _record_id: i64, request: &ConfirmUploadRequest) -> Result<()> {
        self.confirmations.lock().push(request.clone());
        Ok(())
    }
}

/// 内存传输层
///
/// 记录每次写入的目标和数据；失败注入用块索引或 blob 大小做键
pub(crate) struct FakeTransport {
    blobs: Mutex<Vec<(String, Vec<u8>)>>,
    blocks: Mutex<Vec<(String, String, Vec<u8>)>>,
    manifests: Mutex<Vec<String>>,
    // 块索引 -> 剩余失败次数（u32::MAX 表示永远失败）
    failing_blocks: Mutex<HashMap<usize, u32>>,
    failing_blob_sizes: Mutex<HashSet<usize>>,
    // 块索引 -> 人为延迟（毫秒），用于制造乱序完成
    block_delays_ms: Mutex<HashMap<usize, u64>>,
}

impl FakeTransport {
    pub(crate) fn new() -> Self {
        Self {
            blobs: Mutex::new(Vec::new()),
            blocks: Mutex::new(Vec::new()),
            manifests: Mutex::new(Vec::new()),
            failing_blocks: Mutex::new(HashMap::new()),
            failing_blob_sizes: Mutex::new(HashSet::new()),
            block_delays_ms: Mutex::new(HashMap::new()),
        }
    }

    /// 指定块索引永远失败
    pub(crate) fn fail_block(&self, index: usize) {
        self.failing_blocks.lock().insert(index, u32::MAX);
    }

    /// 指定块索引失败 n 次后恢复
    pub(crate) fn fail_block_times(&self, index: usize, times: u32) {
        self.failing_blocks.lock().insert(index, times);
    }

    /// 大小恰好为 size 字节的直传失败
    pub(crate) fn fail_blob_of_size(&self, size: usize) {
        self.failing_blob_sizes.lock().insert(size);
    }

    /// 给指定块加人为延迟
    pub(crate) fn delay_block(&self, index: usize, millis: u64) {
        self.block_delays_ms.lock().insert(index, millis);
    }

    pub(crate) fn blobs(&self) -> Vec<(String, Vec<u8>)> {
        self.blobs.lock().clone()
    }

    /// 某个 base 下已写入的分块（编码后的块 ID, 数据）
    pub(crate) fn blocks_for(&self, base_url: &str) -> Vec<(String, Vec<u8>)> {
        self.blocks
            .lock()
            .iter()
            .filter(|(base, _, _)| base == base_url)
            .map(|(_, id, data)| (id.clone(), data.clone()))
            .collect()
    }

    pub(crate) fn manifests(&self) -> Vec<String> {
        self.manifests.lock().clone()
    }

    fn take_block_failure(&self, index: usize) -> bool {
        let mut failing = self.failing_blocks.lock();
        match failing.get_mut(&index) {
            Some(remaining) if *remaining == u32::MAX => true,
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl BlobTransport for FakeTransport {
    async fn put_blob(
        &self,
        target: &UploadTarget,
        _content_type: &str,
        data: Vec<u8>,
        progress: ProgressFn,
    ) -> Result<()> {
        let total = data.len() as u64;
        if self.failing_blob_sizes.lock().contains(&data.len()) {
            bail!("connection reset by peer");
        }
        progress(total, total);
        self.blobs.lock().push((target.base_url.clone(), data));
        Ok(())
    }

    async fn put_block(
        &self,
        target: &UploadTarget,
        block_id: &BlockId,
        data: Vec<u8>,
        progress: ProgressFn,
    ) -> Result<()> {
        let delay = self.block_delays_ms.lock().get(&block_id.index()).copied();
        if let Some(millis) = delay {
            tokio::time::sleep(std::time::Duration::from_millis(millis)).await;
        }
        if self.take_block_failure(block_id.index()) {
            bail!("connection reset by peer");
        }
        let total = data.len() as u64;
        progress(total, total);
        self.blocks
            .lock()
            .push((target.base_url.clone(), block_id.encoded(), data));
        Ok(())
    }

    async fn put_block_list(&self, _target: &UploadTarget, manifest: &str) -> Result<()> {
        self.manifests.lock().push(manifest.to_string());
        Ok(())
    }
}
