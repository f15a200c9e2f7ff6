// 上传引擎
//
// 单个上传项的完整流程：
//   预授权 → 规划（直传/分块）→ 传输 → 提交块清单 → 修正扩展名 → 确认上传
//
// 任何一个分块失败都不提交块清单，整项按失败处理；
// 同文件其他在途分块照常跑完，失败数一并统计

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::UploadConfig;
use crate::events::{emit, EventSender, ProgressThrottler, UploadEvent};
use crate::records::{ConfirmUploadRequest, RecordService, UploadRequest};
use crate::storage::{
    block_ids_for, block_list_manifest, classify_upload_error, BlobTransport, BlockId,
    ProgressFn, UploadErrorKind, UploadTarget,
};
use crate::uploader::chunk::{plan_upload, ChunkPlan, ChunkState, UploadPlan};
use crate::uploader::grouper::file_extension;
use crate::uploader::scheduler::BoundedScheduler;
use crate::uploader::task::UploadItem;

/// 首次重试退避（毫秒）
const INITIAL_BACKOFF_MS: u64 = 100;
/// 退避上限（毫秒）
const MAX_BACKOFF_MS: u64 = 5000;
/// 被限流时的固定退避（毫秒）
const RATE_LIMIT_BACKOFF_MS: u64 = 10_000;

/// 指数退避延迟
fn backoff_delay(attempt: u32, kind: UploadErrorKind) -> Duration {
    if kind == UploadErrorKind::RateLimited {
        return Duration::from_millis(RATE_LIMIT_BACKOFF_MS);
    }
    let millis = INITIAL_BACKOFF_MS
        .saturating_mul(1u64 << attempt.min(16))
        .min(MAX_BACKOFF_MS);
    Duration::from_millis(millis)
}

/// 上传引擎
///
/// 无共享可变状态，可在多个任务间共享
pub struct UploadEngine {
    records: Arc<dyn RecordService>,
    transport: Arc<dyn BlobTransport>,
    config: UploadConfig,
}

impl UploadEngine {
    pub fn new(
        records: Arc<dyn RecordService>,
        transport: Arc<dyn BlobTransport>,
        config: UploadConfig,
    ) -> Self {
        Self {
            records,
            transport,
            config,
        }
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    pub fn records(&self) -> &Arc<dyn RecordService> {
        &self.records
    }

    /// 执行单个上传项，成功时返回最终对象名
    ///
    /// 只负责执行与发事件，不改写 item 状态（状态由队列折叠事件维护）
    pub async fn upload_item(&self, item: &UploadItem, events: &EventSender) -> Result<String> {
        let title = item.title().to_string();

        let auth = self
            .records
            .request_upload(
                item.record_id,
                &UploadRequest {
                    title: title.clone(),
                    content_type: item.content_type.clone(),
                },
            )
            .await
            .with_context(|| format!("获取上传预授权失败: {}", title))?;

        let target = UploadTarget::parse(&auth.upload_url)?;
        let plan = plan_upload(
            item.total_size,
            self.config.chunked_threshold,
            self.config.chunk_size,
        )?;

        emit(
            events,
            UploadEvent::ItemStarted {
                item_id: item.id.clone(),
                chunk_count: plan.chunk_count(),
            },
        );
        info!(
            "开始上传: {} ({} 字节, {})",
            title,
            item.total_size,
            if plan.is_chunked() { "分块" } else { "直传" }
        );

        match plan {
            UploadPlan::Single { .. } => {
                self.upload_single(item, &target, events).await?;
            }
            UploadPlan::Chunked { chunk_size, .. } => {
                self.upload_chunked(item, &target, chunk_size, events)
                    .await?;
            }
        }

        // 存储层给的对象名可能丢了扩展名，按源文件名补齐
        let blob_name = fix_blob_extension(&auth.blob_name, &item.original_name);
        self.records
            .confirm_upload(
                item.record_id,
                &ConfirmUploadRequest {
                    blob_name: blob_name.clone(),
                    title: title.clone(),
                    content_type: item.content_type.clone(),
                    date_time: item.modified_at.to_rfc3339(),
                },
            )
            .await
            .with_context(|| format!("确认上传失败: {}", title))?;

        emit(
            events,
            UploadEvent::ItemCompleted {
                item_id: item.id.clone(),
                blob_name: blob_name.clone(),
            },
        );
        info!("上传完成: {} -> {}", title, blob_name);
        Ok(blob_name)
    }

    /// 单次直传整个文件
    async fn upload_single(
        &self,
        item: &UploadItem,
        target: &UploadTarget,
        events: &EventSender,
    ) -> Result<()> {
        let data = tokio::fs::read(&item.source_path)
            .await
            .with_context(|| format!("读取文件失败: {:?}", item.source_path))?;

        let throttler = ProgressThrottler::default_interval();
        let progress: ProgressFn = {
            let events = events.clone();
            let item_id = item.id.clone();
            Arc::new(move |sent, total| {
                let percent = byte_percent(sent, total);
                if percent >= 100 || throttler.should_emit() {
                    emit(
                        &events,
                        UploadEvent::ItemProgress {
                            item_id: item_id.clone(),
                            progress: percent,
                        },
                    );
                }
            })
        };

        self.with_retries(|| {
            let data = data.clone();
            let progress = Arc::clone(&progress);
            async move {
                self.transport
                    .put_blob(target, &item.content_type, data, progress)
                    .await
            }
        })
        .await
    }

    /// 分块上传：受控并发推所有分块，再提交块清单
    async fn upload_chunked(
        &self,
        item: &UploadItem,
        target: &UploadTarget,
        chunk_size: u64,
        events: &EventSender,
    ) -> Result<()> {
        let chunk_plan = ChunkPlan::new(item.total_size, chunk_size)?;
        let chunk_count = chunk_plan.chunk_count();

        let scheduler = BoundedScheduler::new(self.config.max_concurrent_chunks);
        let throttler = Arc::new(ProgressThrottler::default_interval());

        let transport = Arc::clone(&self.transport);
        let target_arc = Arc::new(target.clone());
        let source_path = Arc::new(item.source_path.clone());
        let item_id = Arc::new(item.id.clone());
        let events = events.clone();
        let max_retries = self.config.max_retries;

        let chunks: Vec<ChunkState> = chunk_plan.chunks().to_vec();
        let results = scheduler
            .run_all(chunks, move |_, chunk| {
                let transport = Arc::clone(&transport);
                let target = Arc::clone(&target_arc);
                let source_path = Arc::clone(&source_path);
                let item_id = Arc::clone(&item_id);
                let throttler = Arc::clone(&throttler);
                let events = events.clone();
                async move {
                    upload_one_chunk(
                        transport,
                        target,
                        source_path,
                        chunk,
                        item_id,
                        events,
                        throttler,
                        max_retries,
                    )
                    .await
                }
            })
            .await;

        let failed = results
            .iter()
            .filter(|r| !matches!(r, Some(Ok(()))))
            .count();
        if failed > 0 {
            bail!("{} 个分块上传失败", failed);
        }

        let block_ids = block_ids_for(chunk_count)?;
        let manifest = block_list_manifest(&block_ids);
        debug!("提交块清单: {} 块", chunk_count);
        self.with_retries(|| async {
            self.transport.put_block_list(target, &manifest).await
        })
        .await
        .context("提交块清单失败")
    }

    /// 按配置的重试次数执行，只对可重试类错误退避重试
    async fn with_retries<F, Fut>(&self, operation: F) -> Result<()>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<()>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match operation().await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    let kind = classify_upload_error(&e);
                    if attempt >= self.config.max_retries || !kind.is_retriable() {
                        return Err(e);
                    }
                    let delay = backoff_delay(attempt, kind);
                    warn!("传输失败（{:?}），{}ms 后重试: {}", kind, delay.as_millis(), e);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// 上传单个分块，带按次退避的重试
#[allow(clippy::too_many_arguments)]
async fn upload_one_chunk(
    transport: Arc<dyn BlobTransport>,
    target: Arc<UploadTarget>,
    source_path: Arc<PathBuf>,
    chunk: ChunkState,
    item_id: Arc<String>,
    events: EventSender,
    throttler: Arc<ProgressThrottler>,
    max_retries: u32,
) -> Result<()> {
    let block_id = BlockId::new(chunk.index)?;
    let data = chunk.read_data(&source_path).await?;

    let progress: ProgressFn = {
        let events = events.clone();
        let item_id = Arc::clone(&item_id);
        let chunk_index = chunk.index;
        Arc::new(move |sent, total| {
            let percent = byte_percent(sent, total);
            if percent >= 100 || throttler.should_emit() {
                emit(
                    &events,
                    UploadEvent::ChunkProgress {
                        item_id: (*item_id).clone(),
                        chunk_index,
                        progress: percent,
                    },
                );
            }
        })
    };

    let mut attempt: u32 = 0;
    let result = loop {
        match transport
            .put_block(&target, &block_id, data.clone(), Arc::clone(&progress))
            .await
        {
            Ok(()) => break Ok(()),
            Err(e) => {
                let kind = classify_upload_error(&e);
                if attempt >= max_retries || !kind.is_retriable() {
                    break Err(e);
                }
                let delay = backoff_delay(attempt, kind);
                warn!(
                    "分块 {} 失败（{:?}），{}ms 后重试: {}",
                    chunk.index,
                    kind,
                    delay.as_millis(),
                    e
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    };

    match result {
        Ok(()) => {
            emit(
                &events,
                UploadEvent::ChunkCompleted {
                    item_id: (*item_id).clone(),
                    chunk_index: chunk.index,
                },
            );
            Ok(())
        }
        Err(e) => {
            warn!("分块 {} 上传失败: {}", chunk.index, e);
            emit(
                &events,
                UploadEvent::ChunkFailed {
                    item_id: (*item_id).clone(),
                    chunk_index: chunk.index,
                    error: e.to_string(),
                },
            );
            Err(e)
        }
    }
}

/// 字节进度换算成百分比
fn byte_percent(sent: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    ((sent.saturating_mul(100)) / total).min(100) as u8
}

/// 对象名扩展名和源文件不一致时，替换成源文件的扩展名
fn fix_blob_extension(blob_name: &str, original_name: &str) -> String {
    let Some(ext) = file_extension(original_name) else {
        return blob_name.to_string();
    };
    let suffix = format!(".{}", ext.to_lowercase());
    if blob_name.to_lowercase().ends_with(&suffix) {
        return blob_name.to_string();
    }
    match blob_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => format!("{}.{}", stem, ext),
        _ => format!("{}.{}", blob_name, ext),
    }
}
