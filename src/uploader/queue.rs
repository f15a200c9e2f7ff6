// 上传队列
//
// 持有全部上传项，跑一个有界并发的执行池，
// 并把引擎发出的事件折叠回各项的状态机。
// 状态只在折叠处变更，执行池只产出事件和结果

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::events::{emit, EventSender, UploadEvent};
use crate::records::CreateRecordRequest;
use crate::uploader::chunk::{plan_upload, ChunkPlan, UploadPlan};
use crate::uploader::engine::UploadEngine;
use crate::uploader::grouper::RecordGroup;
use crate::uploader::scheduler::BoundedScheduler;
use crate::uploader::task::{ItemStatus, UploadItem};

/// 批量路径统一使用的内容类型
const BATCH_CONTENT_TYPE: &str = "video/360";

/// 一轮队列执行的汇总
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSummary {
    pub success_count: usize,
    pub error_count: usize,
    pub message: String,
}

/// 上传队列
pub struct UploadQueue {
    engine: Arc<UploadEngine>,
    items: Vec<UploadItem>,
    external: Option<EventSender>,
}

impl UploadQueue {
    pub fn new(engine: Arc<UploadEngine>) -> Self {
        Self {
            engine,
            items: Vec::new(),
            external: None,
        }
    }

    /// 订阅事件流（进度、完成、失败、收尾汇总）
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<UploadEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.external = Some(tx);
        rx
    }

    /// 当前队列视图
    pub fn items(&self) -> &[UploadItem] {
        &self.items
    }

    pub fn push(&mut self, item: UploadItem) {
        self.items.push(item);
    }

    /// 逐组建记录，再把组内文件全部入队
    ///
    /// 记录名用生成的 "<批次名> <序号>"，记录时间戳取组锚点
    pub async fn enqueue_groups(&mut self, groups: &[RecordGroup]) -> Result<()> {
        for group in groups {
            let created = self
                .engine
                .records()
                .create_record(&CreateRecordRequest {
                    name: group.generated_name.clone(),
                    date_time: group.anchor.to_rfc3339(),
                })
                .await
                .with_context(|| format!("创建记录失败: {}", group.generated_name))?;
            info!("已创建记录 {} (id={})", group.generated_name, created.id);

            for member in &group.members {
                self.items.push(UploadItem::from_selected(
                    member,
                    created.id,
                    BATCH_CONTENT_TYPE,
                ));
            }
        }
        Ok(())
    }

    /// 执行所有待上传项，返回汇总
    ///
    /// 并发由配置的 max_concurrent_items 限制；单项失败不影响其他项
    pub async fn run(&mut self) -> UploadSummary {
        self.prepare_chunk_plans();

        let pending: Vec<UploadItem> = self
            .items
            .iter()
            .filter(|item| item.status == ItemStatus::Pending)
            .cloned()
            .collect();
        let total = pending.len();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let scheduler = BoundedScheduler::new(self.engine.config().max_concurrent_items);
        let engine = Arc::clone(&self.engine);

        let pool = {
            let tx = tx.clone();
            async move {
                scheduler
                    .run_all(pending, move |_, item| {
                        let engine = Arc::clone(&engine);
                        let tx = tx.clone();
                        async move {
                            let item_id = item.id.clone();
                            if let Err(e) = engine.upload_item(&item, &tx).await {
                                warn!("上传失败: {} - {}", item.title(), e);
                                emit(
                                    &tx,
                                    UploadEvent::ItemFailed {
                                        item_id,
                                        error: e.to_string(),
                                    },
                                );
                            }
                        }
                    })
                    .await
            }
        };
        // 池子收尾后关闭通道，折叠循环随之退出
        drop(tx);

        let external = self.external.clone();
        let items = &mut self.items;
        let fold = async {
            while let Some(event) = rx.recv().await {
                for item in items.iter_mut() {
                    item.apply(&event);
                }
                if let Some(external) = &external {
                    let _ = external.send(event);
                }
            }
        };

        let (results, ()) = tokio::join!(pool, fold);

        // 被 panic 打断的槽位没有收尾事件，补记为失败
        if results.iter().any(|r| r.is_none()) {
            for item in self.items.iter_mut() {
                if item.status == ItemStatus::Uploading || item.status == ItemStatus::Pending {
                    item.status = ItemStatus::Error;
                    item.error = Some("任务异常退出".to_string());
                }
            }
        }

        let success_count = self
            .items
            .iter()
            .filter(|i| i.status == ItemStatus::Completed)
            .count();
        let error_count = self
            .items
            .iter()
            .filter(|i| i.status == ItemStatus::Error)
            .count();
        let message = format!(
            "批量上传完成: {} 个成功, {} 个失败",
            success_count, error_count
        );
        info!("{} (共 {} 项)", message, total);

        if let Some(external) = &self.external {
            let _ = external.send(UploadEvent::QueueDrained {
                success_count,
                error_count,
                message: message.clone(),
            });
        }

        UploadSummary {
            success_count,
            error_count,
            message,
        }
    }

    /// 入队后、执行前给分块项挂上分块集合，折叠进度时用
    fn prepare_chunk_plans(&mut self) {
        let config = self.engine.config().clone();
        for item in &mut self.items {
            if item.status != ItemStatus::Pending || item.chunks.is_some() {
                continue;
            }
            if let Ok(UploadPlan::Chunked { chunk_size, .. }) =
                plan_upload(item.total_size, config.chunked_threshold, config.chunk_size)
            {
                if let Ok(plan) = ChunkPlan::new(item.total_size, chunk_size) {
                    item.chunks = Some(plan);
                }
            }
        }
    }
}
