// 上传任务状态机
//
// 每个上传项是一个显式状态机：pending → uploading → completed | error。
// 终态不可再变。所有状态迁移都经过 `UploadItem::apply`，
// 队列只负责把事件灌进来，不直接改字段

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::events::UploadEvent;
use crate::uploader::chunk::ChunkPlan;
use crate::uploader::grouper::{file_extension, MediaType, SelectedFile};

/// 上传项状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Pending,
    Uploading,
    Completed,
    Error,
}

impl ItemStatus {
    /// 是否终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemStatus::Completed | ItemStatus::Error)
    }
}

/// 单个上传项
#[derive(Debug, Clone)]
pub struct UploadItem {
    /// 队列内唯一标识
    pub id: String,
    /// 本地文件路径
    pub source_path: PathBuf,
    /// 目标记录 ID
    pub record_id: i64,
    /// 文件大小（字节）
    pub total_size: u64,
    /// 媒体类型
    pub media_type: MediaType,
    /// 原始文件名
    pub original_name: String,
    /// 按拍摄时间生成的建议名
    pub suggested_name: String,
    /// 用户改名（优先于建议名）
    pub custom_name: Option<String>,
    /// 上传内容类型
    pub content_type: String,
    /// 源文件修改时间（上传确认时回传）
    pub modified_at: DateTime<Utc>,
    /// 当前状态
    pub status: ItemStatus,
    /// 聚合进度 0..=100
    pub progress: u8,
    /// 失败原因
    pub error: Option<String>,
    /// 分块上传时的分块集合，直传为 None
    pub chunks: Option<ChunkPlan>,
    /// 服务端返回的 blob 名（完成后填充）
    pub blob_name: Option<String>,
}

impl UploadItem {
    /// 从已选文件构造上传项
    pub fn from_selected(file: &SelectedFile, record_id: i64, content_type: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source_path: file.path.clone(),
            record_id,
            total_size: file.size,
            media_type: file.media_type,
            original_name: file.file_name.clone(),
            suggested_name: suggested_name(&file.file_name, file.modified_at),
            custom_name: None,
            content_type: content_type.to_string(),
            modified_at: file.modified_at,
            status: ItemStatus::Pending,
            progress: 0,
            error: None,
            chunks: None,
            blob_name: None,
        }
    }

    /// 从本地路径构造上传项
    pub fn from_path(path: impl Into<PathBuf>, record_id: i64, content_type: &str) -> Result<Self> {
        let path: PathBuf = path.into();
        let selected = SelectedFile::from_path(path).context("构造上传项失败")?;
        Ok(Self::from_selected(&selected, record_id, content_type))
    }

    /// 上传标题：用户改名优先，否则用建议名
    pub fn title(&self) -> &str {
        self.custom_name.as_deref().unwrap_or(&self.suggested_name)
    }

    /// 纯函数式状态迁移：根据事件更新自身
    ///
    /// 终态一律忽略后续事件。不属于本项的事件同样忽略
    pub fn apply(&mut self, event: &UploadEvent) {
        if event.item_id() != Some(self.id.as_str()) {
            return;
        }
        if self.status.is_terminal() {
            return;
        }

        match event {
            UploadEvent::ItemStarted { .. } => {
                self.status = ItemStatus::Uploading;
            }
            UploadEvent::ItemProgress { progress, .. } => {
                self.status = ItemStatus::Uploading;
                self.progress = (*progress).min(100);
            }
            UploadEvent::ChunkProgress {
                chunk_index,
                progress,
                ..
            } => {
                self.status = ItemStatus::Uploading;
                if let Some(chunks) = &mut self.chunks {
                    chunks.set_progress(*chunk_index, *progress);
                    self.progress = chunks.aggregate_progress();
                }
            }
            UploadEvent::ChunkCompleted { chunk_index, .. } => {
                if let Some(chunks) = &mut self.chunks {
                    chunks.set_status(*chunk_index, crate::uploader::chunk::ChunkStatus::Completed);
                    self.progress = chunks.aggregate_progress();
                }
            }
            UploadEvent::ChunkFailed {
                chunk_index, error, ..
            } => {
                if let Some(chunks) = &mut self.chunks {
                    chunks.set_status(*chunk_index, crate::uploader::chunk::ChunkStatus::Error);
                }
                if self.error.is_none() {
                    self.error = Some(error.clone());
                }
            }
            UploadEvent::ItemCompleted { blob_name, .. } => {
                self.status = ItemStatus::Completed;
                self.progress = 100;
                self.blob_name = Some(blob_name.clone());
            }
            UploadEvent::ItemFailed { error, .. } => {
                self.status = ItemStatus::Error;
                self.error = Some(error.clone());
            }
            UploadEvent::QueueDrained { .. } => {}
        }
    }
}

/// 按拍摄时间生成建议名：`YYYYMMDD_HHMMSS_<原名主体>.<后缀>`
pub fn suggested_name(original_name: &str, modified_at: DateTime<Utc>) -> String {
    let stamp = modified_at.format("%Y%m%d_%H%M%S");
    match file_extension(original_name) {
        Some(ext) => {
            let stem = &original_name[..original_name.len() - ext.len() - 1];
            format!("{}_{}.{}", stamp, stem, ext)
        }
        None => format!("{}_{}", stamp, original_name),
    }
}
