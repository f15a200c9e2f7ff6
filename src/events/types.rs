//! 上传事件类型定义
//!
//! 定义文件级和分块级的所有事件，按条目 ID 关联

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// 事件发送端
pub type EventSender = mpsc::UnboundedSender<UploadEvent>;

/// 事件优先级
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EventPriority {
    /// 低优先级：进度更新
    Low = 0,
    /// 中优先级：状态变更
    Medium = 1,
    /// 高优先级：完成、失败、队列结束
    High = 2,
}

/// 上传事件
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum UploadEvent {
    /// 文件开始上传
    ItemStarted {
        item_id: String,
        /// 分块数（单次直传时为 None）
        chunk_count: Option<usize>,
    },
    /// 文件整体进度（单次直传路径按字节比例上报）
    ItemProgress { item_id: String, progress: u8 },
    /// 分块进度（已发送字节 / 分块字节）
    ChunkProgress {
        item_id: String,
        chunk_index: usize,
        progress: u8,
    },
    /// 分块上传完成
    ChunkCompleted { item_id: String, chunk_index: usize },
    /// 分块上传失败（不影响同文件其他在途分块）
    ChunkFailed {
        item_id: String,
        chunk_index: usize,
        error: String,
    },
    /// 文件上传完成（已提交并确认）
    ItemCompleted { item_id: String, blob_name: String },
    /// 文件上传失败
    ItemFailed { item_id: String, error: String },
    /// 队列全部终态，上报汇总
    QueueDrained {
        success_count: usize,
        error_count: usize,
        message: String,
    },
}

impl UploadEvent {
    /// 获取条目 ID（队列级事件返回 None）
    pub fn item_id(&self) -> Option<&str> {
        match self {
            UploadEvent::ItemStarted { item_id, .. } => Some(item_id),
            UploadEvent::ItemProgress { item_id, .. } => Some(item_id),
            UploadEvent::ChunkProgress { item_id, .. } => Some(item_id),
            UploadEvent::ChunkCompleted { item_id, .. } => Some(item_id),
            UploadEvent::ChunkFailed { item_id, .. } => Some(item_id),
            UploadEvent::ItemCompleted { item_id, .. } => Some(item_id),
            UploadEvent::ItemFailed { item_id, .. } => Some(item_id),
            UploadEvent::QueueDrained { .. } => None,
        }
    }

    /// 获取事件优先级
    pub fn priority(&self) -> EventPriority {
        match self {
            UploadEvent::ItemProgress { .. } | UploadEvent::ChunkProgress { .. } => {
                EventPriority::Low
            }
            UploadEvent::ItemStarted { .. } | UploadEvent::ChunkCompleted { .. } => {
                EventPriority::Medium
            }
            UploadEvent::ChunkFailed { .. }
            | UploadEvent::ItemCompleted { .. }
            | UploadEvent::ItemFailed { .. }
            | UploadEvent::QueueDrained { .. } => EventPriority::High,
        }
    }

    /// 是否为进度类事件（可被节流丢弃）
    pub fn is_progress(&self) -> bool {
        self.priority() == EventPriority::Low
    }
}

/// 发送事件，接收端已关闭时静默丢弃
pub fn emit(tx: &EventSender, event: UploadEvent) {
    let _ = tx.send(event);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_id_extraction() {
        let ev = UploadEvent::ChunkCompleted {
            item_id: "item-1".to_string(),
            chunk_index: 3,
        };
        assert_eq!(ev.item_id(), Some("item-1"));

        let ev = UploadEvent::QueueDrained {
            success_count: 2,
            error_count: 0,
            message: "done".to_string(),
        };
        assert_eq!(ev.item_id(), None);
    }

    #[test]
    fn test_priority_ordering() {
        let progress = UploadEvent::ChunkProgress {
            item_id: "a".to_string(),
            chunk_index: 0,
            progress: 50,
        };
        let failed = UploadEvent::ItemFailed {
            item_id: "a".to_string(),
            error: "x".to_string(),
        };
        assert!(progress.priority() < failed.priority());
        assert!(progress.is_progress());
        assert!(!failed.is_progress());
    }

    #[test]
    fn test_event_serialization_tag() {
        let ev = UploadEvent::ItemStarted {
            item_id: "a".to_string(),
            chunk_count: Some(4),
        };
        let json = serde_json::to_string(&ev).unwrap();
        assert!(json.contains("\"event_type\":\"item_started\""));
    }
}
