//! 上传事件流模块
//!
//! 所有上传进度/状态变化通过单一类型化事件通道上报，
//! 由队列持有方消费，取代逐层传递的进度回调

pub mod throttle;
pub mod types;

pub use throttle::{ProgressThrottler, DEFAULT_THROTTLE_INTERVAL_MS};
pub use types::{emit, EventPriority, EventSender, UploadEvent};
