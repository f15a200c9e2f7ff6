// 上传引擎模块
//
// chunk     分块计划与分块状态
// task      上传项状态机
// scheduler 有界并发调度
// engine    单项上传流程
// grouper   批量文件分组
// queue     队列执行与事件折叠

pub mod chunk;
pub mod engine;
pub mod grouper;
pub mod queue;
pub mod scheduler;
pub mod task;

#[cfg(test)]
pub(crate) mod test_support;

pub use chunk::{plan_upload, ChunkPlan, ChunkState, ChunkStatus, UploadPlan};
pub use engine::UploadEngine;
pub use grouper::{group_files, infer_media_type, MediaType, RecordGroup, SelectedFile};
pub use queue::{UploadQueue, UploadSummary};
pub use scheduler::BoundedScheduler;
pub use task::{suggested_name, ItemStatus, UploadItem};
