// Media Upload Rust Library
// 大文件媒体分块上传核心库
//
// 面向 Block Blob 存储的可恢复分块上传：
// - 分块计划（阈值/分块大小独立可调）
// - 按索引有序的块清单提交
// - 有并发上限的上传队列调度
// - 批量文件按类型+时间窗口聚合成逻辑记录

// 配置管理模块
pub mod config;

// 日志系统模块
pub mod logging;

// 事件流模块
pub mod events;

// 记录服务模块（上传预授权/确认）
pub mod records;

// Blob 存储模块
pub mod storage;

// 上传引擎模块
pub mod uploader;

// 导出常用类型
pub use config::{AppConfig, GroupingConfig, LogConfig, UploadConfig};
pub use events::{EventSender, ProgressThrottler, UploadEvent};
pub use records::{
    ConfirmUploadRequest, CreateRecordRequest, HttpRecordService, RecordCreated, RecordService,
    UploadAuthorization, UploadRequest,
};
pub use storage::{
    block_list_manifest, AzureBlobTransport, BlobTransport, BlockId, StorageError, UploadTarget,
    MAX_BLOCK_COUNT,
};
pub use uploader::{
    group_files, infer_media_type, plan_upload, BoundedScheduler, ChunkPlan, ChunkState,
    ChunkStatus, ItemStatus, MediaType, RecordGroup, SelectedFile, UploadEngine, UploadItem,
    UploadPlan, UploadQueue, UploadSummary,
};
