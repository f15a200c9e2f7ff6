// 分块计划
//
// 上传路径选择和分块布局都是纯计算：
// - 文件大小 <= 阈值 T：单次直传
// - 文件大小 >  阈值 T：按分块大小 C 切分，num_chunks = ceil(size / C)
//
// T 和 C 是独立可调参数：T 决定走不走分块路径，C 决定块的字节数。
// 两者混用是正确性问题而不是风格问题——C 取得过大时，
// 超过 T 的文件也可能只切出一个块，但它仍然走分块提交路径

use crate::storage::{StorageError, MAX_BLOCK_COUNT};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::debug;

/// 上传计划
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadPlan {
    /// 单次直传
    Single {
        /// 文件总大小
        total_size: u64,
    },
    /// 分块上传
    Chunked {
        /// 分块大小
        chunk_size: u64,
        /// 分块数量
        num_chunks: usize,
    },
}

impl UploadPlan {
    /// 是否为分块路径
    pub fn is_chunked(&self) -> bool {
        matches!(self, UploadPlan::Chunked { .. })
    }

    /// 分块数（单次直传为 None）
    pub fn chunk_count(&self) -> Option<usize> {
        match self {
            UploadPlan::Single { .. } => None,
            UploadPlan::Chunked { num_chunks, .. } => Some(*num_chunks),
        }
    }
}

/// 计算上传计划（纯函数，无副作用）
///
/// # 参数
/// * `file_size` - 文件大小（字节）
/// * `threshold` - 分块上传阈值 T
/// * `chunk_size` - 分块大小 C
pub fn plan_upload(file_size: u64, threshold: u64, chunk_size: u64) -> Result<UploadPlan> {
    if file_size <= threshold {
        return Ok(UploadPlan::Single {
            total_size: file_size,
        });
    }

    if chunk_size == 0 {
        bail!("分块大小不能为 0");
    }

    let num_chunks = file_size.div_ceil(chunk_size);
    if num_chunks > MAX_BLOCK_COUNT {
        return Err(StorageError::BlockIndexOutOfRange {
            index: num_chunks - 1,
            max: MAX_BLOCK_COUNT,
        }
        .into());
    }

    Ok(UploadPlan::Chunked {
        chunk_size,
        num_chunks: num_chunks as usize,
    })
}

/// 分块状态
///
/// index 是重组排序的唯一依据，创建后不可变；
/// 进度回调只会写自己的槽位
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkState {
    /// 分块索引
    pub index: usize,
    /// 字节范围
    pub range: Range<u64>,
    /// 进度 0-100
    pub progress: u8,
    /// 状态
    pub status: ChunkStatus,
}

/// 分块状态枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStatus {
    /// 等待中
    Pending,
    /// 上传中
    Uploading,
    /// 已完成
    Completed,
    /// 失败
    Error,
}

impl ChunkState {
    pub fn new(index: usize, range: Range<u64>) -> Self {
        Self {
            index,
            range,
            progress: 0,
            status: ChunkStatus::Pending,
        }
    }

    /// 分块大小
    pub fn size(&self) -> u64 {
        self.range.end - self.range.start
    }

    /// 是否已达终态
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, ChunkStatus::Completed | ChunkStatus::Error)
    }

    /// 读取分块数据
    pub async fn read_data(&self, file_path: &Path) -> Result<Vec<u8>> {
        let mut file = File::open(file_path)
            .await
            .with_context(|| format!("打开上传文件失败: {:?}", file_path))?;

        file.seek(std::io::SeekFrom::Start(self.range.start))
            .await
            .context("文件定位失败")?;

        let mut buffer = vec![0u8; self.size() as usize];
        file.read_exact(&mut buffer)
            .await
            .context("读取分块数据失败")?;

        debug!(
            "读取分块 #{}: bytes={}-{}, 大小={} bytes",
            self.index,
            self.range.start,
            self.range.end - 1,
            buffer.len()
        );

        Ok(buffer)
    }
}

/// 分块计划状态表
///
/// 分块路径下每个文件持有一份；重组顺序由索引决定，
/// 与各分块实际完成顺序无关
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkPlan {
    /// 所有分块，按索引升序
    chunks: Vec<ChunkState>,
    /// 文件总大小
    total_size: u64,
    /// 分块大小
    chunk_size: u64,
}

impl ChunkPlan {
    /// 按固定分块大小切分文件
    pub fn new(total_size: u64, chunk_size: u64) -> Result<Self> {
        if chunk_size == 0 {
            bail!("分块大小不能为 0");
        }
        if total_size.div_ceil(chunk_size) > MAX_BLOCK_COUNT {
            return Err(StorageError::BlockIndexOutOfRange {
                index: total_size.div_ceil(chunk_size) - 1,
                max: MAX_BLOCK_COUNT,
            }
            .into());
        }

        let mut chunks = Vec::new();
        let mut offset = 0u64;
        let mut index = 0;

        while offset < total_size {
            let end = std::cmp::min(offset + chunk_size, total_size);
            chunks.push(ChunkState::new(index, offset..end));
            offset = end;
            index += 1;
        }

        Ok(Self {
            chunks,
            total_size,
            chunk_size,
        })
    }

    /// 获取所有分块
    pub fn chunks(&self) -> &[ChunkState] {
        &self.chunks
    }

    /// 获取分块数量
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// 文件总大小
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// 更新单个分块的进度（只写自己的槽位）
    pub fn set_progress(&mut self, index: usize, progress: u8) {
        if let Some(chunk) = self.chunks.get_mut(index) {
            chunk.progress = progress.min(100);
        }
    }

    /// 更新单个分块的状态
    pub fn set_status(&mut self, index: usize, status: ChunkStatus) {
        if let Some(chunk) = self.chunks.get_mut(index) {
            chunk.status = status;
            if status == ChunkStatus::Completed {
                chunk.progress = 100;
            }
        }
    }

    /// 整体进度：所有分块进度的算术平均（四舍五入）
    pub fn aggregate_progress(&self) -> u8 {
        if self.chunks.is_empty() {
            return 0;
        }
        let sum: u64 = self.chunks.iter().map(|c| c.progress as u64).sum();
        ((sum as f64 / self.chunks.len() as f64).round() as u8).min(100)
    }

    /// 已完成分块数
    pub fn completed_count(&self) -> usize {
        self.chunks
            .iter()
            .filter(|c| c.status == ChunkStatus::Completed)
            .count()
    }

    /// 失败分块数
    pub fn failed_count(&self) -> usize {
        self.chunks
            .iter()
            .filter(|c| c.status == ChunkStatus::Error)
            .count()
    }

    /// 是否全部完成
    pub fn is_completed(&self) -> bool {
        self.chunks.iter().all(|c| c.status == ChunkStatus::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn test_plan_single_shot_at_or_below_threshold() {
        let plan = plan_upload(50 * MIB, 50 * MIB, 5 * MIB).unwrap();
        assert!(!plan.is_chunked());

        let plan = plan_upload(0, 50 * MIB, 5 * MIB).unwrap();
        assert_eq!(plan, UploadPlan::Single { total_size: 0 });
    }

    #[test]
    fn test_plan_chunked_above_threshold() {
        let plan = plan_upload(50 * MIB + 1, 50 * MIB, 5 * MIB).unwrap();
        assert_eq!(
            plan,
            UploadPlan::Chunked {
                chunk_size: 5 * MIB,
                num_chunks: 11, // ceil((50MiB+1) / 5MiB)
            }
        );

        let plan = plan_upload(100 * MIB, 50 * MIB, 5 * MIB).unwrap();
        assert_eq!(plan.chunk_count(), Some(20));
    }

    #[test]
    fn test_threshold_and_chunk_size_independent() {
        // C 大于文件大小时，超过 T 的文件仍走分块路径，只是只有一个块
        let plan = plan_upload(60 * MIB, 50 * MIB, 100 * MIB).unwrap();
        assert_eq!(
            plan,
            UploadPlan::Chunked {
                chunk_size: 100 * MIB,
                num_chunks: 1,
            }
        );
    }

    #[test]
    fn test_plan_rejects_excessive_chunk_count() {
        // 1 字节分块 + 超大文件，块数超出编码上限
        let result = plan_upload(MAX_BLOCK_COUNT + 1, 0, 1);
        assert!(result.is_err());
    }

    #[test]
    fn test_chunk_ranges() {
        let plan = ChunkPlan::new(16 * MIB, 4 * MIB).unwrap();
        assert_eq!(plan.chunk_count(), 4);
        assert_eq!(plan.chunks()[0].range, 0..(4 * MIB));
        assert_eq!(plan.chunks()[3].range, (12 * MIB)..(16 * MIB));

        // 末尾不完整分块
        let plan = ChunkPlan::new(17 * MIB, 4 * MIB).unwrap();
        assert_eq!(plan.chunk_count(), 5);
        assert_eq!(plan.chunks()[4].range, (16 * MIB)..(17 * MIB));
        assert_eq!(plan.chunks()[4].size(), MIB);
    }

    #[test]
    fn test_aggregate_progress_is_mean_of_chunk_progress() {
        let mut plan = ChunkPlan::new(16 * MIB, 4 * MIB).unwrap();
        assert_eq!(plan.aggregate_progress(), 0);

        plan.set_progress(0, 100);
        plan.set_progress(1, 50);
        // (100 + 50 + 0 + 0) / 4 = 37.5 -> 38
        assert_eq!(plan.aggregate_progress(), 38);

        for i in 0..4 {
            plan.set_status(i, ChunkStatus::Completed);
        }
        assert_eq!(plan.aggregate_progress(), 100);
        assert!(plan.is_completed());
    }

    #[test]
    fn test_status_bookkeeping() {
        let mut plan = ChunkPlan::new(12 * MIB, 4 * MIB).unwrap();

        plan.set_status(0, ChunkStatus::Completed);
        plan.set_status(1, ChunkStatus::Error);
        assert_eq!(plan.completed_count(), 1);
        assert_eq!(plan.failed_count(), 1);
        assert!(!plan.is_completed());

        // 完成态自动对齐进度
        assert_eq!(plan.chunks()[0].progress, 100);
    }

    #[tokio::test]
    async fn test_read_chunk_data() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        file.write_all(&data).unwrap();

        let chunk = ChunkState::new(1, 400..700);
        let read = chunk.read_data(file.path()).await.unwrap();
        assert_eq!(read, &data[400..700]);
    }
}
