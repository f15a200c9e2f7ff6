// 批量分组
//
// 把一次无序多选的文件聚合成若干逻辑记录：
// 按拍摄时间升序扫描一遍，同类型且时间戳落在组锚点窗口内的文件归入同组。
// 锚点固定为组内第一个文件的时间戳，不随新成员重新居中，
// 因此窗口是从锚点出发的单向窗口——这是对线上行为的精确复刻，
// 不要当成 bug 顺手改掉

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// 媒体类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MediaType {
    /// 全景视频（.360）
    Panorama,
    /// 普通照片/视频
    Photo,
}

/// 从文件名推断媒体类型
pub fn infer_media_type(filename: &str) -> MediaType {
    if filename.to_lowercase().ends_with(".360") {
        MediaType::Panorama
    } else {
        MediaType::Photo
    }
}

/// 参与分组的已选文件
#[derive(Debug, Clone)]
pub struct SelectedFile {
    /// 本地路径
    pub path: PathBuf,
    /// 文件名
    pub file_name: String,
    /// 推断的媒体类型
    pub media_type: MediaType,
    /// 拍摄/修改时间戳
    pub modified_at: DateTime<Utc>,
    /// 文件大小
    pub size: u64,
}

impl SelectedFile {
    /// 从本地文件构造，时间戳取文件系统的修改时间
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let metadata = std::fs::metadata(&path)
            .with_context(|| format!("读取文件元数据失败: {:?}", path))?;
        let modified = metadata
            .modified()
            .with_context(|| format!("读取文件修改时间失败: {:?}", path))?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let media_type = infer_media_type(&file_name);

        Ok(Self {
            path,
            file_name,
            media_type,
            modified_at: DateTime::<Utc>::from(modified),
            size: metadata.len(),
        })
    }
}

/// 逻辑记录分组
///
/// 分组一旦建立不再变更（成员追加发生在建立阶段，建立后只读）
#[derive(Debug, Clone)]
pub struct RecordGroup {
    /// 组内媒体类型
    pub media_type: MediaType,
    /// 锚点时间戳（组内第一个文件）
    pub anchor: DateTime<Utc>,
    /// 成员文件，按时间升序
    pub members: Vec<SelectedFile>,
    /// 生成的记录名："<批次名> <序号>"
    pub generated_name: String,
}

/// 把文件选集聚合成记录分组
///
/// # 参数
/// * `batch_name` - 批次名，用于生成记录名
/// * `files` - 已选文件（无序）
/// * `window_ms` - 时间窗口（毫秒）
pub fn group_files(batch_name: &str, mut files: Vec<SelectedFile>, window_ms: i64) -> Vec<RecordGroup> {
    files.sort_by_key(|f| f.modified_at);

    let mut groups: Vec<RecordGroup> = Vec::new();

    for file in files {
        let existing = groups.iter_mut().find(|group| {
            group.media_type == file.media_type
                && (file.modified_at - group.anchor)
                    .num_milliseconds()
                    .abs()
                    <= window_ms
        });

        match existing {
            Some(group) => group.members.push(file),
            None => {
                let generated_name = format!("{} {}", batch_name, groups.len() + 1);
                groups.push(RecordGroup {
                    media_type: file.media_type,
                    anchor: file.modified_at,
                    members: vec![file],
                    generated_name,
                });
            }
        }
    }

    groups
}

/// 文件名后缀（不含点）
pub fn file_extension(file_name: &str) -> Option<&str> {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
}
