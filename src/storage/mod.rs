// Blob 存储模块
//
// 面向预授权 URL 的 Block Blob 协议：
// - 单次直传 PUT
// - 分块 PUT（comp=block）
// - 块清单提交 PUT（comp=blocklist）

pub mod azure;
pub mod block;
pub mod transport;

use thiserror::Error;

pub use azure::AzureBlobTransport;
pub use block::{block_ids_for, block_list_manifest, BlockId, BLOCK_ID_WIDTH, MAX_BLOCK_COUNT};
pub use transport::{BlobTransport, ProgressFn, UploadTarget};

/// 存储层错误
#[derive(Debug, Error)]
pub enum StorageError {
    /// 块索引超出固定宽度编码可表示的范围，继续编码会破坏排序
    #[error("块索引 {index} 超出编码上限 {max}")]
    BlockIndexOutOfRange { index: u64, max: u64 },

    /// 预授权 URL 缺少查询参数，无法构造分块/提交地址
    #[error("上传地址缺少授权参数: {url}")]
    MissingAuthToken { url: String },

    /// 服务端返回非 2xx 状态
    #[error("Blob PUT 失败: HTTP {status}")]
    PutStatus { status: u16 },

    /// 传输层错误（无响应）
    #[error("传输错误: {0}")]
    Transport(#[from] reqwest::Error),
}

/// 上传错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadErrorKind {
    /// 网络错误（可重试）
    Network,
    /// 超时（可重试）
    Timeout,
    /// 服务器错误（可重试）
    ServerError,
    /// 限流（可重试，需要更长等待时间）
    RateLimited,
    /// 资源不存在（不可重试）
    NotFound,
    /// 权限不足/授权过期（不可重试）
    Forbidden,
    /// 参数错误（不可重试）
    BadRequest,
    /// 未知错误
    Unknown,
}

impl UploadErrorKind {
    /// 是否可重试
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            UploadErrorKind::Network
                | UploadErrorKind::Timeout
                | UploadErrorKind::ServerError
                | UploadErrorKind::RateLimited
        )
    }
}

/// 错误分类
pub fn classify_upload_error(error: &anyhow::Error) -> UploadErrorKind {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("timeout") || error_str.contains("timed out") {
        UploadErrorKind::Timeout
    } else if error_str.contains("connection")
        || error_str.contains("network")
        || error_str.contains("dns")
    {
        UploadErrorKind::Network
    } else if error_str.contains("429") || error_str.contains("rate limit") {
        UploadErrorKind::RateLimited
    } else if error_str.contains("404") || error_str.contains("not found") {
        UploadErrorKind::NotFound
    } else if error_str.contains("403") || error_str.contains("forbidden") {
        UploadErrorKind::Forbidden
    } else if error_str.contains("400") || error_str.contains("bad request") {
        UploadErrorKind::BadRequest
    } else if error_str.contains("500") || error_str.contains("internal server") {
        UploadErrorKind::ServerError
    } else {
        UploadErrorKind::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_retriable() {
        assert!(UploadErrorKind::Network.is_retriable());
        assert!(UploadErrorKind::Timeout.is_retriable());
        assert!(UploadErrorKind::ServerError.is_retriable());
        assert!(UploadErrorKind::RateLimited.is_retriable());

        assert!(!UploadErrorKind::NotFound.is_retriable());
        assert!(!UploadErrorKind::Forbidden.is_retriable());
        assert!(!UploadErrorKind::BadRequest.is_retriable());
        assert!(!UploadErrorKind::Unknown.is_retriable());
    }

    #[test]
    fn test_classify_upload_error() {
        let e = anyhow::anyhow!("connection reset by peer");
        assert_eq!(classify_upload_error(&e), UploadErrorKind::Network);

        let e = anyhow::anyhow!("Blob PUT 失败: HTTP 403");
        assert_eq!(classify_upload_error(&e), UploadErrorKind::Forbidden);

        let e = anyhow::anyhow!("Blob PUT 失败: HTTP 500");
        assert_eq!(classify_upload_error(&e), UploadErrorKind::ServerError);

        let e = anyhow::anyhow!("something else");
        assert_eq!(classify_upload_error(&e), UploadErrorKind::Unknown);
    }
}
