// 记录服务模块
//
// 上传核心的后端协作方：
// - create_record: 批量上传前为每个分组创建逻辑记录
// - request_upload: 为目标记录签发预授权上传地址
// - confirm_upload: 对象落盘并提交后告知后端

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// 上传预授权请求
#[derive(Debug, Clone, Serialize)]
pub struct UploadRequest {
    /// 最终文件名
    pub title: String,
    /// 内容类型
    pub content_type: String,
}

/// 上传预授权响应
#[derive(Debug, Clone, Deserialize)]
pub struct UploadAuthorization {
    /// 预授权写入地址（含授权查询串）
    pub upload_url: String,
    /// 存储层分配的对象名
    pub blob_name: String,
}

/// 确认上传请求
///
/// date_time 必须是源文件的时间戳，不是提交时刻的墙钟时间
#[derive(Debug, Clone, Serialize)]
pub struct ConfirmUploadRequest {
    /// 修正扩展名后的对象名
    pub blob_name: String,
    /// 最终文件名
    pub title: String,
    /// 内容类型
    pub content_type: String,
    /// 源文件时间戳（RFC 3339）
    pub date_time: String,
}

/// 创建记录请求
#[derive(Debug, Clone, Serialize)]
pub struct CreateRecordRequest {
    /// 记录名（"<批次名> <序号>"）
    pub name: String,
    /// 记录时间戳（RFC 3339）
    pub date_time: String,
}

/// 创建记录响应
#[derive(Debug, Clone, Deserialize)]
pub struct RecordCreated {
    /// 记录 ID
    pub id: i64,
}

/// 记录服务接口
#[async_trait]
pub trait RecordService: Send + Sync {
    /// 创建一条逻辑记录
    async fn create_record(&self, request: &CreateRecordRequest) -> Result<RecordCreated>;

    /// 为记录签发上传预授权
    async fn request_upload(
        &self,
        record_id: i64,
        request: &UploadRequest,
    ) -> Result<UploadAuthorization>;

    /// 确认上传完成
    async fn confirm_upload(&self, record_id: i64, request: &ConfirmUploadRequest) -> Result<()>;
}

/// 记录服务 HTTP 客户端
#[derive(Debug, Clone)]
pub struct HttpRecordService {
    /// HTTP 客户端
    client: Client,
    /// 服务根地址，如 https://api.example.com
    base_url: String,
    /// 鉴权令牌（Bearer）
    auth_token: Option<String>,
}

impl HttpRecordService {
    /// 创建新的记录服务客户端
    pub fn new(base_url: impl Into<String>, auth_token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("创建 HTTP 客户端失败")?;

        let base_url: String = base_url.into();
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token,
        })
    }

    fn request(&self, url: String) -> reqwest::RequestBuilder {
        let mut builder = self.client.post(url);
        if let Some(ref token) = self.auth_token {
            builder = builder.bearer_auth(token);
        }
        builder
    }
}

#[async_trait]
impl RecordService for HttpRecordService {
    async fn create_record(&self, request: &CreateRecordRequest) -> Result<RecordCreated> {
        let url = format!("{}/records/", self.base_url);
        debug!("创建记录: name={}", request.name);

        let response = self
            .request(url)
            .json(request)
            .send()
            .await
            .context("创建记录请求失败")?
            .error_for_status()
            .context("创建记录被拒绝")?;

        let created: RecordCreated = response.json().await.context("解析创建记录响应失败")?;
        info!("记录已创建: id={}, name={}", created.id, request.name);
        Ok(created)
    }

    async fn request_upload(
        &self,
        record_id: i64,
        request: &UploadRequest,
    ) -> Result<UploadAuthorization> {
        let url = format!("{}/records/{}/request_upload/", self.base_url, record_id);
        debug!("请求上传预授权: record_id={}, title={}", record_id, request.title);

        let response = self
            .request(url)
            .json(request)
            .send()
            .await
            .context("请求上传预授权失败")?
            .error_for_status()
            .context("上传预授权被拒绝")?;

        let auth: UploadAuthorization = response.json().await.context("解析预授权响应失败")?;
        debug!("预授权已签发: blob_name={}", auth.blob_name);
        Ok(auth)
    }

    async fn confirm_upload(&self, record_id: i64, request: &ConfirmUploadRequest) -> Result<()> {
        let url = format!("{}/records/{}/confirm_upload/", self.base_url, record_id);
        debug!(
            "确认上传: record_id={}, blob_name={}, date_time={}",
            record_id, request.blob_name, request.date_time
        );

        self.request(url)
            .json(request)
            .send()
            .await
            .context("确认上传请求失败")?
            .error_for_status()
            .context("确认上传被拒绝")?;

        info!("上传已确认: record_id={}, blob_name={}", record_id, request.blob_name);
        Ok(())
    }
}
