// 服务入口门面
//
// 供外层接入层（请求解析、临时暂存）调用的三类入口：
// 上传、令牌签发、容量查询。
//
// 进程级上传并发没有内置上限，由嵌入方注入信号量统一约束；
// 许可在单次上传的全程持有。

use crate::auth::TokenManager;
use crate::config::{RcloneConfigStore, RemoteSiteTable};
use crate::error::DriveError;
use crate::onedrive::{DriveQuota, DriveTransport, ItemMetadata};
use crate::quota::QuotaReporter;
use crate::uploader::{UploadEngine, UploadParams, MAX_FILE_SIZE, MAX_PARALLEL_CHUNKS};
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// 默认单分片最大重试次数
const DEFAULT_MAX_RETRIES: u32 = 5;

/// 默认重试固定间隔
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(10);

/// 分片大小下限（MB）
const MIN_CHUNK_SIZE_MB: u64 = 2;

/// 分片大小上限（MB）
const MAX_CHUNK_SIZE_MB: u64 = 32;

/// 上传请求（由外层接入层解析后传入）
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// 远端名称
    pub remote: String,
    /// 远端子目录（相对上传根目录，可为空）
    pub remote_folder: String,
    /// 文件名
    pub file_name: String,
    /// 文件总大小（字节）
    pub total_size: u64,
    /// 分片大小（MB），范围 [2, 32]
    pub chunk_size_mb: u64,
    /// 并发分片数，范围 [1, 4]
    pub parallel_chunks: usize,
}

/// 上传结果
#[derive(Debug, Clone, Serialize)]
pub struct UploadOutcome {
    /// 远端文件元数据
    pub item: ItemMetadata,
    /// 文件名
    pub file_name: String,
    /// 索引站点下载地址
    pub download_url: String,
}

/// 令牌签发结果
///
/// 仅面向受信任的内部调用方：响应包含长期凭据，
/// 到达此入口前必须由外层完成调用方身份认证
#[derive(Debug, Clone, Serialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: String,
    /// 剩余有效期（秒）
    pub expires_in: i64,
    pub client_id: String,
    pub client_secret: String,
    pub drive_id: String,
    pub drive_type: String,
    pub base_url: String,
    pub upload_root_path: String,
}

/// 服务门面
pub struct DriveService {
    /// 令牌管理器
    tokens: Arc<TokenManager>,
    /// 出站传输
    transport: Arc<dyn DriveTransport>,
    /// 容量报告器
    quota: QuotaReporter,
    /// 外部注入的全局上传并发上限
    upload_limiter: Option<Arc<Semaphore>>,
    /// 单分片最大重试次数
    max_retries: u32,
    /// 重试固定间隔
    retry_delay: Duration,
}

impl DriveService {
    /// 创建服务门面
    ///
    /// # 参数
    /// * `store` - 已解析的凭据存储
    /// * `sites` - 远端站点表
    /// * `transport` - 出站传输（生产环境为 GraphClient）
    pub fn new(
        store: Arc<RcloneConfigStore>,
        sites: RemoteSiteTable,
        transport: Arc<dyn DriveTransport>,
    ) -> Self {
        let tokens = Arc::new(TokenManager::new(store, sites, transport.clone()));
        let quota = QuotaReporter::new(tokens.clone(), transport.clone());
        Self {
            tokens,
            transport,
            quota,
            upload_limiter: None,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// 注入全局上传并发上限
    pub fn with_upload_limiter(mut self, limiter: Arc<Semaphore>) -> Self {
        self.upload_limiter = Some(limiter);
        self
    }

    /// 覆盖重试策略
    pub fn with_retry_policy(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }

    /// 上传入口
    ///
    /// # 参数
    /// * `request` - 上传请求
    /// * `reader` - 文件内容字节流（只按序读取一次）
    /// * `cancel` - 取消令牌
    pub async fn upload<R>(
        &self,
        request: UploadRequest,
        reader: R,
        cancel: CancellationToken,
    ) -> Result<UploadOutcome, DriveError>
    where
        R: AsyncRead + Unpin + Send,
    {
        validate_request(&request)?;

        let now = Utc::now();
        let cred = self.tokens.ensure_valid(&request.remote, now).await?;
        let concurrent_fragments = self
            .tokens
            .site(&request.remote)
            .map(|s| s.concurrent_fragments)
            .unwrap_or(false);

        let remote_path = join_remote_path(&[
            &cred.root_folder,
            &request.remote_folder,
            &request.file_name,
        ]);
        info!(
            "处理上传: remote={}, path={}, size={}",
            request.remote, remote_path, request.total_size
        );

        let params = UploadParams {
            remote_path,
            total_size: request.total_size,
            chunk_size: request.chunk_size_mb * 1024 * 1024,
            parallel_chunks: request.parallel_chunks,
            max_retries: self.max_retries,
            retry_delay: self.retry_delay,
            concurrent_fragments,
        };

        // 许可持有到上传结束
        let _permit = match &self.upload_limiter {
            Some(limiter) => Some(
                limiter
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|e| DriveError::Internal(format!("并发限制器已关闭: {}", e)))?,
            ),
            None => None,
        };

        let engine = UploadEngine::new(self.transport.clone(), cancel);
        let item = engine
            .upload(reader, &cred.access_token, &cred.drive_id, &params)
            .await?;

        let download_url =
            build_download_url(&cred.base_url, &request.remote_folder, &request.file_name);

        Ok(UploadOutcome {
            item,
            file_name: request.file_name,
            download_url,
        })
    }

    /// 令牌签发入口
    pub async fn get_token(&self, remote: &str) -> Result<TokenGrant, DriveError> {
        let now = Utc::now();
        let cred = self.tokens.ensure_valid(remote, now).await?;

        Ok(TokenGrant {
            expires_in: (cred.expiry - now).num_seconds(),
            access_token: cred.access_token,
            refresh_token: cred.refresh_token,
            client_id: cred.client_id,
            client_secret: cred.client_secret,
            drive_id: cred.drive_id,
            drive_type: cred.drive_type,
            base_url: cred.base_url,
            upload_root_path: cred.root_folder,
        })
    }

    /// 查询单个远端容量
    pub async fn get_quota(&self, remote: &str) -> Result<DriveQuota, DriveError> {
        self.quota.get_quota(remote, Utc::now()).await
    }

    /// 聚合查询全部远端容量（失败的远端被跳过）
    pub async fn get_all_quotas(&self) -> HashMap<String, DriveQuota> {
        self.quota.get_all_quotas(Utc::now()).await
    }
}

/// 请求校验，任何网络调用之前执行
fn validate_request(request: &UploadRequest) -> Result<(), DriveError> {
    if request.file_name.trim().is_empty() {
        return Err(DriveError::Validation("文件名不能为空".into()));
    }
    if !(MIN_CHUNK_SIZE_MB..=MAX_CHUNK_SIZE_MB).contains(&request.chunk_size_mb) {
        return Err(DriveError::Validation(format!(
            "分片大小（MB）必须在 {} 到 {} 之间",
            MIN_CHUNK_SIZE_MB, MAX_CHUNK_SIZE_MB
        )));
    }
    if request.total_size == 0 {
        return Err(DriveError::Validation("文件大小必须大于 0".into()));
    }
    if request.total_size > MAX_FILE_SIZE {
        return Err(DriveError::Validation(format!(
            "文件大小 {} 超过上限 {} 字节",
            request.total_size, MAX_FILE_SIZE
        )));
    }
    if !(1..=MAX_PARALLEL_CHUNKS).contains(&request.parallel_chunks) {
        return Err(DriveError::Validation(format!(
            "并发分片数必须在 1 到 {} 之间",
            MAX_PARALLEL_CHUNKS
        )));
    }
    Ok(())
}

/// 拼接远端路径，忽略空段
fn join_remote_path(segments: &[&str]) -> String {
    segments
        .iter()
        .flat_map(|s| s.split('/'))
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// 拼接索引站点下载地址
fn build_download_url(base_url: &str, folder: &str, file_name: &str) -> String {
    let mut parts = vec![base_url.trim_end_matches('/').to_string()];
    parts.extend(
        folder
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string),
    );
    parts.push(file_name.to_string());
    parts.join("/")
}
