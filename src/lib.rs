// OneDrive Upload Rust Library
// OneDrive 分片续传上传核心库

// 凭据配置模块
pub mod config;

// 认证模块
pub mod auth;

// OneDrive (Graph API) 接入模块
pub mod onedrive;

// 上传引擎模块
pub mod uploader;

// 容量查询模块
pub mod quota;

// 服务入口模块
pub mod service;

// 日志模块
pub mod logging;

// 错误类型
pub mod error;

// 导出常用类型
pub use auth::{TokenManager, DEFAULT_REFRESH_MARGIN_SECS};
pub use config::{
    ObscureV1, PlainCodec, RcloneConfigStore, RemoteCredential, RemoteSite, RemoteSiteTable,
    ValueCodec,
};
pub use error::DriveError;
pub use onedrive::{
    ChunkAck, DriveQuota, DriveTransport, GraphClient, ItemMetadata, TokenRefreshResponse,
};
pub use quota::QuotaReporter;
pub use service::{DriveService, TokenGrant, UploadOutcome, UploadRequest};
pub use uploader::{
    plan_chunks, ChunkRange, SessionStatus, UploadEngine, UploadParams, UploadSession,
    MAX_CHUNK_SIZE, MAX_FILE_SIZE, MAX_PARALLEL_CHUNKS, MIN_CHUNK_SIZE,
};
