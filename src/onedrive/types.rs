// Graph API 数据类型

use serde::{Deserialize, Serialize};

/// 创建上传会话响应
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSessionResponse {
    /// 分片上传地址（带预授权，会话超时后由服务端回收）
    #[serde(rename = "uploadUrl")]
    pub upload_url: String,

    /// 会话过期时间（服务端侧约束，引擎不主动续期）
    #[serde(rename = "expirationDateTime", default)]
    pub expiration: Option<String>,
}

/// 上传完成后返回的文件元数据（DriveItem 的子集）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemMetadata {
    /// 文件 ID
    pub id: String,

    /// 文件大小（字节）
    #[serde(default)]
    pub size: u64,

    /// 文件 Web 访问地址
    #[serde(rename = "webUrl", default)]
    pub web_url: Option<String>,
}

/// OAuth2 刷新令牌交换响应
#[derive(Debug, Clone, Deserialize)]
pub struct TokenRefreshResponse {
    /// 新的访问令牌
    pub access_token: String,

    /// 轮换后的刷新令牌（服务端可能不轮换）
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// 有效期（秒）
    pub expires_in: i64,
}

/// 驱动器容量信息
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DriveQuota {
    /// 总容量（字节）
    #[serde(default)]
    pub total: u64,

    /// 已用容量
    #[serde(default)]
    pub used: u64,

    /// 剩余容量
    #[serde(default)]
    pub remaining: u64,

    /// 回收站占用
    #[serde(default)]
    pub deleted: u64,
}

/// 驱动器根元数据响应（仅取 quota 字段）
#[derive(Debug, Deserialize)]
pub struct DriveResponse {
    pub quota: DriveQuota,
}

/// 单个分片的服务端确认
#[derive(Debug, Clone)]
pub enum ChunkAck {
    /// 202：中间分片已接受，继续传输
    Accepted,
    /// 200/201：最终分片完成，返回文件元数据
    Completed(ItemMetadata),
}
