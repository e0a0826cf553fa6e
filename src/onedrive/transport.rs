// 出站传输接口
//
// 令牌刷新、会话创建、分片传输、容量查询四类网络调用都经由该 trait，
// 生产实现为 GraphClient；测试注入脚本化实现以观察调用次数与顺序。

use crate::config::RemoteCredential;
use crate::error::DriveError;
use crate::onedrive::types::{ChunkAck, CreateSessionResponse, DriveQuota, TokenRefreshResponse};
use async_trait::async_trait;

#[async_trait]
pub trait DriveTransport: Send + Sync {
    /// OAuth2 refresh_token 授权交换
    async fn refresh_token(
        &self,
        cred: &RemoteCredential,
    ) -> Result<TokenRefreshResponse, DriveError>;

    /// 创建可续传上传会话（同名冲突策略：替换）
    async fn create_upload_session(
        &self,
        access_token: &str,
        drive_id: &str,
        remote_path: &str,
    ) -> Result<CreateSessionResponse, DriveError>;

    /// 传输单个分片
    ///
    /// # 参数
    /// * `session_url` - 会话上传地址
    /// * `start` / `end` - 分片字节范围（end 为开区间）
    /// * `total_size` - 文件总大小
    /// * `data` - 分片数据
    async fn upload_chunk(
        &self,
        session_url: &str,
        access_token: &str,
        start: u64,
        end: u64,
        total_size: u64,
        data: Vec<u8>,
    ) -> Result<ChunkAck, DriveError>;

    /// 查询驱动器容量
    async fn drive_quota(
        &self,
        access_token: &str,
        drive_id: &str,
    ) -> Result<DriveQuota, DriveError>;
}
