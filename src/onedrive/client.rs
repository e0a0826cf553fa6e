// Graph API 客户端实现

use crate::config::RemoteCredential;
use crate::error::DriveError;
use crate::onedrive::transport::DriveTransport;
use crate::onedrive::types::{
    ChunkAck, CreateSessionResponse, DriveQuota, DriveResponse, ItemMetadata,
    TokenRefreshResponse,
};
use async_trait::async_trait;
use reqwest::header;
use reqwest::Client;
use tracing::{debug, info, warn};

/// Graph API 基础地址
pub const GRAPH_API_BASE: &str = "https://graph.microsoft.com/v1.0";

/// OAuth2 令牌端点
pub const OAUTH_TOKEN_URL: &str =
    "https://login.microsoftonline.com/common/oauth2/v2.0/token";

/// 单次请求超时（秒）
const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Graph API 客户端
///
/// 跨上传共享同一个连接池；除端点地址外无可变状态
#[derive(Debug, Clone)]
pub struct GraphClient {
    /// HTTP客户端
    client: Client,
    /// API 基础地址
    api_base: String,
    /// 令牌端点地址
    token_url: String,
}

impl GraphClient {
    /// 创建新的 Graph 客户端
    pub fn new() -> Result<Self, DriveError> {
        Self::with_endpoints(GRAPH_API_BASE, OAUTH_TOKEN_URL)
    }

    /// 指定端点地址创建客户端（测试时指向本地桩服务）
    pub fn with_endpoints(
        api_base: impl Into<String>,
        token_url: impl Into<String>,
    ) -> Result<Self, DriveError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| DriveError::Internal(format!("创建 HTTP 客户端失败: {}", e)))?;

        Ok(Self {
            client,
            api_base: api_base.into(),
            token_url: token_url.into(),
        })
    }

    /// 对远端路径逐段做百分号编码，保留路径分隔符
    fn encode_path(remote_path: &str) -> String {
        remote_path
            .split('/')
            .filter(|seg| !seg.is_empty())
            .map(|seg| urlencoding::encode(seg).into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }
}

#[async_trait]
impl DriveTransport for GraphClient {
    async fn refresh_token(
        &self,
        cred: &RemoteCredential,
    ) -> Result<TokenRefreshResponse, DriveError> {
        info!("刷新访问令牌: remote={}", cred.name);

        let params = [
            ("client_id", cred.client_id.as_str()),
            ("client_secret", cred.client_secret.as_str()),
            ("refresh_token", cred.refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .client
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| DriveError::Token {
                cause: format!("刷新请求发送失败: {}", e),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| DriveError::Token {
            cause: format!("读取刷新响应失败: {}", e),
        })?;

        if !status.is_success() {
            return Err(DriveError::Token {
                cause: format!("status={}, body={}", status, body),
            });
        }

        serde_json::from_str(&body).map_err(|e| DriveError::Token {
            cause: format!("解析刷新响应失败: {}", e),
        })
    }

    async fn create_upload_session(
        &self,
        access_token: &str,
        drive_id: &str,
        remote_path: &str,
    ) -> Result<CreateSessionResponse, DriveError> {
        let url = format!(
            "{}/drives/{}/root:/{}:/createUploadSession",
            self.api_base,
            drive_id,
            Self::encode_path(remote_path)
        );

        info!("创建上传会话: path={}", remote_path);

        // 同名冲突策略：替换
        let body = serde_json::json!({
            "item": { "@microsoft.graph.conflictBehavior": "replace" }
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| DriveError::session(None, format!("会话创建请求发送失败: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| DriveError::session(None, format!("读取会话创建响应失败: {}", e)))?;

        if !status.is_success() {
            return Err(DriveError::session(Some(status.as_u16()), text));
        }

        serde_json::from_str(&text).map_err(|e| {
            DriveError::session(
                Some(status.as_u16()),
                format!("解析会话创建响应失败: {}", e),
            )
        })
    }

    async fn upload_chunk(
        &self,
        session_url: &str,
        access_token: &str,
        start: u64,
        end: u64,
        total_size: u64,
        data: Vec<u8>,
    ) -> Result<ChunkAck, DriveError> {
        debug!(
            "传输分片: bytes={}-{}/{}, size={}",
            start,
            end - 1,
            total_size,
            data.len()
        );

        let response = self
            .client
            .put(session_url)
            .bearer_auth(access_token)
            .header(
                header::CONTENT_RANGE,
                format!("bytes {}-{}/{}", start, end - 1, total_size),
            )
            .header(header::CONTENT_LENGTH, data.len())
            .body(data)
            .send()
            .await
            .map_err(|e| DriveError::session(None, format!("分片请求发送失败: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| DriveError::session(None, format!("读取分片响应失败: {}", e)))?;

        match status.as_u16() {
            // 202: 中间分片已接受
            202 => Ok(ChunkAck::Accepted),
            // 200/201: 末分片完成，响应体为文件元数据
            200 | 201 => {
                let item: ItemMetadata = serde_json::from_str(&text).map_err(|e| {
                    DriveError::session(
                        Some(status.as_u16()),
                        format!("解析文件元数据失败: {}", e),
                    )
                })?;
                Ok(ChunkAck::Completed(item))
            }
            other => {
                warn!(
                    "分片被拒绝: status={}, range={}-{}, body={}",
                    other,
                    start,
                    end - 1,
                    text
                );
                Err(DriveError::session(Some(other), text))
            }
        }
    }

    async fn drive_quota(
        &self,
        access_token: &str,
        drive_id: &str,
    ) -> Result<DriveQuota, DriveError> {
        let url = format!("{}/drives/{}", self.api_base, drive_id);

        let response = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| DriveError::Quota(format!("容量请求发送失败: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| DriveError::Quota(format!("读取容量响应失败: {}", e)))?;

        if !status.is_success() {
            return Err(DriveError::Quota(format!(
                "status={}, body={}",
                status, body
            )));
        }

        let drive: DriveResponse = serde_json::from_str(&body)
            .map_err(|e| DriveError::Quota(format!("解析容量响应失败: {}", e)))?;
        Ok(drive.quota)
    }
}
