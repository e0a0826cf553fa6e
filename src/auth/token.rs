// 令牌生命周期管理
//
// 刷新时机：剩余有效期低于安全余量时提前刷新，保证任何网络调用
// 使用的访问令牌在调用时刻既非空也未过期
//
// 缓存：按远端名缓存凭据，每个远端一把异步互斥锁，
// 请求突发时同一远端只会发起一次刷新

use crate::config::{RcloneConfigStore, RemoteCredential, RemoteSite, RemoteSiteTable};
use crate::error::DriveError;
use crate::onedrive::DriveTransport;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// 默认安全余量：过期前 5 分钟即触发刷新
pub const DEFAULT_REFRESH_MARGIN_SECS: i64 = 300;

/// 令牌管理器
pub struct TokenManager {
    /// 已解析的凭据存储（只读）
    store: Arc<RcloneConfigStore>,
    /// 远端站点表
    sites: RemoteSiteTable,
    /// 出站传输
    transport: Arc<dyn DriveTransport>,
    /// 远端名 -> 凭据缓存
    cache: DashMap<String, Arc<Mutex<RemoteCredential>>>,
    /// 刷新安全余量
    margin: Duration,
}

impl TokenManager {
    /// 创建令牌管理器（默认安全余量）
    pub fn new(
        store: Arc<RcloneConfigStore>,
        sites: RemoteSiteTable,
        transport: Arc<dyn DriveTransport>,
    ) -> Self {
        Self::with_margin(store, sites, transport, DEFAULT_REFRESH_MARGIN_SECS)
    }

    /// 创建令牌管理器并指定安全余量（秒）
    pub fn with_margin(
        store: Arc<RcloneConfigStore>,
        sites: RemoteSiteTable,
        transport: Arc<dyn DriveTransport>,
        margin_secs: i64,
    ) -> Self {
        Self {
            store,
            sites,
            transport,
            cache: DashMap::new(),
            margin: Duration::seconds(margin_secs),
        }
    }

    /// 凭据存储访问（供容量聚合等遍历远端）
    pub fn store(&self) -> &RcloneConfigStore {
        &self.store
    }

    /// 远端站点信息
    pub fn site(&self, remote: &str) -> Option<&RemoteSite> {
        self.sites.get(remote)
    }

    /// 取出或建立缓存条目
    fn cache_entry(&self, remote: &str) -> Result<Arc<Mutex<RemoteCredential>>, DriveError> {
        if let Some(entry) = self.cache.get(remote) {
            return Ok(entry.clone());
        }

        let site = self.sites.get(remote).ok_or_else(|| {
            DriveError::Config(format!("远端 [{}] 未在站点表中注册", remote))
        })?;
        let cred = self.store.credential(remote, site)?;

        // 并发竞争时以先插入者为准，重复组装的凭据被丢弃
        Ok(self
            .cache
            .entry(remote.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(cred)))
            .clone())
    }

    /// 确保远端持有有效访问令牌
    ///
    /// `now + 余量 < expiry` 且令牌非空时不发起任何网络调用；
    /// 否则执行一次 refresh_token 授权交换（失败允许再补偿一次），
    /// 成功后更新访问令牌、可能轮换的刷新令牌与过期时间
    ///
    /// # 参数
    /// * `remote` - 远端名称
    /// * `now` - 当前时刻（由调用方注入，便于测试）
    ///
    /// # 返回
    /// 刷新后的凭据快照
    pub async fn ensure_valid(
        &self,
        remote: &str,
        now: DateTime<Utc>,
    ) -> Result<RemoteCredential, DriveError> {
        let entry = self.cache_entry(remote)?;
        let mut cred = entry.lock().await;

        if !cred.access_token.is_empty() && now + self.margin < cred.expiry {
            debug!(
                "令牌仍然有效: remote={}, 剩余={}s",
                remote,
                (cred.expiry - now).num_seconds()
            );
            return Ok(cred.clone());
        }

        info!("令牌为空或即将过期，执行刷新: remote={}", remote);

        let response = match self.transport.refresh_token(&cred).await {
            Ok(r) => r,
            Err(first) => {
                // 刷新失败允许补偿一次，第二次失败即终止
                warn!("令牌刷新失败，补偿重试一次: remote={}, err={}", remote, first);
                self.transport.refresh_token(&cred).await?
            }
        };

        cred.access_token = response.access_token;
        if let Some(rotated) = response.refresh_token {
            cred.refresh_token = rotated;
        }
        cred.expiry = now + Duration::seconds(response.expires_in);

        info!(
            "令牌刷新成功: remote={}, expiry={}",
            remote,
            cred.expiry.to_rfc3339()
        );

        Ok(cred.clone())
    }
}
