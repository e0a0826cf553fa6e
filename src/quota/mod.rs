// 容量查询模块

use crate::auth::TokenManager;
use crate::error::DriveError;
use crate::onedrive::{DriveQuota, DriveTransport};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// 容量报告器
pub struct QuotaReporter {
    /// 令牌管理器
    tokens: Arc<TokenManager>,
    /// 出站传输
    transport: Arc<dyn DriveTransport>,
}

impl QuotaReporter {
    pub fn new(tokens: Arc<TokenManager>, transport: Arc<dyn DriveTransport>) -> Self {
        Self { tokens, transport }
    }

    /// 查询单个远端的驱动器容量
    ///
    /// 令牌或传输层失败统一归为容量查询错误
    pub async fn get_quota(
        &self,
        remote: &str,
        now: DateTime<Utc>,
    ) -> Result<DriveQuota, DriveError> {
        let cred = self
            .tokens
            .ensure_valid(remote, now)
            .await
            .map_err(|e| DriveError::Quota(format!("remote={}: {}", remote, e)))?;

        self.transport
            .drive_quota(&cred.access_token, &cred.drive_id)
            .await
    }

    /// 聚合查询全部已配置远端的容量
    ///
    /// 单个远端失败只记录日志并跳过，不影响其余远端的结果
    pub async fn get_all_quotas(&self, now: DateTime<Utc>) -> HashMap<String, DriveQuota> {
        let mut result = HashMap::new();

        for remote in self.tokens.store().list_remotes() {
            match self.get_quota(&remote, now).await {
                Ok(quota) => {
                    result.insert(remote, quota);
                }
                Err(e) => {
                    warn!("查询远端容量失败，跳过: remote={}, err={}", remote, e);
                }
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RcloneConfigStore, RemoteSite, RemoteSiteTable};
    use crate::onedrive::mock::MockDriveTransport;
    use chrono::Duration;

    fn store_with_remotes(names: &[&str], expiry: &str) -> Arc<RcloneConfigStore> {
        let mut raw = String::new();
        for name in names {
            raw.push_str(&format!(
                "[{name}]\nclient_id = cid\nclient_secret = sec\ntoken = {{\"access_token\":\"at\",\"refresh_token\":\"rt\",\"expiry\":\"{expiry}\"}}\ndrive_id = drv-{name}\n\n"
            ));
        }
        Arc::new(RcloneConfigStore::parse(raw.as_bytes()).unwrap())
    }

    fn sites_for(names: &[&str]) -> RemoteSiteTable {
        names
            .iter()
            .map(|n| {
                (
                    n.to_string(),
                    RemoteSite::new("https://index.example.org", "Public"),
                )
            })
            .collect()
    }

    fn reporter(
        names: &[&str],
        expiry: &str,
        transport: Arc<MockDriveTransport>,
    ) -> QuotaReporter {
        let tokens = Arc::new(TokenManager::new(
            store_with_remotes(names, expiry),
            sites_for(names),
            transport.clone(),
        ));
        QuotaReporter::new(tokens, transport)
    }

    #[tokio::test]
    async fn test_single_remote_quota() {
        let now = Utc::now();
        let expiry = (now + Duration::hours(1)).to_rfc3339();
        let transport = Arc::new(MockDriveTransport::new());
        let reporter = reporter(&["a"], &expiry, transport);

        let quota = reporter.get_quota("a", now).await.unwrap();
        assert!(quota.total > 0);
        assert_eq!(quota.total, quota.used + quota.remaining);
    }

    #[tokio::test]
    async fn test_quota_failure_maps_to_quota_error() {
        let now = Utc::now();
        let expiry = (now + Duration::hours(1)).to_rfc3339();
        let transport = Arc::new(MockDriveTransport::new());
        transport.fail_quota_for("drv-a");
        let reporter = reporter(&["a"], &expiry, transport);

        let err = reporter.get_quota("a", now).await.unwrap_err();
        assert!(matches!(err, DriveError::Quota(_)));
    }

    #[tokio::test]
    async fn test_aggregate_skips_failing_remote() {
        let now = Utc::now();
        let expiry = (now + Duration::hours(1)).to_rfc3339();
        let transport = Arc::new(MockDriveTransport::new());
        // B 的容量查询失败，A / C 正常返回
        transport.fail_quota_for("drv-b");
        let reporter = reporter(&["a", "b", "c"], &expiry, transport);

        let quotas = reporter.get_all_quotas(now).await;
        assert_eq!(quotas.len(), 2);
        assert!(quotas.contains_key("a"));
        assert!(quotas.contains_key("c"));
        assert!(!quotas.contains_key("b"));
    }
}
