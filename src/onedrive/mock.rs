// 脚本化传输实现（仅测试）
//
// 记录调用次数、调度顺序与在途分片数，按预设脚本注入失败，
// 用于验证重试策略、窗口约束与调用顺序

use crate::config::RemoteCredential;
use crate::error::DriveError;
use crate::onedrive::transport::DriveTransport;
use crate::onedrive::types::{
    ChunkAck, CreateSessionResponse, DriveQuota, ItemMetadata, TokenRefreshResponse,
};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// 网络调用事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallEvent {
    Refresh,
    CreateSession,
    Chunk(u64),
    Quota(String),
}

/// 分片失败脚本（按分片起始偏移注入）
#[derive(Debug, Clone)]
pub enum ChunkScript {
    /// 前 n 次尝试返回指定状态码
    FailTimes(u32, u16),
    /// 每次尝试都失败
    AlwaysFail(u16),
    /// 首次尝试返回 409 冲突
    ConflictOnce,
}

pub struct MockDriveTransport {
    // --- 刷新脚本 ---
    pub refresh_calls: AtomicUsize,
    pub refresh_fail_times: usize,
    pub refresh_delay_ms: u64,
    pub rotated_refresh_token: Option<String>,
    pub expires_in: i64,

    // --- 会话脚本 ---
    pub session_calls: AtomicUsize,
    pub fail_create_session: bool,
    /// 每次会话创建收到的远端路径
    pub session_paths: Mutex<Vec<String>>,

    // --- 分片脚本与观测 ---
    pub chunk_calls: AtomicUsize,
    pub chunk_delay_ms: u64,
    pub inflight: AtomicUsize,
    pub max_inflight: AtomicUsize,
    pub scripts: Mutex<HashMap<u64, ChunkScript>>,
    attempts: Mutex<HashMap<u64, u32>>,
    dispatched: Mutex<BTreeSet<u64>>,
    acked: Mutex<BTreeSet<u64>>,
    /// 每次调度时记录 (起始偏移, 此刻更低偏移且未确认的分片)
    pub dispatches: Mutex<Vec<(u64, Vec<u64>)>>,

    // --- 容量脚本 ---
    pub quota_fail_drives: Mutex<HashSet<String>>,

    /// 全部调用的时间顺序
    pub events: Mutex<Vec<CallEvent>>,
}

impl MockDriveTransport {
    pub fn new() -> Self {
        Self {
            refresh_calls: AtomicUsize::new(0),
            refresh_fail_times: 0,
            refresh_delay_ms: 0,
            rotated_refresh_token: None,
            expires_in: 3600,
            session_calls: AtomicUsize::new(0),
            fail_create_session: false,
            session_paths: Mutex::new(Vec::new()),
            chunk_calls: AtomicUsize::new(0),
            chunk_delay_ms: 0,
            inflight: AtomicUsize::new(0),
            max_inflight: AtomicUsize::new(0),
            scripts: Mutex::new(HashMap::new()),
            attempts: Mutex::new(HashMap::new()),
            dispatched: Mutex::new(BTreeSet::new()),
            acked: Mutex::new(BTreeSet::new()),
            dispatches: Mutex::new(Vec::new()),
            quota_fail_drives: Mutex::new(HashSet::new()),
            events: Mutex::new(Vec::new()),
        }
    }

    /// 为指定起始偏移的分片设置失败脚本
    pub fn script_chunk(&self, start: u64, script: ChunkScript) {
        self.scripts.lock().unwrap().insert(start, script);
    }

    /// 指定 drive_id 的容量查询失败
    pub fn fail_quota_for(&self, drive_id: &str) {
        self.quota_fail_drives
            .lock()
            .unwrap()
            .insert(drive_id.to_string());
    }

    /// 某分片的总尝试次数
    pub fn attempts_for(&self, start: u64) -> u32 {
        self.attempts.lock().unwrap().get(&start).copied().unwrap_or(0)
    }

    /// 某分片是否被调度过
    pub fn dispatched(&self, start: u64) -> bool {
        self.dispatched.lock().unwrap().contains(&start)
    }

    pub fn events(&self) -> Vec<CallEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl Default for MockDriveTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DriveTransport for MockDriveTransport {
    async fn refresh_token(
        &self,
        _cred: &RemoteCredential,
    ) -> Result<TokenRefreshResponse, DriveError> {
        let n = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.events.lock().unwrap().push(CallEvent::Refresh);

        if self.refresh_delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.refresh_delay_ms)).await;
        }

        if n <= self.refresh_fail_times {
            return Err(DriveError::Token {
                cause: "injected refresh failure".into(),
            });
        }

        Ok(TokenRefreshResponse {
            access_token: format!("at-new-{}", n),
            refresh_token: self.rotated_refresh_token.clone(),
            expires_in: self.expires_in,
        })
    }

    async fn create_upload_session(
        &self,
        _access_token: &str,
        _drive_id: &str,
        remote_path: &str,
    ) -> Result<CreateSessionResponse, DriveError> {
        self.session_calls.fetch_add(1, Ordering::SeqCst);
        self.events.lock().unwrap().push(CallEvent::CreateSession);
        self.session_paths
            .lock()
            .unwrap()
            .push(remote_path.to_string());

        if self.fail_create_session {
            return Err(DriveError::session(Some(500), "injected session failure"));
        }

        Ok(CreateSessionResponse {
            upload_url: "https://mock.invalid/session/1".into(),
            expiration: None,
        })
    }

    async fn upload_chunk(
        &self,
        _session_url: &str,
        _access_token: &str,
        start: u64,
        end: u64,
        total_size: u64,
        _data: Vec<u8>,
    ) -> Result<ChunkAck, DriveError> {
        self.chunk_calls.fetch_add(1, Ordering::SeqCst);
        self.events.lock().unwrap().push(CallEvent::Chunk(start));

        let attempt_no = {
            let mut attempts = self.attempts.lock().unwrap();
            let counter = attempts.entry(start).or_insert(0);
            *counter += 1;
            *counter
        };

        // 调度快照：更低偏移且尚未确认的分片
        {
            let mut dispatched = self.dispatched.lock().unwrap();
            let acked = self.acked.lock().unwrap();
            let unacked_lower: Vec<u64> = dispatched
                .iter()
                .copied()
                .filter(|&s| s < start && !acked.contains(&s))
                .collect();
            dispatched.insert(start);
            self.dispatches.lock().unwrap().push((start, unacked_lower));
        }

        let cur = self.inflight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_inflight.fetch_max(cur, Ordering::SeqCst);

        if self.chunk_delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.chunk_delay_ms)).await;
        }

        let failure = {
            let scripts = self.scripts.lock().unwrap();
            match scripts.get(&start) {
                Some(ChunkScript::FailTimes(n, code)) if attempt_no <= *n => Some(*code),
                Some(ChunkScript::AlwaysFail(code)) => Some(*code),
                Some(ChunkScript::ConflictOnce) if attempt_no == 1 => Some(409),
                _ => None,
            }
        };

        self.inflight.fetch_sub(1, Ordering::SeqCst);

        if let Some(code) = failure {
            return Err(DriveError::session(Some(code), "injected chunk failure"));
        }

        self.acked.lock().unwrap().insert(start);

        if end == total_size {
            Ok(ChunkAck::Completed(ItemMetadata {
                id: "item-1".into(),
                size: total_size,
                web_url: Some("https://mock.invalid/item-1".into()),
            }))
        } else {
            Ok(ChunkAck::Accepted)
        }
    }

    async fn drive_quota(
        &self,
        _access_token: &str,
        drive_id: &str,
    ) -> Result<DriveQuota, DriveError> {
        self.events
            .lock()
            .unwrap()
            .push(CallEvent::Quota(drive_id.to_string()));

        if self.quota_fail_drives.lock().unwrap().contains(drive_id) {
            return Err(DriveError::Quota("injected quota failure".into()));
        }

        Ok(DriveQuota {
            total: 5 * 1024 * 1024 * 1024 * 1024,
            used: 2 * 1024 * 1024 * 1024 * 1024,
            remaining: 3 * 1024 * 1024 * 1024 * 1024,
            deleted: 1024 * 1024 * 1024,
        })
    }
}
