// 上传会话状态
//
// 会话由服务端分配、以 URL 标识，在服务端的时间窗口内有效；
// 引擎不持久化会话，进程内失败后只能重新建会话

use serde::{Deserialize, Serialize};

/// 会话状态
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// 已创建，尚未传输
    Pending,
    /// 分片传输中
    Uploading,
    /// 末分片已发出，等待完成确认
    Finalizing,
    /// 上传完成
    Complete,
    /// 上传失败
    Failed,
}

/// 上传会话
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSession {
    /// 会话上传地址
    pub session_url: String,
    /// 文件总大小
    pub total_size: u64,
    /// 分片大小
    pub chunk_size: u64,
    /// 会话状态
    pub status: SessionStatus,
}

impl UploadSession {
    /// 创建新会话记录
    pub fn new(session_url: String, total_size: u64, chunk_size: u64) -> Self {
        Self {
            session_url,
            total_size,
            chunk_size,
            status: SessionStatus::Pending,
        }
    }

    pub fn mark_uploading(&mut self) {
        self.status = SessionStatus::Uploading;
    }

    pub fn mark_finalizing(&mut self) {
        self.status = SessionStatus::Finalizing;
    }

    pub fn mark_complete(&mut self) {
        self.status = SessionStatus::Complete;
    }

    pub fn mark_failed(&mut self) {
        self.status = SessionStatus::Failed;
    }
}
