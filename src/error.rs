// 统一错误类型
//
// 错误分类与传播规则：
// - Config / Validation：立即终止，永不重试
// - Token：刷新失败后最多再补偿一次，仍失败即终止
// - Session：分片传输失败按固定间隔重试，超出次数后整个上传终止
// - Quota：单远端查询失败，聚合查询时跳过该远端
// - Internal：边界处的意外故障（输入流读取失败、协议异常等）
// - Cancelled：调用方主动取消

use thiserror::Error;

/// HTTP 409 Conflict（服务端拒绝乱序分片）
pub const STATUS_CONFLICT: u16 = 409;

#[derive(Debug, Clone, Error)]
pub enum DriveError {
    /// 凭据配置缺失或格式错误
    #[error("配置错误: {0}")]
    Config(String),

    /// 调用方输入不满足大小/分片/路径约束
    #[error("参数校验失败: {0}")]
    Validation(String),

    /// OAuth2 刷新令牌交换失败
    #[error("令牌刷新失败: {cause}")]
    Token { cause: String },

    /// 会话创建或分片传输失败
    ///
    /// `status` 为 None 时表示请求未到达服务端（连接/超时等传输层故障）
    #[error("上传会话错误: status={status:?}, chunk={chunk_index:?}, acked={acked_bytes}: {body}")]
    Session {
        status: Option<u16>,
        body: String,
        chunk_index: Option<usize>,
        acked_bytes: u64,
    },

    /// 容量查询失败
    #[error("容量查询失败: {0}")]
    Quota(String),

    /// 意外的运行时故障
    #[error("内部错误: {0}")]
    Internal(String),

    /// 操作已被取消
    #[error("操作已取消")]
    Cancelled,
}

impl DriveError {
    /// 构造不带分片上下文的会话错误（传输层使用）
    pub fn session(status: Option<u16>, body: impl Into<String>) -> Self {
        DriveError::Session {
            status,
            body: body.into(),
            chunk_index: None,
            acked_bytes: 0,
        }
    }

    /// 补充分片上下文（引擎在终止前填入分片序号与已确认偏移）
    pub fn with_chunk(self, index: usize, acked: u64) -> Self {
        match self {
            DriveError::Session { status, body, .. } => DriveError::Session {
                status,
                body,
                chunk_index: Some(index),
                acked_bytes: acked,
            },
            other => other,
        }
    }

    /// 是否为服务端乱序分片冲突（触发顺序回退）
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            DriveError::Session {
                status: Some(STATUS_CONFLICT),
                ..
            }
        )
    }
}
