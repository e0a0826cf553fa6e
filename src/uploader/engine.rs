// 上传引擎
//
// 核心流程：
// 1. 入参校验（任何网络调用之前）
// 2. 创建上传会话（同名冲突：替换）
// 3. 分片规划并按传输策略推进：
//    - 顺序模式：严格升序逐片传输，失败按固定间隔重试
//    - 流水线模式：以对齐窗口并发传输，至多 parallel_chunks 个分片在途，
//      前一窗口全部确认后才进入下一窗口；服务端返回 409 冲突时，
//      冲突分片及其后所有分片回退为顺序传输
// 4. 末分片返回 200/201 时得到文件元数据
//
// 输入流只按序读取一次，不做 seek，内容可以来自非可定位的流式来源；
// 本组件不触碰本地文件系统，落盘暂存由调用方负责

use crate::error::DriveError;
use crate::onedrive::{ChunkAck, DriveTransport, ItemMetadata};
use crate::uploader::chunk::{
    plan_chunks, ChunkRange, MAX_CHUNK_SIZE, MAX_FILE_SIZE, MAX_PARALLEL_CHUNKS, MIN_CHUNK_SIZE,
};
use crate::uploader::session::UploadSession;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// 上传参数
#[derive(Debug, Clone)]
pub struct UploadParams {
    /// 完整远端路径（含文件名）
    pub remote_path: String,
    /// 文件总大小（字节）
    pub total_size: u64,
    /// 分片大小（字节）
    pub chunk_size: u64,
    /// 并发分片数
    pub parallel_chunks: usize,
    /// 单分片最大重试次数
    pub max_retries: u32,
    /// 重试固定间隔
    pub retry_delay: Duration,
    /// 服务端是否允许乱序分片确认（站点能力标记）
    pub concurrent_fragments: bool,
}

impl UploadParams {
    /// 入参校验
    ///
    /// 违反约束立即返回 Validation 错误，不发起任何网络调用
    pub fn validate(&self) -> Result<(), DriveError> {
        if self.total_size == 0 {
            return Err(DriveError::Validation("文件大小必须大于 0".into()));
        }
        if self.total_size > MAX_FILE_SIZE {
            return Err(DriveError::Validation(format!(
                "文件大小 {} 超过上限 {} 字节",
                self.total_size, MAX_FILE_SIZE
            )));
        }
        if !(MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&self.chunk_size) {
            return Err(DriveError::Validation(format!(
                "分片大小 {} 超出允许范围 [{}, {}]",
                self.chunk_size, MIN_CHUNK_SIZE, MAX_CHUNK_SIZE
            )));
        }
        if !(1..=MAX_PARALLEL_CHUNKS).contains(&self.parallel_chunks) {
            return Err(DriveError::Validation(format!(
                "并发分片数 {} 超出允许范围 [1, {}]",
                self.parallel_chunks, MAX_PARALLEL_CHUNKS
            )));
        }
        let file_name = self.remote_path.rsplit('/').next().unwrap_or("");
        if file_name.is_empty() {
            return Err(DriveError::Validation("远端路径缺少文件名".into()));
        }
        Ok(())
    }

    /// 实际生效的并发窗口
    ///
    /// 站点未确认容忍乱序分片时，窗口退化为 1（按序提交是协议不变量）
    fn effective_parallelism(&self) -> usize {
        if self.concurrent_fragments {
            self.parallel_chunks
        } else {
            1
        }
    }
}

/// 上传引擎
///
/// 每次上传调用独立运行，分片状态都是调用本地的；
/// 不同上传之间只共享出站传输（连接池）
pub struct UploadEngine {
    /// 出站传输
    transport: Arc<dyn DriveTransport>,
    /// 取消令牌
    cancel_token: CancellationToken,
}

impl UploadEngine {
    pub fn new(transport: Arc<dyn DriveTransport>, cancel_token: CancellationToken) -> Self {
        Self {
            transport,
            cancel_token,
        }
    }

    /// 执行完整上传
    ///
    /// # 参数
    /// * `reader` - 输入字节流（只按序读取一次）
    /// * `access_token` - 有效的访问令牌
    /// * `drive_id` - 目标驱动器
    /// * `params` - 上传参数
    ///
    /// # 返回
    /// 上传完成后的文件元数据
    pub async fn upload<R>(
        &self,
        mut reader: R,
        access_token: &str,
        drive_id: &str,
        params: &UploadParams,
    ) -> Result<ItemMetadata, DriveError>
    where
        R: AsyncRead + Unpin + Send,
    {
        params.validate()?;
        self.check_cancelled()?;

        let chunks = plan_chunks(params.total_size, params.chunk_size);
        info!(
            "开始上传: path={}, size={}, 分片数={}, 窗口={}",
            params.remote_path,
            params.total_size,
            chunks.len(),
            params.effective_parallelism()
        );

        let created = self
            .with_cancel(self.transport.create_upload_session(
                access_token,
                drive_id,
                &params.remote_path,
            ))
            .await?;

        let mut session =
            UploadSession::new(created.upload_url, params.total_size, params.chunk_size);
        session.mark_uploading();

        let result = self
            .run_transport(&mut reader, access_token, &mut session, chunks, params)
            .await;

        match &result {
            Ok(item) => {
                session.mark_complete();
                info!(
                    "上传完成: path={}, id={}, size={}",
                    params.remote_path, item.id, item.size
                );
            }
            Err(e) => {
                // 残留的远端会话交由服务端超时回收，重新尝试需建新会话
                session.mark_failed();
                warn!("上传失败: path={}, err={}", params.remote_path, e);
            }
        }

        result
    }

    /// 驱动分片传输
    ///
    /// 统一以窗口推进：顺序模式即窗口为 1 的特例。
    /// 每个窗口先按序读取输入流，再并发发出，随后按升序整理结果：
    /// 未确认的分片按序补传（带重试），连续确认前缀决定已确认偏移。
    async fn run_transport<R>(
        &self,
        reader: &mut R,
        access_token: &str,
        session: &mut UploadSession,
        mut chunks: Vec<ChunkRange>,
        params: &UploadParams,
    ) -> Result<ItemMetadata, DriveError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let session_url = session.session_url.clone();
        let total = params.total_size;
        let chunk_count = chunks.len();
        let mut parallelism = params.effective_parallelism();
        if params.parallel_chunks > 1 && parallelism == 1 {
            info!("远端未确认容忍乱序分片，窗口退化为顺序传输");
        }

        let mut acked_bytes = 0u64;
        let mut last_item: Option<ItemMetadata> = None;
        let mut idx = 0;

        while idx < chunk_count {
            self.check_cancelled()?;

            let window_len = parallelism.min(chunk_count - idx);
            if idx + window_len == chunk_count {
                session.mark_finalizing();
            }

            // 按序读取窗口内各分片数据，缓冲保留到确认为止（重试复用）
            let mut buffers = Vec::with_capacity(window_len);
            for chunk in &chunks[idx..idx + window_len] {
                buffers.push(self.read_chunk(reader, chunk).await?);
            }

            // 并发发出窗口内全部分片（每片单次尝试）
            let mut dispatch = Vec::with_capacity(window_len);
            for off in 0..window_len {
                let chunk = &mut chunks[idx + off];
                chunk.attempts += 1;
                let transport = Arc::clone(&self.transport);
                let url = session_url.clone();
                let token = access_token.to_string();
                let data = buffers[off].clone();
                let (start, end) = (chunk.start, chunk.end);
                dispatch.push(async move {
                    transport
                        .upload_chunk(&url, &token, start, end, total, data)
                        .await
                });
            }

            let results = tokio::select! {
                _ = self.cancel_token.cancelled() => return Err(DriveError::Cancelled),
                r = join_all(dispatch) => r,
            };

            // 升序整理窗口结果
            let mut confirmed = vec![false; window_len];
            let mut window_errors: Vec<Option<DriveError>> = Vec::with_capacity(window_len);
            for (off, result) in results.into_iter().enumerate() {
                match result {
                    Ok(ChunkAck::Accepted) => {
                        confirmed[off] = true;
                        window_errors.push(None);
                    }
                    Ok(ChunkAck::Completed(item)) => {
                        confirmed[off] = true;
                        last_item = Some(item);
                        window_errors.push(None);
                    }
                    Err(e) => window_errors.push(Some(e)),
                }
            }

            // 首个失败分片决定是否回退
            if let Some(off) = window_errors.iter().position(|e| e.is_some()) {
                let conflict = window_errors[off]
                    .as_ref()
                    .map(|e| e.is_conflict())
                    .unwrap_or(false);
                if conflict {
                    // 服务端拒绝乱序分片：冲突分片及其后所有分片改为顺序传输
                    warn!(
                        "分片 #{} 触发乱序冲突，自此回退为顺序传输",
                        chunks[idx + off].index
                    );
                    parallelism = 1;
                    for flag in confirmed.iter_mut().skip(off) {
                        *flag = false;
                    }
                } else {
                    warn!(
                        "分片 #{} 窗口内传输失败，按序补传",
                        chunks[idx + off].index
                    );
                }
            }

            // 按升序补传未确认分片并推进已确认偏移
            for off in 0..window_len {
                let chunk_index = chunks[idx + off].index;
                if !confirmed[off] {
                    let prior_failure = window_errors[off].take();
                    let chunk = &mut chunks[idx + off];
                    let ack = self
                        .put_chunk_retrying(
                            &session_url,
                            access_token,
                            chunk,
                            &buffers[off],
                            total,
                            params,
                            acked_bytes,
                            prior_failure,
                        )
                        .await?;
                    if let ChunkAck::Completed(item) = ack {
                        last_item = Some(item);
                    }
                }
                acked_bytes = chunks[idx + off].end;
                info!(
                    "分片 #{}/{} 已确认: 进度 {:.2}% ({}/{} bytes)",
                    chunk_index + 1,
                    chunk_count,
                    acked_bytes as f64 / total as f64 * 100.0,
                    acked_bytes,
                    total
                );
            }

            idx += window_len;

            if last_item.is_some() && idx < chunk_count {
                return Err(DriveError::Internal("中间分片意外返回完成响应".into()));
            }
        }

        last_item.ok_or_else(|| DriveError::Internal("末分片未返回文件元数据".into()))
    }

    /// 单分片传输（带固定间隔重试）
    ///
    /// 窗口内已失败过的分片带入 prior_failure，其尝试次数计入重试预算；
    /// 重试次数超出 max_retries 后终止，错误中带上分片序号与已确认偏移
    #[allow(clippy::too_many_arguments)]
    async fn put_chunk_retrying(
        &self,
        session_url: &str,
        access_token: &str,
        chunk: &mut ChunkRange,
        data: &[u8],
        total: u64,
        params: &UploadParams,
        acked_bytes: u64,
        prior_failure: Option<DriveError>,
    ) -> Result<ChunkAck, DriveError> {
        if let Some(e) = prior_failure {
            if chunk.attempts > params.max_retries {
                return Err(e.with_chunk(chunk.index, acked_bytes));
            }
            warn!(
                "分片 #{} 第 {} 次尝试失败，{}ms 后重试: {}",
                chunk.index,
                chunk.attempts,
                params.retry_delay.as_millis(),
                e
            );
            self.sleep_cancellable(params.retry_delay).await?;
        }

        loop {
            self.check_cancelled()?;
            chunk.attempts += 1;

            let attempt = self
                .with_cancel(self.transport.upload_chunk(
                    session_url,
                    access_token,
                    chunk.start,
                    chunk.end,
                    total,
                    data.to_vec(),
                ))
                .await;

            match attempt {
                Ok(ack) => return Ok(ack),
                Err(DriveError::Cancelled) => return Err(DriveError::Cancelled),
                Err(e) => {
                    if chunk.attempts > params.max_retries {
                        return Err(e.with_chunk(chunk.index, acked_bytes));
                    }
                    warn!(
                        "分片 #{} 第 {} 次尝试失败，{}ms 后重试: {}",
                        chunk.index,
                        chunk.attempts,
                        params.retry_delay.as_millis(),
                        e
                    );
                    self.sleep_cancellable(params.retry_delay).await?;
                }
            }
        }
    }

    /// 从输入流按序读取一个分片
    async fn read_chunk<R>(&self, reader: &mut R, chunk: &ChunkRange) -> Result<Vec<u8>, DriveError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut buffer = vec![0u8; chunk.len() as usize];
        reader.read_exact(&mut buffer).await.map_err(|e| {
            DriveError::Internal(format!("读取输入流失败 (分片 #{}): {}", chunk.index, e))
        })?;
        Ok(buffer)
    }

    fn check_cancelled(&self) -> Result<(), DriveError> {
        if self.cancel_token.is_cancelled() {
            Err(DriveError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// 包裹网络调用，取消时立即中止在途请求
    async fn with_cancel<T, F>(&self, fut: F) -> Result<T, DriveError>
    where
        F: std::future::Future<Output = Result<T, DriveError>>,
    {
        tokio::select! {
            _ = self.cancel_token.cancelled() => Err(DriveError::Cancelled),
            result = fut => result,
        }
    }

    async fn sleep_cancellable(&self, duration: Duration) -> Result<(), DriveError> {
        tokio::select! {
            _ = self.cancel_token.cancelled() => Err(DriveError::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}
