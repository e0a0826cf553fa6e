// 上传分片规划
//
// 分片范围精确划分 [0, total_size)：严格升序、互不重叠、首尾相接。
// 末分片长度为 total_size mod chunk_size（整除时为 chunk_size）。

/// 最小分片大小: 2MB
pub const MIN_CHUNK_SIZE: u64 = 2 * 1024 * 1024;

/// 最大分片大小: 32MB
pub const MAX_CHUNK_SIZE: u64 = 32 * 1024 * 1024;

/// 单文件大小上限: 5GB
pub const MAX_FILE_SIZE: u64 = 5 * 1024 * 1024 * 1024;

/// 最大并发分片数
pub const MAX_PARALLEL_CHUNKS: usize = 4;

/// 上传分片范围
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRange {
    /// 分片索引
    pub index: usize,
    /// 起始偏移（含）
    pub start: u64,
    /// 结束偏移（不含）
    pub end: u64,
    /// 已尝试次数
    pub attempts: u32,
}

impl ChunkRange {
    pub fn new(index: usize, start: u64, end: u64) -> Self {
        Self {
            index,
            start,
            end,
            attempts: 0,
        }
    }

    /// 分片长度
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// 计算分片序列
///
/// # 参数
/// * `total_size` - 文件总大小
/// * `chunk_size` - 分片大小
///
/// # 返回
/// 升序、连续、互不重叠的分片范围
pub fn plan_chunks(total_size: u64, chunk_size: u64) -> Vec<ChunkRange> {
    let mut chunks = Vec::new();
    let mut offset = 0u64;
    let mut index = 0;

    while offset < total_size {
        let end = std::cmp::min(offset + chunk_size, total_size);
        chunks.push(ChunkRange::new(index, offset, end));
        offset = end;
        index += 1;
    }

    chunks
}
