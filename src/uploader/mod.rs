// 上传引擎模块

pub mod chunk;
pub mod engine;
pub mod session;

pub use chunk::{
    plan_chunks, ChunkRange, MAX_CHUNK_SIZE, MAX_FILE_SIZE, MAX_PARALLEL_CHUNKS, MIN_CHUNK_SIZE,
};
pub use engine::{UploadEngine, UploadParams};
pub use session::{SessionStatus, UploadSession};
