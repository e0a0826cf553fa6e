// OneDrive (Graph API) 接入模块

pub mod client;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod mock;

pub use client::{GraphClient, GRAPH_API_BASE, OAUTH_TOKEN_URL};
pub use transport::DriveTransport;
pub use types::{
    ChunkAck, CreateSessionResponse, DriveQuota, ItemMetadata, TokenRefreshResponse,
};
