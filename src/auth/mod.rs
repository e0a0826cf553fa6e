// 认证模块

pub mod token;

pub use token::{TokenManager, DEFAULT_REFRESH_MARGIN_SECS};
