//! 日志系统配置
//!
//! 控制台输出；级别可通过 RUST_LOG 环境变量覆盖。
//! 日志文件持久化由嵌入方的运行环境负责。

use anyhow::{anyhow, Result};
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::EnvFilter;

/// 初始化日志
///
/// # 参数
/// * `default_level` - 未设置 RUST_LOG 时的默认级别（如 "info"）
pub fn init_logging(default_level: &str) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S%.3f".to_string()))
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow!("初始化日志失败: {}", e))?;

    Ok(())
}
