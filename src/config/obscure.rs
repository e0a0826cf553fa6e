// 凭据值混淆编解码
//
// 凭据存储中的值可整体经过一层可逆的确定性混淆。解码策略做成可插拔
// 的 trait，测试直接使用明文夹具，无需重新实现变换。版本化：ObscureV1
// 对应 URL-safe 无填充 Base64，后续格式升级时新增 V2 实现即可。

use crate::error::DriveError;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;

/// 值解码策略
pub trait ValueCodec: Send + Sync {
    /// 将存储形态的值还原为明文
    fn decode(&self, raw: &str) -> Result<String, DriveError>;
}

/// 明文直通（未混淆的存储）
#[derive(Debug, Default)]
pub struct PlainCodec;

impl ValueCodec for PlainCodec {
    fn decode(&self, raw: &str) -> Result<String, DriveError> {
        Ok(raw.to_string())
    }
}

/// v1 混淆格式：URL-safe 无填充 Base64
#[derive(Debug, Default)]
pub struct ObscureV1;

impl ValueCodec for ObscureV1 {
    fn decode(&self, raw: &str) -> Result<String, DriveError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(raw.trim())
            .map_err(|e| DriveError::Config(format!("混淆值解码失败: {}", e)))?;
        String::from_utf8(bytes)
            .map_err(|e| DriveError::Config(format!("混淆值不是合法 UTF-8: {}", e)))
    }
}

impl ObscureV1 {
    /// 编码侧（仅测试与工具使用；运行时只做解码）
    pub fn encode(plain: &str) -> String {
        URL_SAFE_NO_PAD.encode(plain.as_bytes())
    }
}
