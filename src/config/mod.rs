// 凭据配置模块
//
// 解析 rclone 风格的凭据存储：
// - `[name]` 节标记，`key = value` 行，`#` / `;` 注释
// - `token` 键内嵌 JSON（access_token / refresh_token / expiry）
// - 值可整体经过可逆混淆，由 obscure 模块的编解码策略还原

pub mod obscure;

use crate::error::DriveError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub use obscure::{ObscureV1, PlainCodec, ValueCodec};

/// 配置未指定 drive_type 时的默认值
const DEFAULT_DRIVE_TYPE: &str = "personal";

/// 远端站点信息
///
/// 远端名称到上传根目录与索引站点的映射按部署注入，
/// 不再编译进代码，便于按环境差异化与隔离测试
#[derive(Debug, Clone)]
pub struct RemoteSite {
    /// 下载索引站点基础 URL
    pub base_url: String,
    /// 上传根目录（可被配置节中的 root_folder 覆盖）
    pub root_folder: String,
    /// 服务端是否允许乱序分片确认
    ///
    /// 默认 false：分片必须按升序逐个被确认，并行窗口退化为 1
    pub concurrent_fragments: bool,
}

impl RemoteSite {
    pub fn new(base_url: impl Into<String>, root_folder: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            root_folder: root_folder.into(),
            concurrent_fragments: false,
        }
    }

    /// 声明该远端容忍乱序分片（确认服务端支持后才可开启）
    pub fn with_concurrent_fragments(mut self) -> Self {
        self.concurrent_fragments = true;
        self
    }
}

/// 远端名称 -> 站点信息
pub type RemoteSiteTable = HashMap<String, RemoteSite>;

/// 单个远端的配置节
///
/// 未知键原样保留，不参与校验
#[derive(Debug, Clone)]
pub struct RemoteSection {
    /// 节名（即远端名称）
    pub name: String,
    /// 节内全部键值
    pub values: HashMap<String, String>,
}

impl RemoteSection {
    /// 读取可选键
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|v| v.as_str())
    }

    /// 读取必需键，缺失或为空时报配置错误
    fn required(&self, key: &str) -> Result<&str, DriveError> {
        match self.get(key) {
            Some(v) if !v.is_empty() => Ok(v),
            _ => Err(DriveError::Config(format!(
                "远端 [{}] 缺少必需键: {}",
                self.name, key
            ))),
        }
    }
}

/// 远端凭据
///
/// 由配置节与站点表组装；access_token / refresh_token / expiry
/// 仅在 TokenManager 的缓存互斥锁内被更新
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteCredential {
    /// 远端名称
    pub name: String,
    /// OAuth2 应用 ID
    pub client_id: String,
    /// OAuth2 应用密钥
    pub client_secret: String,
    /// 长期刷新令牌
    pub refresh_token: String,
    /// 短期访问令牌（可能为空，待刷新）
    pub access_token: String,
    /// 访问令牌过期时间
    pub expiry: DateTime<Utc>,
    /// 目标驱动器 ID
    pub drive_id: String,
    /// 驱动器类型（personal / business / documentLibrary）
    pub drive_type: String,
    /// 下载索引站点基础 URL
    pub base_url: String,
    /// 上传根目录
    pub root_folder: String,
}

/// `token` 键内嵌的 JSON 结构
#[derive(Debug, Deserialize)]
struct TokenBlob {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    refresh_token: String,
    expiry: String,
}

/// 凭据存储
///
/// 节顺序与文件一致
#[derive(Debug, Clone, Default)]
pub struct RcloneConfigStore {
    sections: Vec<RemoteSection>,
}

impl RcloneConfigStore {
    /// 解析明文凭据存储
    pub fn parse(raw: &[u8]) -> Result<Self, DriveError> {
        Self::parse_with(raw, &PlainCodec)
    }

    /// 解析凭据存储，值经 codec 还原为明文
    ///
    /// # 参数
    /// * `raw` - 存储原始字节
    /// * `codec` - 值解码策略（明文存储用 PlainCodec）
    pub fn parse_with(raw: &[u8], codec: &dyn ValueCodec) -> Result<Self, DriveError> {
        let text = std::str::from_utf8(raw)
            .map_err(|e| DriveError::Config(format!("凭据存储不是合法 UTF-8: {}", e)))?;

        let mut sections: Vec<RemoteSection> = Vec::new();

        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if line.starts_with('[') && line.ends_with(']') {
                let name = line.trim_matches(|c| c == '[' || c == ']').trim();
                if name.is_empty() {
                    return Err(DriveError::Config(format!(
                        "第 {} 行: 节名称为空",
                        lineno + 1
                    )));
                }
                sections.push(RemoteSection {
                    name: name.to_string(),
                    values: HashMap::new(),
                });
                continue;
            }

            let (key, value) = line.split_once('=').ok_or_else(|| {
                DriveError::Config(format!("第 {} 行: 无法解析的配置行: {}", lineno + 1, line))
            })?;

            let section = sections.last_mut().ok_or_else(|| {
                DriveError::Config(format!("第 {} 行: 键值对出现在任何节之前", lineno + 1))
            })?;

            let plain = codec.decode(value.trim())?;
            section.values.insert(key.trim().to_string(), plain);
        }

        Ok(Self { sections })
    }

    /// 按文件顺序列出全部远端名称
    pub fn list_remotes(&self) -> Vec<String> {
        self.sections.iter().map(|s| s.name.clone()).collect()
    }

    /// 查找配置节
    pub fn section(&self, name: &str) -> Option<&RemoteSection> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// 组装远端凭据
    ///
    /// # 参数
    /// * `name` - 远端名称
    /// * `site` - 该远端的站点信息（根目录可被配置中的 root_folder 覆盖）
    pub fn credential(&self, name: &str, site: &RemoteSite) -> Result<RemoteCredential, DriveError> {
        let section = self
            .section(name)
            .ok_or_else(|| DriveError::Config(format!("远端 [{}] 不存在", name)))?;

        let token_raw = section.required("token")?;
        let token: TokenBlob = serde_json::from_str(token_raw).map_err(|e| {
            DriveError::Config(format!("远端 [{}] token 字段格式错误: {}", name, e))
        })?;
        if token.refresh_token.is_empty() {
            return Err(DriveError::Config(format!(
                "远端 [{}] token 缺少 refresh_token",
                name
            )));
        }
        let expiry = DateTime::parse_from_rfc3339(&token.expiry)
            .map_err(|e| {
                DriveError::Config(format!("远端 [{}] token.expiry 时间格式错误: {}", name, e))
            })?
            .with_timezone(&Utc);

        let root_folder = section
            .get("root_folder")
            .map(|v| v.to_string())
            .unwrap_or_else(|| site.root_folder.clone());

        Ok(RemoteCredential {
            name: name.to_string(),
            client_id: section.required("client_id")?.to_string(),
            client_secret: section.required("client_secret")?.to_string(),
            refresh_token: token.refresh_token,
            access_token: token.access_token,
            expiry,
            drive_id: section.required("drive_id")?.to_string(),
            drive_type: section
                .get("drive_type")
                .unwrap_or(DEFAULT_DRIVE_TYPE)
                .to_string(),
            base_url: site.base_url.clone(),
            root_folder,
        })
    }
}
