//! 统一配置中心
//!
//! 提供应用的全局配置管理，包括：
//! - 聊天同步（打字空闲超时、广播通道容量、社区历史拉取条数）
//! - 媒体附件（存储桶、大小上限、存储基础URL）
//!
//! 加载顺序：内置默认值 <- 可选的 YAML 配置文件 <- `APP_` 前缀环境变量。

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};

/// 全局应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// 聊天同步配置
    pub chat: ChatConfig,
    /// 媒体附件配置
    pub media: MediaConfig,
}

/// 聊天同步配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// 打字指示器空闲超时（毫秒）：最后一次按键之后这么久广播 typing=false
    pub typing_idle_ms: u64,
    /// 广播通道容量
    pub broadcast_capacity: usize,
    /// 打开社区聊天时拉取的最近消息条数
    pub community_history_limit: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            typing_idle_ms: 2000,
            broadcast_capacity: 256,
            community_history_limit: 100,
        }
    }
}

/// 媒体附件配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// 聊天附件存储桶
    pub bucket: String,
    /// 聊天附件大小上限（字节）
    pub attachment_max_bytes: u64,
    /// 纯图片资源（缩略图等）大小上限（字节）
    pub image_max_bytes: u64,
    /// 对象存储公开URL前缀
    pub storage_base_url: String,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            bucket: "chat-media".to_owned(),
            attachment_max_bytes: 50 * 1024 * 1024,
            image_max_bytes: 5 * 1024 * 1024,
            storage_base_url: "https://storage.local".to_owned(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            chat: ChatConfig::default(),
            media: MediaConfig::default(),
        }
    }
}

impl AppConfig {
    /// 加载配置：默认值，再叠加可选的 YAML 文件和 `APP_` 环境变量
    pub fn load(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

        if let Some(path) = config_path {
            figment = figment.merge(Yaml::file(path));
        }

        let config: AppConfig = figment
            .merge(Env::prefixed("APP_").split("__"))
            .extract()
            .map_err(|e| ConfigError::Load(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chat.typing_idle_ms == 0 {
            return Err(ConfigError::InvalidChatConfig(
                "typing_idle_ms must be greater than 0".to_owned(),
            ));
        }

        if self.chat.broadcast_capacity == 0 {
            return Err(ConfigError::InvalidChatConfig(
                "broadcast_capacity must be greater than 0".to_owned(),
            ));
        }

        if self.chat.community_history_limit == 0 {
            return Err(ConfigError::InvalidChatConfig(
                "community_history_limit must be greater than 0".to_owned(),
            ));
        }

        if self.media.bucket.trim().is_empty() {
            return Err(ConfigError::InvalidMediaConfig(
                "bucket cannot be empty".to_owned(),
            ));
        }

        if self.media.attachment_max_bytes == 0 || self.media.image_max_bytes == 0 {
            return Err(ConfigError::InvalidMediaConfig(
                "size limits must be greater than 0".to_owned(),
            ));
        }

        // 图片上限是附件上限的子集
        if self.media.image_max_bytes > self.media.attachment_max_bytes {
            return Err(ConfigError::InvalidMediaConfig(
                "image_max_bytes cannot exceed attachment_max_bytes".to_owned(),
            ));
        }

        Ok(())
    }
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(String),
    #[error("Invalid chat configuration: {0}")]
    InvalidChatConfig(String),
    #[error("Invalid media configuration: {0}")]
    InvalidMediaConfig(String),
}
