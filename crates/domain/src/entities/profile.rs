//! 用户展示资料

use serde::{Deserialize, Serialize};

use crate::value_objects::UserId;

/// 用户展示资料（社区消息渲染时附加到每条消息上）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: UserId,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

impl UserProfile {
    pub fn new(user_id: UserId, display_name: impl Into<String>) -> Self {
        Self {
            user_id,
            display_name: display_name.into(),
            avatar_url: None,
        }
    }

    pub fn with_avatar(mut self, url: impl Into<String>) -> Self {
        self.avatar_url = Some(url.into());
        self
    }

    /// 资料查询失败时的占位资料，保证消息仍可渲染
    pub fn unknown(user_id: UserId) -> Self {
        Self {
            user_id,
            display_name: "unknown user".to_owned(),
            avatar_url: None,
        }
    }
}
