//! 社区消息实体定义
//!
//! 社区消息没有软删除概念：删除是真正的移除，通过删除事件
//! 立即对所有成员生效。消息创建后不可编辑。

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{DomainError, DomainResult};
use crate::value_objects::{CommunityId, MessageId, Timestamp, UserId};

use super::profile::UserProfile;

/// 社区消息实体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunityMessage {
    /// 消息唯一ID
    pub id: MessageId,
    /// 所属社区ID
    pub community_id: CommunityId,
    /// 作者ID
    pub author_id: UserId,
    /// 消息内容
    pub content: String,
    /// 发送时间
    pub created_at: Timestamp,
}

impl CommunityMessage {
    /// 创建新的社区消息
    pub fn new(
        community_id: CommunityId,
        author_id: UserId,
        content: impl Into<String>,
        now: Timestamp,
    ) -> DomainResult<Self> {
        let content = content.into();
        Self::validate_content(&content)?;

        Ok(Self {
            id: MessageId::from(Uuid::new_v4()),
            community_id,
            author_id,
            content,
            created_at: now,
        })
    }

    /// 是否由指定用户撰写
    pub fn is_authored_by(&self, user: UserId) -> bool {
        self.author_id == user
    }

    fn validate_content(content: &str) -> DomainResult<()> {
        if content.trim().is_empty() {
            return Err(DomainError::validation_error("content", "消息内容不能为空"));
        }

        if content.chars().count() > 2000 {
            return Err(DomainError::validation_error(
                "content",
                "消息内容不能超过2000个字符",
            ));
        }

        Ok(())
    }
}

/// 用于展示的社区消息：消息本体加上作者资料。
///
/// 作者资料查询失败时使用占位资料，整条消息仍然可渲染。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunityMessageView {
    pub message: CommunityMessage,
    pub author: UserProfile,
}

impl CommunityMessageView {
    pub fn new(message: CommunityMessage, author: UserProfile) -> Self {
        Self { message, author }
    }

    pub fn id(&self) -> MessageId {
        self.message.id
    }
}
