//! 私聊消息实体定义
//!
//! 私聊消息只做按用户的软删除：`deleted_for` 记录对哪些用户隐藏，
//! 永远不会被双方的操作物理删除。

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{DomainError, DomainResult};
use crate::value_objects::{ConversationKey, MediaKind, MessageId, Timestamp, UserId};

/// 消息附带的媒体描述
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageMedia {
    /// 对象存储返回的公开URL
    pub url: String,
    /// 媒体类型
    pub kind: MediaKind,
}

impl MessageMedia {
    pub fn new(url: impl Into<String>, kind: MediaKind) -> DomainResult<Self> {
        let url = url.into();
        if url.is_empty() {
            return Err(DomainError::validation_error("media_url", "媒体URL不能为空"));
        }
        Ok(Self { url, kind })
    }
}

/// 私聊消息实体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectMessage {
    /// 消息唯一ID
    pub id: MessageId,
    /// 发送者ID
    pub sender_id: UserId,
    /// 接收者ID
    pub receiver_id: UserId,
    /// 消息内容（媒体消息为占位文案）
    pub content: String,
    /// 接收者是否已读
    pub read: bool,
    /// 发送时间
    pub created_at: Timestamp,
    /// 被回复的消息ID（弱引用，目标可能已不可见）
    pub reply_to: Option<MessageId>,
    /// 附带的媒体（可选）
    pub media: Option<MessageMedia>,
    /// 对这些用户隐藏（按用户软删除）
    pub deleted_for: HashSet<UserId>,
}

impl DirectMessage {
    /// 创建新的文本消息
    pub fn new_text(
        sender_id: UserId,
        receiver_id: UserId,
        content: impl Into<String>,
        now: Timestamp,
    ) -> DomainResult<Self> {
        let content = content.into();
        Self::validate_content(&content)?;

        Ok(Self {
            id: MessageId::from(Uuid::new_v4()),
            sender_id,
            receiver_id,
            content,
            read: false,
            created_at: now,
            reply_to: None,
            media: None,
            deleted_for: HashSet::new(),
        })
    }

    /// 创建新的回复消息
    pub fn new_reply(
        sender_id: UserId,
        receiver_id: UserId,
        content: impl Into<String>,
        reply_to: MessageId,
        now: Timestamp,
    ) -> DomainResult<Self> {
        let mut message = Self::new_text(sender_id, receiver_id, content, now)?;
        message.reply_to = Some(reply_to);
        Ok(message)
    }

    /// 创建新的媒体消息，正文使用媒体类型对应的占位文案
    pub fn new_media(
        sender_id: UserId,
        receiver_id: UserId,
        media: MessageMedia,
        now: Timestamp,
    ) -> Self {
        Self {
            id: MessageId::from(Uuid::new_v4()),
            sender_id,
            receiver_id,
            content: media.kind.placeholder_caption().to_owned(),
            read: false,
            created_at: now,
            reply_to: None,
            media: Some(media),
            deleted_for: HashSet::new(),
        }
    }

    /// 消息对某个用户是否可见。
    /// 不变量：viewer 不在 `deleted_for` 中时可见。
    pub fn is_visible_to(&self, viewer: UserId) -> bool {
        !self.deleted_for.contains(&viewer)
    }

    /// 对某个用户隐藏此消息（幂等）。返回是否发生了变化。
    pub fn hide_for(&mut self, viewer: UserId) -> bool {
        self.deleted_for.insert(viewer)
    }

    /// 标记为已读
    pub fn mark_read(&mut self) {
        self.read = true;
    }

    /// 检查消息是否属于指定会话（两个方向都算）
    pub fn belongs_to(&self, key: &ConversationKey) -> bool {
        key.matches(self.sender_id, self.receiver_id)
    }

    /// 是否为发给 user 且未读的入站消息
    pub fn is_unread_inbound_for(&self, user: UserId) -> bool {
        self.receiver_id == user && !self.read
    }

    pub fn is_reply(&self) -> bool {
        self.reply_to.is_some()
    }

    /// 获取消息的简短预览（用于回复引用等）
    pub fn preview(&self, max_chars: usize) -> String {
        if self.content.chars().count() <= max_chars {
            self.content.clone()
        } else {
            let truncated: String = self.content.chars().take(max_chars).collect();
            format!("{truncated}...")
        }
    }

    /// 验证消息内容
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
