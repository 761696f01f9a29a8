//! 会话存储协作方接口
//!
//! 核心只依赖这组按表划分的读写/订阅契约，不依赖任何具体存储引擎。
//! 行数据在这条边界上就是显式类型（DirectMessage 等），不做动态行。
//! 订阅使用 tokio broadcast：推送是整张表级别的，事件可能来自任何
//! 会话/社区，消费方必须自行核对归属后再应用。

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::broadcast;

use domain::{
    CommunityId, CommunityMessage, ConversationKey, DirectMessage, FriendRequest, MessageId,
    UserId, UserProfile,
};

use crate::error::ApplicationResult;

/// 私聊消息表的变更事件
#[derive(Debug, Clone)]
pub enum DirectMessageEvent {
    Inserted(DirectMessage),
    Updated(DirectMessage),
}

/// 社区消息表的变更事件
#[derive(Debug, Clone)]
pub enum CommunityMessageEvent {
    Inserted(CommunityMessage),
    Deleted {
        community_id: CommunityId,
        message_id: MessageId,
    },
}

/// 好友请求表的变更事件
#[derive(Debug, Clone)]
pub enum FriendRequestEvent {
    Inserted(FriendRequest),
    Updated(FriendRequest),
}

/// 私聊消息存储
#[async_trait]
pub trait DirectMessageStore: Send + Sync {
    /// 按会话拉取全部消息，创建时间升序
    async fn list_conversation(
        &self,
        key: &ConversationKey,
    ) -> ApplicationResult<Vec<DirectMessage>>;

    /// 写入新消息
    async fn insert(&self, message: DirectMessage) -> ApplicationResult<()>;

    /// 批量条件更新：把 sender 发给 receiver 的所有未读消息标记为已读，
    /// 返回实际更新的条数（幂等：没有未读消息时更新 0 条）
    async fn mark_read(&self, sender: UserId, receiver: UserId) -> ApplicationResult<u64>;

    /// 把 viewer 追加到消息的 deleted_for 集合（幂等）
    async fn hide_for(&self, id: MessageId, viewer: UserId) -> ApplicationResult<()>;

    /// 发给 receiver 的未读消息总数
    async fn count_unread(&self, receiver: UserId) -> ApplicationResult<u64>;

    /// 订阅整张表的变更事件
    fn subscribe(&self) -> broadcast::Receiver<DirectMessageEvent>;
}

/// 社区消息存储
#[async_trait]
pub trait CommunityMessageStore: Send + Sync {
    /// 拉取社区最近的 limit 条消息，创建时间升序
    async fn list_recent(
        &self,
        community_id: CommunityId,
        limit: usize,
    ) -> ApplicationResult<Vec<CommunityMessage>>;

    /// 写入新消息
    async fn insert(&self, message: CommunityMessage) -> ApplicationResult<()>;

    /// 硬删除：对所有成员立即生效
    async fn delete(&self, id: MessageId) -> ApplicationResult<()>;

    /// 订阅整张表的变更事件
    fn subscribe(&self) -> broadcast::Receiver<CommunityMessageEvent>;
}

/// 好友请求存储
#[async_trait]
pub trait FriendRequestStore: Send + Sync {
    /// 发给 addressee 的待处理请求数
    async fn count_pending(&self, addressee: UserId) -> ApplicationResult<u64>;

    /// 订阅整张表的变更事件
    fn subscribe(&self) -> broadcast::Receiver<FriendRequestEvent>;
}

/// 用户展示资料查询
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn find(&self, user_id: UserId) -> ApplicationResult<Option<UserProfile>>;

    /// 批量查询（社区历史拉取时按作者去重后一次取回）
    async fn find_many(
        &self,
        user_ids: &[UserId],
    ) -> ApplicationResult<HashMap<UserId, UserProfile>>;
}

/// 社区成员目录（成员资格由外部授权层维护，这里只读）
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommunityDirectory: Send + Sync {
    async fn is_member(&self, community_id: CommunityId, user_id: UserId)
        -> ApplicationResult<bool>;
}

/// 内存实现的存储协作方（用于测试和本地演示）
pub mod memory {
    use std::collections::{HashMap, HashSet};
    use std::sync::Arc;

    use tokio::sync::RwLock;

    use domain::{FriendRequest, FriendRequestStatus, RequestId};

    use super::*;
    use crate::error::ApplicationError;

    /// 内存私聊消息存储
    pub struct MemoryDirectMessageStore {
        rows: Arc<RwLock<HashMap<MessageId, DirectMessage>>>,
        events: broadcast::Sender<DirectMessageEvent>,
    }

    impl MemoryDirectMessageStore {
        pub fn new(capacity: usize) -> Self {
            let (events, _) = broadcast::channel(capacity);
            Self {
                rows: Arc::new(RwLock::new(HashMap::new())),
                events,
            }
        }
    }

    #[async_trait]
    impl DirectMessageStore for MemoryDirectMessageStore {
        async fn list_conversation(
            &self,
            key: &ConversationKey,
        ) -> ApplicationResult<Vec<DirectMessage>> {
            let rows = self.rows.read().await;
            let mut messages: Vec<DirectMessage> = rows
                .values()
                .filter(|m| m.belongs_to(key))
                .cloned()
                .collect();
            messages.sort_by_key(|m| m.created_at);
            Ok(messages)
        }

        async fn insert(&self, message: DirectMessage) -> ApplicationResult<()> {
            let mut rows = self.rows.write().await;
            rows.insert(message.id, message.clone());
            drop(rows);

            // 没有订阅者不算错误
            let _ = self.events.send(DirectMessageEvent::Inserted(message));
            Ok(())
        }

        async fn mark_read(&self, sender: UserId, receiver: UserId) -> ApplicationResult<u64> {
            let mut updated = Vec::new();
            {
                let mut rows = self.rows.write().await;
                for message in rows.values_mut() {
                    if message.sender_id == sender && message.receiver_id == receiver && !message.read
                    {
                        message.mark_read();
                        updated.push(message.clone());
                    }
                }
            }

            let count = updated.len() as u64;
            for message in updated {
                let _ = self.events.send(DirectMessageEvent::Updated(message));
            }
            Ok(count)
        }

        async fn hide_for(&self, id: MessageId, viewer: UserId) -> ApplicationResult<()> {
            let updated = {
                let mut rows = self.rows.write().await;
                let message = rows.get_mut(&id).ok_or_else(|| {
                    ApplicationError::not_found(format!("消息不存在: {id}"))
                })?;
                message.hide_for(viewer);
                message.clone()
            };

            let _ = self.events.send(DirectMessageEvent::Updated(updated));
            Ok(())
        }

        async fn count_unread(&self, receiver: UserId) -> ApplicationResult<u64> {
            let rows = self.rows.read().await;
            let count = rows
                .values()
                .filter(|m| m.is_unread_inbound_for(receiver))
                .count();
            Ok(count as u64)
        }

        fn subscribe(&self) -> broadcast::Receiver<DirectMessageEvent> {
            self.events.subscribe()
        }
    }

    /// 内存社区消息存储
    pub struct MemoryCommunityMessageStore {
        rows: Arc<RwLock<HashMap<MessageId, CommunityMessage>>>,
        events: broadcast::Sender<CommunityMessageEvent>,
    }

    impl MemoryCommunityMessageStore {
        pub fn new(capacity: usize) -> Self {
            let (events, _) = broadcast::channel(capacity);
            Self {
                rows: Arc::new(RwLock::new(HashMap::new())),
                events,
            }
        }
    }

    #[async_trait]
    impl CommunityMessageStore for MemoryCommunityMessageStore {
        async fn list_recent(
            &self,
            community_id: CommunityId,
            limit: usize,
        ) -> ApplicationResult<Vec<CommunityMessage>> {
            let rows = self.rows.read().await;
            let mut messages: Vec<CommunityMessage> = rows
                .values()
                .filter(|m| m.community_id == community_id)
                .cloned()
                .collect();
            messages.sort_by_key(|m| m.created_at);

            // 只保留最近 limit 条，保持升序
            if messages.len() > limit {
                messages.drain(..messages.len() - limit);
            }
            Ok(messages)
        }

        async fn insert(&self, message: CommunityMessage) -> ApplicationResult<()> {
            let mut rows = self.rows.write().await;
            rows.insert(message.id, message.clone());
            drop(rows);

            let _ = self.events.send(CommunityMessageEvent::Inserted(message));
            Ok(())
        }

        async fn delete(&self, id: MessageId) -> ApplicationResult<()> {
            let removed = {
                let mut rows = self.rows.write().await;
                rows.remove(&id)
            };

            // 重复删除视为幂等
            if let Some(message) = removed {
                let _ = self.events.send(CommunityMessageEvent::Deleted {
                    community_id: message.community_id,
                    message_id: id,
                });
            }
            Ok(())
        }

        fn subscribe(&self) -> broadcast::Receiver<CommunityMessageEvent> {
            self.events.subscribe()
        }
    }

    /// 内存好友请求存储
    pub struct MemoryFriendRequestStore {
        rows: Arc<RwLock<HashMap<RequestId, FriendRequest>>>,
        events: broadcast::Sender<FriendRequestEvent>,
    }

    impl MemoryFriendRequestStore {
        pub fn new(capacity: usize) -> Self {
            let (events, _) = broadcast::channel(capacity);
            Self {
                rows: Arc::new(RwLock::new(HashMap::new())),
                events,
            }
        }

        /// 写入新的好友请求
        pub async fn insert(&self, request: FriendRequest) {
            let mut rows = self.rows.write().await;
            rows.insert(request.id, request.clone());
            drop(rows);

            let _ = self.events.send(FriendRequestEvent::Inserted(request));
        }

        /// 更新请求状态
        pub async fn set_status(&self, id: RequestId, status: FriendRequestStatus) {
            let updated = {
                let mut rows = self.rows.write().await;
                rows.get_mut(&id).map(|request| {
                    request.status = status;
                    request.clone()
                })
            };

            if let Some(request) = updated {
                let _ = self.events.send(FriendRequestEvent::Updated(request));
            }
        }
    }

    #[async_trait]
    impl FriendRequestStore for MemoryFriendRequestStore {
        async fn count_pending(&self, addressee: UserId) -> ApplicationResult<u64> {
            let rows = self.rows.read().await;
            let count = rows
                .values()
                .filter(|r| r.is_pending_for(addressee))
                .count();
            Ok(count as u64)
        }

        fn subscribe(&self) -> broadcast::Receiver<FriendRequestEvent> {
            self.events.subscribe()
        }
    }

    /// 内存用户资料存储
    #[derive(Default)]
    pub struct MemoryProfileStore {
        rows: RwLock<HashMap<UserId, UserProfile>>,
    }

    impl MemoryProfileStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn upsert(&self, profile: UserProfile) {
            let mut rows = self.rows.write().await;
            rows.insert(profile.user_id, profile);
        }
    }

    #[async_trait]
    impl ProfileStore for MemoryProfileStore {
        async fn find(&self, user_id: UserId) -> ApplicationResult<Option<UserProfile>> {
            let rows = self.rows.read().await;
            Ok(rows.get(&user_id).cloned())
        }

        async fn find_many(
            &self,
            user_ids: &[UserId],
        ) -> ApplicationResult<HashMap<UserId, UserProfile>> {
            let rows = self.rows.read().await;
            Ok(user_ids
                .iter()
                .filter_map(|id| rows.get(id).map(|p| (*id, p.clone())))
                .collect())
        }
    }

    /// 内存社区成员目录
    #[derive(Default)]
    pub struct MemoryCommunityDirectory {
        members: RwLock<HashMap<CommunityId, HashSet<UserId>>>,
    }

    impl MemoryCommunityDirectory {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn add_member(&self, community_id: CommunityId, user_id: UserId) {
            let mut members = self.members.write().await;
            members.entry(community_id).or_default().insert(user_id);
        }

        pub async fn remove_member(&self, community_id: CommunityId, user_id: UserId) {
            let mut members = self.members.write().await;
            if let Some(set) = members.get_mut(&community_id) {
                set.remove(&user_id);
            }
        }
    }

    #[async_trait]
    impl CommunityDirectory for MemoryCommunityDirectory {
        async fn is_member(
            &self,
            community_id: CommunityId,
            user_id: UserId,
        ) -> ApplicationResult<bool> {
            let members = self.members.read().await;
            Ok(members
                .get(&community_id)
                .map(|set| set.contains(&user_id))
                .unwrap_or(false))
        }
    }
}
