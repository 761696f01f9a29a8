//! 本地后端装配
//!
//! 把内存存储、本地在线状态通道和内存对象存储装配成一套可用的
//! 协作方集合，并提供按用户构造各个会话服务的便捷入口。配置来自
//! 统一配置中心。

use std::sync::Arc;
use std::time::Duration;

use application::presence::local::LocalPresenceChannel;
use application::store::memory::{
    MemoryCommunityDirectory, MemoryCommunityMessageStore, MemoryDirectMessageStore,
    MemoryFriendRequestStore, MemoryProfileStore,
};
use application::{
    CommunityChatDependencies, CommunityChatSession, DirectChatDependencies, DirectChatSession,
    MediaAttachmentPipeline, NotificationService, ReadStateReconciler, SessionContext, SystemClock,
};
use config::AppConfig;
use domain::{CommunityId, UserId};

use crate::storage::MemoryObjectStorage;

/// 本地装配好的协作方集合
#[derive(Clone)]
pub struct LocalBackend {
    pub direct_messages: Arc<MemoryDirectMessageStore>,
    pub community_messages: Arc<MemoryCommunityMessageStore>,
    pub friend_requests: Arc<MemoryFriendRequestStore>,
    pub profiles: Arc<MemoryProfileStore>,
    pub directory: Arc<MemoryCommunityDirectory>,
    pub presence: Arc<LocalPresenceChannel>,
    pub storage: Arc<MemoryObjectStorage>,
    pub media: Arc<MediaAttachmentPipeline>,
    pub reconciler: Arc<ReadStateReconciler>,
    clock: Arc<SystemClock>,
    typing_idle: Duration,
    history_limit: usize,
}

impl LocalBackend {
    pub fn new(config: &AppConfig) -> Self {
        let capacity = config.chat.broadcast_capacity;
        let direct_messages = Arc::new(MemoryDirectMessageStore::new(capacity));
        let clock = Arc::new(SystemClock);
        let storage = Arc::new(MemoryObjectStorage::new(&config.media.storage_base_url));

        let media = Arc::new(MediaAttachmentPipeline::new(
            storage.clone(),
            clock.clone(),
            &config.media.bucket,
            config.media.attachment_max_bytes,
            config.media.image_max_bytes,
        ));
        let reconciler = Arc::new(ReadStateReconciler::new(direct_messages.clone()));

        Self {
            direct_messages,
            community_messages: Arc::new(MemoryCommunityMessageStore::new(capacity)),
            friend_requests: Arc::new(MemoryFriendRequestStore::new(capacity)),
            profiles: Arc::new(MemoryProfileStore::new()),
            directory: Arc::new(MemoryCommunityDirectory::new()),
            presence: Arc::new(LocalPresenceChannel::new(capacity)),
            storage,
            media,
            reconciler,
            clock,
            typing_idle: Duration::from_millis(config.chat.typing_idle_ms),
            history_limit: config.chat.community_history_limit,
        }
    }

    /// 为某个用户构造与 friend 的私聊会话
    pub fn direct_session(&self, me: UserId, friend: UserId) -> DirectChatSession {
        DirectChatSession::new(
            SessionContext::new(me),
            friend,
            DirectChatDependencies {
                messages: self.direct_messages.clone(),
                presence: self.presence.clone(),
                reconciler: self.reconciler.clone(),
                clock: self.clock.clone(),
                typing_idle: self.typing_idle,
            },
        )
    }

    /// 为某个用户构造社区聊天会话
    pub fn community_session(&self, me: UserId, community: CommunityId) -> CommunityChatSession {
        CommunityChatSession::new(
            SessionContext::new(me),
            community,
            CommunityChatDependencies {
                messages: self.community_messages.clone(),
                profiles: self.profiles.clone(),
                directory: self.directory.clone(),
                clock: self.clock.clone(),
                history_limit: self.history_limit,
            },
        )
    }

    /// 为某个用户构造通知聚合服务
    pub fn notifications(&self, me: UserId) -> NotificationService {
        NotificationService::new(
            SessionContext::new(me),
            self.direct_messages.clone(),
            self.friend_requests.clone(),
            self.reconciler.clone(),
        )
    }
}
