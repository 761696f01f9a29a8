//! 应用层实现。
//!
//! 这里提供围绕领域模型的会话同步服务：私聊与社区视图的拉取
//! 加订阅合并、打字状态跟踪、已读对账与通知聚合、媒体附件
//! 管线，以及对存储与对象存储等外部适配器的抽象。

pub mod clock;
pub mod error;
pub mod media;
pub mod presence;
pub mod services;
pub mod session;
pub mod store;

pub use clock::{Clock, SystemClock};
pub use error::{ApplicationError, ApplicationResult};
pub use media::{
    AttachmentUpload, AudioCapture, MediaAttachmentPipeline, ObjectStorage, PreparedAttachment,
    UploadTask, VoiceRecorder,
};
pub use presence::{PresenceChannel, TypingTracker};
pub use services::{
    CommunityChatDependencies, CommunityChatSession, DirectChatDependencies, DirectChatSession,
    MutationState, NotificationService, NotificationWatch, ReadStateReconciler, SyncState,
};
pub use session::SessionContext;
pub use store::{
    CommunityDirectory, CommunityMessageEvent, CommunityMessageStore, DirectMessageEvent,
    DirectMessageStore, FriendRequestEvent, FriendRequestStore, ProfileStore,
};
