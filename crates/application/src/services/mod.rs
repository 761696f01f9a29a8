mod community_chat_service;
mod direct_chat_service;
mod notification_service;

pub use community_chat_service::{CommunityChatDependencies, CommunityChatSession};
pub use direct_chat_service::{
    DirectChatDependencies, DirectChatSession, MutationState, SyncState,
};
pub use notification_service::{NotificationService, NotificationWatch, ReadStateReconciler};

#[cfg(test)]
pub(crate) mod test_support;

#[cfg(test)]
mod notification_service_tests;
