//! 领域实体定义

pub mod community_message;
pub mod direct_message;
pub mod friend_request;
pub mod notification;
pub mod presence;
pub mod profile;

pub use community_message::{CommunityMessage, CommunityMessageView};
pub use direct_message::{DirectMessage, MessageMedia};
pub use friend_request::{FriendRequest, FriendRequestStatus};
pub use notification::NotificationSummary;
pub use presence::PresenceRecord;
pub use profile::UserProfile;
