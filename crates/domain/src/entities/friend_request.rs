//! 好友请求实体定义

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value_objects::{RequestId, Timestamp, UserId};

/// 好友请求状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FriendRequestStatus {
    /// 待处理
    Pending,
    /// 已接受
    Accepted,
    /// 已拒绝
    Declined,
}

/// 好友请求实体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FriendRequest {
    pub id: RequestId,
    /// 发起人
    pub requester_id: UserId,
    /// 接收人
    pub addressee_id: UserId,
    pub status: FriendRequestStatus,
    pub created_at: Timestamp,
}

impl FriendRequest {
    pub fn new(requester_id: UserId, addressee_id: UserId, now: Timestamp) -> Self {
        Self {
            id: RequestId::from(Uuid::new_v4()),
            requester_id,
            addressee_id,
            status: FriendRequestStatus::Pending,
            created_at: now,
        }
    }

    /// 是否为发给 user 的待处理请求（计入通知数）
    pub fn is_pending_for(&self, user: UserId) -> bool {
        self.addressee_id == user && self.status == FriendRequestStatus::Pending
    }

    pub fn accept(&mut self) {
        self.status = FriendRequestStatus::Accepted;
    }

    pub fn decline(&mut self) {
        self.status = FriendRequestStatus::Declined;
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[test]
    fn test_pending_request_counts_for_addressee_only() {
        let requester = UserId::from(Uuid::new_v4());
        let addressee = UserId::from(Uuid::new_v4());
        let request = FriendRequest::new(requester, addressee, Utc::now());

        assert!(request.is_pending_for(addressee));
        assert!(!request.is_pending_for(requester));
    }

    #[test]
    fn test_accepted_request_no_longer_pending() {
        let requester = UserId::from(Uuid::new_v4());
        let addressee = UserId::from(Uuid::new_v4());
        let mut request = FriendRequest::new(requester, addressee, Utc::now());

        request.accept();
        assert_eq!(request.status, FriendRequestStatus::Accepted);
        assert!(!request.is_pending_for(addressee));
    }
}
