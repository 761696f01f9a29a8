//! 通知汇总
//!
//! 派生数据，不持久化：每次从存储重新计算。

use serde::{Deserialize, Serialize};

/// 聚合通知数：待处理好友请求 + 未读私聊消息
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NotificationSummary {
    pub pending_requests: u64,
    pub unread_messages: u64,
}

impl NotificationSummary {
    pub fn new(pending_requests: u64, unread_messages: u64) -> Self {
        Self {
            pending_requests,
            unread_messages,
        }
    }

    pub fn total(&self) -> u64 {
        self.pending_requests + self.unread_messages
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total() {
        let summary = NotificationSummary::new(2, 3);
        assert_eq!(summary.total(), 5);
        assert!(!summary.is_empty());
        assert!(NotificationSummary::default().is_empty());
    }
}
