//! 在线打字状态记录
//!
//! 临时状态，只在会话的广播通道内传递，从不持久化。
//! 指示器显示的就是对方最后一次广播的值：如果对方崩溃前没有
//! 发出 `typing: false`，指示器会停留在 true。这是纯广播式
//! 在线状态的已知局限，这里保留 `last_update` 供上层自行判断。

use serde::{Deserialize, Serialize};

use crate::value_objects::{Timestamp, UserId};

/// 单个用户在某会话内的打字状态
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub user_id: UserId,
    pub typing: bool,
    pub last_update: Timestamp,
}

impl PresenceRecord {
    pub fn new(user_id: UserId, typing: bool, now: Timestamp) -> Self {
        Self {
            user_id,
            typing,
            last_update: now,
        }
    }
}
