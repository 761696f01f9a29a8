//! 会话上下文
//!
//! 当前登录用户的显式上下文，传入每个需要用户标识的服务，
//! 代替环境全局可变的认证状态。由外部认证协作方在登录后构造。

use domain::UserId;

/// 当前登录用户的会话上下文
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionContext {
    user_id: UserId,
}

impl SessionContext {
    pub fn new(user_id: UserId) -> Self {
        Self { user_id }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }
}
