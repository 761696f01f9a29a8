//! 已读状态对账与通知聚合
//!
//! 已读标记是批量条件更新（按发送者/接收者过滤未读消息），不是逐条。
//! 通知数 = 发给我的待处理好友请求 + 发给我的未读私聊消息，
//! 是派生值：按需从存储重新计算，从不落盘。

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use domain::{ConversationKey, DirectMessage, NotificationSummary, UserId};

use crate::error::ApplicationResult;
use crate::session::SessionContext;
use crate::store::{
    DirectMessageEvent, DirectMessageStore, FriendRequestEvent, FriendRequestStore,
};

/// 已读状态对账器
pub struct ReadStateReconciler {
    messages: Arc<dyn DirectMessageStore>,
}

impl ReadStateReconciler {
    pub fn new(messages: Arc<dyn DirectMessageStore>) -> Self {
        Self { messages }
    }

    /// 把 friend 发给 reader 的所有未读消息标记为已读。
    /// 幂等：连续调用两次，第二次更新 0 条，读标志和通知数不变。
    pub async fn mark_conversation_read(
        &self,
        reader: UserId,
        friend: UserId,
    ) -> ApplicationResult<u64> {
        let updated = self.messages.mark_read(friend, reader).await?;
        if updated > 0 {
            debug!(%reader, %friend, updated, "会话消息已标记已读");
        }
        Ok(updated)
    }
}

/// 通知聚合服务
pub struct NotificationService {
    session: SessionContext,
    messages: Arc<dyn DirectMessageStore>,
    requests: Arc<dyn FriendRequestStore>,
    reconciler: Arc<ReadStateReconciler>,
}

impl NotificationService {
    pub fn new(
        session: SessionContext,
        messages: Arc<dyn DirectMessageStore>,
        requests: Arc<dyn FriendRequestStore>,
        reconciler: Arc<ReadStateReconciler>,
    ) -> Self {
        Self {
            session,
            messages,
            requests,
            reconciler,
        }
    }

    /// 当前通知汇总，从存储重新计算
    pub async fn summary(&self) -> ApplicationResult<NotificationSummary> {
        compute_summary(&self.messages, &self.requests, self.session.user_id()).await
    }

    /// 订阅两张底层表的变更，任何"我是接收人"的事件都触发重算，
    /// 重算结果通过 watch 通道推给界面层。
    pub async fn watch(&self) -> ApplicationResult<NotificationWatch> {
        let me = self.session.user_id();
        let initial = self.summary().await?;
        let (tx, rx) = watch::channel(initial);

        let mut message_events = self.messages.subscribe();
        let mut request_events = self.requests.subscribe();
        let messages = self.messages.clone();
        let requests = self.requests.clone();

        let task = tokio::spawn(async move {
            loop {
                let relevant = tokio::select! {
                    event = message_events.recv() => match event {
                        Ok(DirectMessageEvent::Inserted(message))
                        | Ok(DirectMessageEvent::Updated(message)) => message.receiver_id == me,
                        // 落后说明可能错过了相关事件，保守地重算一次
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "通知订阅落后于消息事件流");
                            true
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    event = request_events.recv() => match event {
                        Ok(FriendRequestEvent::Inserted(request))
                        | Ok(FriendRequestEvent::Updated(request)) => request.addressee_id == me,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "通知订阅落后于好友请求事件流");
                            true
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                };

                if !relevant {
                    continue;
                }

                match compute_summary(&messages, &requests, me).await {
                    // 接收端已丢弃时结束任务
                    Ok(summary) => {
                        if tx.send(summary).is_err() {
                            break;
                        }
                    }
                    // 单次重算失败不终止订阅
                    Err(error) => warn!(%error, "重新计算通知数失败"),
                }
            }
        });

        Ok(NotificationWatch { receiver: rx, task })
    }

    /// 点开一条未读消息通知：先发出已读写入（不等待完成），
    /// 随后立即返回要打开的会话键用于页面跳转。
    pub fn open_message_notification(
        &self,
        message: &DirectMessage,
    ) -> ApplicationResult<ConversationKey> {
        let me = self.session.user_id();
        if message.receiver_id != me {
            return Err(crate::error::ApplicationError::unauthorized(
                "只能打开发给自己的通知",
            ));
        }

        let reconciler = self.reconciler.clone();
        let friend = message.sender_id;
        tokio::spawn(async move {
            if let Err(error) = reconciler.mark_conversation_read(me, friend).await {
                warn!(%error, "通知跳转时标记已读失败");
            }
        });

        Ok(ConversationKey::new(me, friend))
    }
}

async fn compute_summary(
    messages: &Arc<dyn DirectMessageStore>,
    requests: &Arc<dyn FriendRequestStore>,
    user_id: UserId,
) -> ApplicationResult<NotificationSummary> {
    let pending_requests = requests.count_pending(user_id).await?;
    let unread_messages = messages.count_unread(user_id).await?;
    Ok(NotificationSummary::new(pending_requests, unread_messages))
}

/// 通知数的实时订阅句柄，关闭时取消后台任务
pub struct NotificationWatch {
    receiver: watch::Receiver<NotificationSummary>,
    task: JoinHandle<()>,
}

impl NotificationWatch {
    /// 最近一次推送的汇总
    pub fn latest(&self) -> NotificationSummary {
        *self.receiver.borrow()
    }

    /// 等待下一次变化
    pub async fn changed(&mut self) -> ApplicationResult<NotificationSummary> {
        self.receiver
            .changed()
            .await
            .map_err(|_| crate::error::ApplicationError::store("通知订阅已关闭"))?;
        Ok(*self.receiver.borrow())
    }

    pub fn close(self) {
        self.task.abort();
    }
}
