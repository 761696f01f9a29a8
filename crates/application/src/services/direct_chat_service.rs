//! 私聊会话同步服务
//!
//! 为一个打开的 1:1 会话维护内存中按时间升序的消息视图：
//! 把初始拉取的页面与订阅推来的新消息合并，应用按用户的软删除
//! 过滤，并在对方消息到达时触发已读对账。
//!
//! 发送走"订阅回声"模式：写入成功后不做本地乐观追加，消息的
//! 显示依赖随后到达的插入事件。订阅尚未建立时消息不会出现——
//! 这是已知的顺序依赖，`open` 因此先订阅再拉取。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use domain::{ConversationKey, DirectMessage, MessageId, PresenceRecord, UserId};

use crate::clock::Clock;
use crate::error::{ApplicationError, ApplicationResult};
use crate::media::PreparedAttachment;
use crate::presence::{PresenceChannel, TypingTracker};
use crate::session::SessionContext;
use crate::store::{DirectMessageEvent, DirectMessageStore};

use super::notification_service::ReadStateReconciler;

/// 会话同步状态机：打开时 Closed -> Fetching -> Synced，
/// Synced 在每个插入事件上自环，关闭回到 Closed。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Closed,
    Fetching,
    Synced,
}

/// 本地先行变更的确认状态，供上层观察乐观与已确认状态的分歧
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationState {
    /// 本地已生效，持久化写入尚未返回
    Pending,
    /// 持久化写入成功
    Confirmed,
    /// 持久化写入失败；本地移除不回滚
    Failed,
}

pub struct DirectChatDependencies {
    pub messages: Arc<dyn DirectMessageStore>,
    pub presence: Arc<dyn PresenceChannel>,
    pub reconciler: Arc<ReadStateReconciler>,
    pub clock: Arc<dyn Clock>,
    /// 打字指示器的空闲超时
    pub typing_idle: Duration,
}

/// 一个打开的 1:1 会话视图
pub struct DirectChatSession {
    session: SessionContext,
    friend_id: UserId,
    key: ConversationKey,
    deps: DirectChatDependencies,
    typing: TypingTracker,
    state: Mutex<SyncState>,
    view: Arc<RwLock<Vec<DirectMessage>>>,
    pending_reply: Mutex<Option<MessageId>>,
    deletions: Arc<RwLock<HashMap<MessageId, MutationState>>>,
    peer_typing: Arc<RwLock<Option<PresenceRecord>>>,
    open: Arc<AtomicBool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl DirectChatSession {
    pub fn new(session: SessionContext, friend_id: UserId, deps: DirectChatDependencies) -> Self {
        let typing = TypingTracker::new(
            deps.presence.clone(),
            deps.clock.clone(),
            session.user_id(),
            deps.typing_idle,
        );

        Self {
            key: ConversationKey::new(session.user_id(), friend_id),
            session,
            friend_id,
            deps,
            typing,
            state: Mutex::new(SyncState::Closed),
            view: Arc::new(RwLock::new(Vec::new())),
            pending_reply: Mutex::new(None),
            deletions: Arc::new(RwLock::new(HashMap::new())),
            peer_typing: Arc::new(RwLock::new(None)),
            open: Arc::new(AtomicBool::new(false)),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn conversation_key(&self) -> ConversationKey {
        self.key
    }

    pub async fn state(&self) -> SyncState {
        *self.state.lock().await
    }

    /// 打开会话：先订阅再拉取（回声依赖），按 `deleted_for` 过滤，
    /// 随后触发已读对账并启动事件循环。
    pub async fn open(&self) -> ApplicationResult<()> {
        {
            let mut state = self.state.lock().await;
            if *state != SyncState::Closed {
                return Err(ApplicationError::validation("会话已打开"));
            }
            *state = SyncState::Fetching;
        }
        self.open.store(true, Ordering::SeqCst);

        let message_events = self.deps.messages.subscribe();
        let presence_events = self.deps.presence.subscribe();

        let me = self.session.user_id();
        let fetched = match self.deps.messages.list_conversation(&self.key).await {
            Ok(messages) => messages,
            Err(error) => {
                self.open.store(false, Ordering::SeqCst);
                *self.state.lock().await = SyncState::Closed;
                return Err(error);
            }
        };

        {
            let mut view = self.view.write().await;
            *view = fetched.into_iter().filter(|m| m.is_visible_to(me)).collect();
        }

        // 打开即把对方发来的未读消息标记已读；失败不阻止打开
        if let Err(error) = self
            .deps
            .reconciler
            .mark_conversation_read(me, self.friend_id)
            .await
        {
            warn!(%error, "打开会话时标记已读失败");
        }

        self.spawn_insert_loop(message_events).await;
        self.spawn_presence_loop(presence_events).await;

        *self.state.lock().await = SyncState::Synced;
        info!(conversation = %self.key, "私聊会话已同步");
        Ok(())
    }

    async fn spawn_insert_loop(&self, mut events: broadcast::Receiver<DirectMessageEvent>) {
        let view = self.view.clone();
        let open = self.open.clone();
        let key = self.key;
        let me = self.session.user_id();
        let friend_id = self.friend_id;
        let reconciler = self.deps.reconciler.clone();

        let handle = tokio::spawn(async move {
            loop {
                let message = match events.recv().await {
                    Ok(DirectMessageEvent::Inserted(message)) => message,
                    // 读标志等更新不改变本地视图的成员与顺序
                    Ok(DirectMessageEvent::Updated(_)) => continue,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "会话订阅落后于消息事件流");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };

                if !open.load(Ordering::SeqCst) {
                    break;
                }

                // 传输层按整张表推送，必须重新核对收发双方
                if !message.belongs_to(&key) {
                    continue;
                }
                if !message.is_visible_to(me) {
                    continue;
                }

                let from_friend = message.sender_id == friend_id;
                let appended = {
                    let mut view = view.write().await;
                    // 去重：同一条消息可能同时由初始拉取和订阅送达
                    if view.iter().any(|m| m.id == message.id) {
                        false
                    } else {
                        // 追加到尾部，不和已有消息重新排序
                        view.push(message);
                        true
                    }
                };

                // 会话开着时对方的新消息立即算已读
                if appended && from_friend {
                    if let Err(error) = reconciler.mark_conversation_read(me, friend_id).await {
                        warn!(%error, "标记新消息已读失败");
                    }
                }
            }
        });

        self.tasks.lock().await.push(handle);
    }

    async fn spawn_presence_loop(&self, mut events: broadcast::Receiver<PresenceRecord>) {
        let peer_typing = self.peer_typing.clone();
        let open = self.open.clone();
        let friend_id = self.friend_id;

        let handle = tokio::spawn(async move {
            loop {
                let record = match events.recv().await {
                    Ok(record) => record,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                };

                if !open.load(Ordering::SeqCst) {
                    break;
                }
                if record.user_id != friend_id {
                    continue;
                }

                // 指示器显示的就是对方最后一次广播的值
                *peer_typing.write().await = Some(record);
            }
        });

        self.tasks.lock().await.push(handle);
    }

    /// 发送文本消息。成功后清空回复上下文；本地不做乐观追加，
    /// 消息的显示依赖订阅回声。
    pub async fn send(&self, content: impl Into<String>) -> ApplicationResult<()> {
        self.ensure_open()?;

        // 发送前强制清除打字指示器
        self.typing.notify_send().await;

        let me = self.session.user_id();
        let now = self.deps.clock.now();
        let content = content.into();

        let reply_to = *self.pending_reply.lock().await;
        let message = match reply_to {
            Some(target) => {
                DirectMessage::new_reply(me, self.friend_id, content, target, now)?
            }
            None => DirectMessage::new_text(me, self.friend_id, content, now)?,
        };

        self.deps.messages.insert(message).await?;
        *self.pending_reply.lock().await = None;
        Ok(())
    }

    /// 发送管线产出的媒体附件
    pub async fn send_attachment(&self, prepared: PreparedAttachment) -> ApplicationResult<()> {
        self.ensure_open()?;
        self.typing.notify_send().await;

        let message = DirectMessage::new_media(
            self.session.user_id(),
            self.friend_id,
            prepared.media,
            self.deps.clock.now(),
        );
        self.deps.messages.insert(message).await?;
        Ok(())
    }

    /// 设置回复目标（下一条发送的消息携带此引用）
    pub async fn set_reply_target(&self, target: MessageId) {
        *self.pending_reply.lock().await = Some(target);
    }

    pub async fn clear_reply_target(&self) {
        *self.pending_reply.lock().await = None;
    }

    /// 渲染某条消息的引用预览。回复是弱引用：目标已被隐藏或
    /// 不在视图内时返回 None，整条消息仍然正常渲染。
    pub async fn reply_preview(&self, message: &DirectMessage) -> Option<String> {
        let target = message.reply_to?;
        let view = self.view.read().await;
        view.iter().find(|m| m.id == target).map(|m| m.preview(80))
    }

    /// 对自己隐藏一条消息：本地先行移除，再持久化。
    /// 持久化失败时本地移除不回滚，变更标记为 Failed 供观察。
    pub async fn delete_for_me(&self, id: MessageId) -> ApplicationResult<()> {
        self.ensure_open()?;
        let me = self.session.user_id();

        {
            let mut view = self.view.write().await;
            view.retain(|m| m.id != id);
        }
        self.deletions
            .write()
            .await
            .insert(id, MutationState::Pending);

        match self.deps.messages.hide_for(id, me).await {
            Ok(()) => {
                self.deletions
                    .write()
                    .await
                    .insert(id, MutationState::Confirmed);
                Ok(())
            }
            Err(error) => {
                self.deletions
                    .write()
                    .await
                    .insert(id, MutationState::Failed);
                Err(error)
            }
        }
    }

    /// 对自己隐藏当前可见的全部消息：逐条顺序执行，不保证原子性。
    /// 中途失败即返回，之后的消息保持可见。
    pub async fn delete_all_for_me(&self) -> ApplicationResult<()> {
        self.ensure_open()?;

        let ids: Vec<MessageId> = self.view.read().await.iter().map(|m| m.id).collect();
        for id in ids {
            self.delete_for_me(id).await?;
        }
        Ok(())
    }

    /// 撰写框按键透传给打字跟踪器
    pub async fn keystroke(&self) {
        if self.open.load(Ordering::SeqCst) {
            self.typing.keystroke().await;
        }
    }

    /// 对方是否正在打字（对方最后一次广播的值）
    pub async fn peer_is_typing(&self) -> bool {
        self.peer_typing
            .read()
            .await
            .map(|record| record.typing)
            .unwrap_or(false)
    }

    /// 当前可见消息的快照，时间升序
    pub async fn visible_messages(&self) -> Vec<DirectMessage> {
        self.view.read().await.clone()
    }

    /// 某次本地删除的确认状态
    pub async fn deletion_state(&self, id: MessageId) -> Option<MutationState> {
        self.deletions.read().await.get(&id).copied()
    }

    /// 关闭会话：撤掉插入订阅、在线状态订阅和挂起的打字计时器。
    /// 关闭后完成的写入结果会被 open 标志丢弃，不再应用到视图。
    pub async fn close(&self) {
        self.open.store(false, Ordering::SeqCst);

        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }
        self.typing.shutdown().await;

        *self.peer_typing.write().await = None;
        *self.state.lock().await = SyncState::Closed;
        info!(conversation = %self.key, "私聊会话已关闭");
    }

    fn ensure_open(&self) -> ApplicationResult<()> {
        if self.open.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ApplicationError::SessionClosed)
        }
    }
}
