//! 社区聊天会话同步服务
//!
//! 社区消息对所有成员共享一份：删除是硬删除，删除事件推给每个
//! 打开的会话并立即从各自视图移除。历史拉取只取最近一页，展示
//! 前按作者批量取回用户资料并与消息行合并。

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use domain::{
    CommunityId, CommunityMessage, CommunityMessageView, DomainError, MessageId, UserId,
    UserProfile,
};

use crate::clock::Clock;
use crate::error::{ApplicationError, ApplicationResult};
use crate::session::SessionContext;
use crate::store::{CommunityDirectory, CommunityMessageEvent, CommunityMessageStore, ProfileStore};

pub struct CommunityChatDependencies {
    pub messages: Arc<dyn CommunityMessageStore>,
    pub profiles: Arc<dyn ProfileStore>,
    pub directory: Arc<dyn CommunityDirectory>,
    pub clock: Arc<dyn Clock>,
    /// 历史拉取的页大小
    pub history_limit: usize,
}

/// 一个打开的社区聊天视图
pub struct CommunityChatSession {
    session: SessionContext,
    community_id: CommunityId,
    deps: CommunityChatDependencies,
    view: Arc<RwLock<Vec<CommunityMessageView>>>,
    open: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl CommunityChatSession {
    pub fn new(
        session: SessionContext,
        community_id: CommunityId,
        deps: CommunityChatDependencies,
    ) -> Self {
        Self {
            session,
            community_id,
            deps,
            view: Arc::new(RwLock::new(Vec::new())),
            open: Arc::new(AtomicBool::new(false)),
            task: Mutex::new(None),
        }
    }

    /// 打开社区视图：校验成员资格，先订阅再拉取最近一页历史，
    /// 批量取回作者资料后合并成展示行，最后启动事件循环。
    pub async fn open(&self) -> ApplicationResult<()> {
        self.ensure_member().await?;

        if self
            .open
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ApplicationError::validation("社区视图已打开"));
        }

        let events = self.deps.messages.subscribe();
        let history = match self
            .deps
            .messages
            .list_recent(self.community_id, self.deps.history_limit)
            .await
        {
            Ok(history) => history,
            Err(error) => {
                self.open.store(false, Ordering::SeqCst);
                return Err(error);
            }
        };

        let views = self.hydrate(history).await;
        *self.view.write().await = views;

        let handle = self.spawn_event_loop(events);
        *self.task.lock().await = Some(handle);

        info!(community = %self.community_id, "社区视图已同步");
        Ok(())
    }

    /// 把消息行与作者资料合并成展示行。资料缺失或查询失败时
    /// 用占位资料兜底，不让单个作者拖垮整页历史。
    async fn hydrate(&self, messages: Vec<CommunityMessage>) -> Vec<CommunityMessageView> {
        let author_ids: Vec<UserId> = messages
            .iter()
            .map(|m| m.author_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        let profiles = match self.deps.profiles.find_many(&author_ids).await {
            Ok(profiles) => profiles,
            Err(error) => {
                warn!(%error, "批量拉取作者资料失败，使用占位资料");
                Default::default()
            }
        };

        messages
            .into_iter()
            .map(|message| {
                let author = profiles
                    .get(&message.author_id)
                    .cloned()
                    .unwrap_or_else(|| UserProfile::unknown(message.author_id));
                CommunityMessageView::new(message, author)
            })
            .collect()
    }

    fn spawn_event_loop(
        &self,
        mut events: broadcast::Receiver<CommunityMessageEvent>,
    ) -> JoinHandle<()> {
        let view = self.view.clone();
        let open = self.open.clone();
        let community_id = self.community_id;
        let profiles = self.deps.profiles.clone();

        tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "社区订阅落后于消息事件流");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };

                if !open.load(Ordering::SeqCst) {
                    break;
                }

                match event {
                    CommunityMessageEvent::Inserted(message) => {
                        // 整张表的事件流，先核对社区归属
                        if message.community_id != community_id {
                            continue;
                        }

                        let author = match profiles.find(message.author_id).await {
                            Ok(Some(profile)) => profile,
                            Ok(None) => UserProfile::unknown(message.author_id),
                            Err(error) => {
                                warn!(%error, "拉取作者资料失败，使用占位资料");
                                UserProfile::unknown(message.author_id)
                            }
                        };

                        let mut view = view.write().await;
                        // 去重后追加尾部，不重新排序
                        if !view.iter().any(|v| v.id() == message.id) {
                            view.push(CommunityMessageView::new(message, author));
                        }
                    }
                    CommunityMessageEvent::Deleted {
                        community_id: deleted_community,
                        message_id,
                    } => {
                        if deleted_community != community_id {
                            continue;
                        }
                        // 删除对所有成员立即生效
                        view.write().await.retain(|v| v.id() != message_id);
                    }
                }
            }
        })
    }

    /// 发送社区消息。成员资格在发送时再校验一次：打开后被移出
    /// 社区的用户不能继续写入。本地不做乐观追加。
    pub async fn send(&self, content: impl Into<String>) -> ApplicationResult<()> {
        self.ensure_open()?;
        self.ensure_member().await?;

        let message = CommunityMessage::new(
            self.community_id,
            self.session.user_id(),
            content,
            self.deps.clock.now(),
        )?;
        self.deps.messages.insert(message).await?;
        Ok(())
    }

    /// 删除自己的一条消息：先本地移除，再执行对全体生效的硬删除。
    /// 只有作者可以删除。
    pub async fn delete(&self, id: MessageId) -> ApplicationResult<()> {
        self.ensure_open()?;

        let me = self.session.user_id();
        {
            let view = self.view.read().await;
            let target = view.iter().find(|v| v.id() == id).ok_or_else(|| {
                ApplicationError::not_found(format!("社区消息 {id} 不在当前视图中"))
            })?;
            if !target.message.is_authored_by(me) {
                return Err(DomainError::permission_denied("删除他人的社区消息").into());
            }
        }

        // 本地先行移除，随后的删除事件对本视图是幂等的
        self.view.write().await.retain(|v| v.id() != id);
        self.deps.messages.delete(id).await?;
        Ok(())
    }

    /// 当前视图的快照，时间升序
    pub async fn messages(&self) -> Vec<CommunityMessageView> {
        self.view.read().await.clone()
    }

    /// 关闭视图：撤掉订阅任务并清空本地状态
    pub async fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.lock().await.take() {
            task.abort();
        }
        self.view.write().await.clear();
        info!(community = %self.community_id, "社区视图已关闭");
    }

    fn ensure_open(&self) -> ApplicationResult<()> {
        if self.open.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ApplicationError::SessionClosed)
        }
    }

    async fn ensure_member(&self) -> ApplicationResult<()> {
        let is_member = self
            .deps
            .directory
            .is_member(self.community_id, self.session.user_id())
            .await?;
        if is_member {
            Ok(())
        } else {
            Err(ApplicationError::unauthorized("不是该社区的成员"))
        }
    }
}
