//! 在线打字状态通道与跟踪器
//!
//! 打字状态走独立的临时广播通道，不经过会话存储、不持久化。
//! 本地用户每次按键立即广播 `typing: true`，并重置一个空闲计时器；
//! 计时器到期（无新按键）广播 `typing: false`；发送消息前强制广播
//! `typing: false`，保证对方的指示器及时清除。
//!
//! 对端展示的值就是对方最后一次广播：这里不做心跳过期兜底，
//! 对方崩溃时指示器可能停留在 true（纯广播式在线状态的已知局限）。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::warn;

use domain::{PresenceRecord, UserId};

use crate::clock::Clock;
use crate::error::ApplicationResult;

/// 临时在线状态通道
pub trait PresenceChannel: Send + Sync {
    /// 广播本地临时状态
    fn track(&self, record: PresenceRecord) -> ApplicationResult<()>;

    /// 订阅通道内所有参与者的状态
    fn subscribe(&self) -> broadcast::Receiver<PresenceRecord>;
}

/// 本地打字状态跟踪器
///
/// 每个打开的会话持有一个；`shutdown` 在会话关闭时取消挂起的
/// 空闲计时器，避免关闭后还有迟到的广播。
pub struct TypingTracker {
    channel: Arc<dyn PresenceChannel>,
    clock: Arc<dyn Clock>,
    user_id: UserId,
    idle: Duration,
    idle_task: Mutex<Option<JoinHandle<()>>>,
}

impl TypingTracker {
    pub fn new(
        channel: Arc<dyn PresenceChannel>,
        clock: Arc<dyn Clock>,
        user_id: UserId,
        idle: Duration,
    ) -> Self {
        Self {
            channel,
            clock,
            user_id,
            idle,
            idle_task: Mutex::new(None),
        }
    }

    /// 撰写框每次按键调用：立即广播 typing=true 并重置空闲计时器
    pub async fn keystroke(&self) {
        self.broadcast(true);

        let channel = self.channel.clone();
        let clock = self.clock.clone();
        let user_id = self.user_id;
        let idle = self.idle;

        let mut task = self.idle_task.lock().await;
        if let Some(previous) = task.take() {
            previous.abort();
        }
        *task = Some(tokio::spawn(async move {
            tokio::time::sleep(idle).await;
            if let Err(error) = channel.track(PresenceRecord::new(user_id, false, clock.now())) {
                warn!(%error, "广播打字状态失败");
            }
        }));
    }

    /// 发送消息前调用：取消计时器并立即广播 typing=false
    pub async fn notify_send(&self) {
        let mut task = self.idle_task.lock().await;
        if let Some(previous) = task.take() {
            previous.abort();
        }
        drop(task);

        self.broadcast(false);
    }

    /// 会话关闭时调用：取消挂起的计时器
    pub async fn shutdown(&self) {
        let mut task = self.idle_task.lock().await;
        if let Some(previous) = task.take() {
            previous.abort();
        }
    }

    fn broadcast(&self, typing: bool) {
        let record = PresenceRecord::new(self.user_id, typing, self.clock.now());
        // 在线状态是尽力而为的，失败只记日志
        if let Err(error) = self.channel.track(record) {
            warn!(%error, "广播打字状态失败");
        }
    }
}

/// 本地广播实现的在线状态通道
pub mod local {
    use super::*;

    /// 单进程内的临时状态通道
    pub struct LocalPresenceChannel {
        sender: broadcast::Sender<PresenceRecord>,
    }

    impl LocalPresenceChannel {
        pub fn new(capacity: usize) -> Self {
            let (sender, _) = broadcast::channel(capacity);
            Self { sender }
        }
    }

    impl PresenceChannel for LocalPresenceChannel {
        fn track(&self, record: PresenceRecord) -> ApplicationResult<()> {
            // 没有订阅者不算失败
            let _ = self.sender.send(record);
            Ok(())
        }

        fn subscribe(&self) -> broadcast::Receiver<PresenceRecord> {
            self.sender.subscribe()
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::Instant;
    use uuid::Uuid;

    use super::local::LocalPresenceChannel;
    use super::*;
    use crate::clock::SystemClock;

    const IDLE: Duration = Duration::from_millis(2000);

    fn tracker(channel: &Arc<LocalPresenceChannel>) -> (TypingTracker, UserId) {
        let user_id = UserId::from(Uuid::new_v4());
        let tracker = TypingTracker::new(
            channel.clone() as Arc<dyn PresenceChannel>,
            Arc::new(SystemClock),
            user_id,
            IDLE,
        );
        (tracker, user_id)
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_expiry_broadcasts_false() {
        let channel = Arc::new(LocalPresenceChannel::new(16));
        let mut events = channel.subscribe();
        let (tracker, user_id) = tracker(&channel);

        tracker.keystroke().await;

        let first = events.recv().await.unwrap();
        assert_eq!(first.user_id, user_id);
        assert!(first.typing);

        let started = Instant::now();
        let second = events.recv().await.unwrap();
        assert!(!second.typing);
        assert!(started.elapsed() >= IDLE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_keystroke_resets_idle_timer() {
        let channel = Arc::new(LocalPresenceChannel::new(16));
        let mut events = channel.subscribe();
        let (tracker, _) = tracker(&channel);

        tracker.keystroke().await;
        assert!(events.recv().await.unwrap().typing);

        tokio::time::advance(Duration::from_millis(1000)).await;
        tracker.keystroke().await;
        assert!(events.recv().await.unwrap().typing);

        // false 只在第二次按键的完整空闲期之后出现
        let restarted = Instant::now();
        let expiry = events.recv().await.unwrap();
        assert!(!expiry.typing);
        assert!(restarted.elapsed() >= IDLE);
        // 第一次按键的计时器已被取消，不会有第二个 false
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_forces_immediate_false() {
        let channel = Arc::new(LocalPresenceChannel::new(16));
        let mut events = channel.subscribe();
        let (tracker, _) = tracker(&channel);

        tracker.keystroke().await;
        assert!(events.recv().await.unwrap().typing);

        let started = Instant::now();
        tracker.notify_send().await;
        let cleared = events.recv().await.unwrap();
        assert!(!cleared.typing);
        // 不等待空闲计时器
        assert!(started.elapsed() < IDLE);

        // 计时器已取消，之后不再有广播
        tokio::time::advance(IDLE + Duration::from_millis(100)).await;
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_pending_timer() {
        let channel = Arc::new(LocalPresenceChannel::new(16));
        let mut events = channel.subscribe();
        let (tracker, _) = tracker(&channel);

        tracker.keystroke().await;
        assert!(events.recv().await.unwrap().typing);

        tracker.shutdown().await;
        tokio::time::advance(IDLE + Duration::from_millis(100)).await;
        assert!(events.try_recv().is_err());
    }
}
