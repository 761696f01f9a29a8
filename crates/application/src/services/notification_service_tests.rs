//! 已读对账与通知聚合单元测试

#[cfg(test)]
mod notification_service_tests {
    use std::sync::Arc;

    use chrono::Utc;
    use uuid::Uuid;

    use domain::{DirectMessage, FriendRequest, FriendRequestStatus, UserId};

    use crate::services::test_support::eventually;
    use crate::services::{NotificationService, ReadStateReconciler};
    use crate::session::SessionContext;
    use crate::store::memory::{MemoryDirectMessageStore, MemoryFriendRequestStore};
    use crate::store::DirectMessageStore;

    struct Fixture {
        messages: Arc<MemoryDirectMessageStore>,
        requests: Arc<MemoryFriendRequestStore>,
        reconciler: Arc<ReadStateReconciler>,
    }

    impl Fixture {
        fn new() -> Self {
            let messages = Arc::new(MemoryDirectMessageStore::new(64));
            let reconciler = Arc::new(ReadStateReconciler::new(
                messages.clone() as Arc<dyn DirectMessageStore>
            ));
            Self {
                messages,
                requests: Arc::new(MemoryFriendRequestStore::new(64)),
                reconciler,
            }
        }

        fn service_for(&self, user_id: UserId) -> NotificationService {
            NotificationService::new(
                SessionContext::new(user_id),
                self.messages.clone(),
                self.requests.clone(),
                self.reconciler.clone(),
            )
        }
    }

    fn users() -> (UserId, UserId) {
        (UserId::from(Uuid::new_v4()), UserId::from(Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_summary_counts_requests_and_unread() {
        let fixture = Fixture::new();
        let (me, friend) = users();

        for i in 0..2 {
            let message =
                DirectMessage::new_text(friend, me, format!("m{i}"), Utc::now()).unwrap();
            fixture.messages.insert(message).await.unwrap();
        }
        fixture
            .requests
            .insert(FriendRequest::new(friend, me, Utc::now()))
            .await;

        let summary = fixture.service_for(me).summary().await.unwrap();
        assert_eq!(summary.pending_requests, 1);
        assert_eq!(summary.unread_messages, 2);
        assert_eq!(summary.total(), 3);
    }

    #[tokio::test]
    async fn test_watch_tracks_message_and_request_changes() {
        let fixture = Fixture::new();
        let (me, friend) = users();
        let service = fixture.service_for(me);

        let watch = service.watch().await.unwrap();
        assert!(watch.latest().is_empty());

        let message = DirectMessage::new_text(friend, me, "oi", Utc::now()).unwrap();
        fixture.messages.insert(message).await.unwrap();
        eventually(|| async { watch.latest().unread_messages == 1 }).await;

        let request = FriendRequest::new(friend, me, Utc::now());
        let request_id = request.id;
        fixture.requests.insert(request).await;
        eventually(|| async { watch.latest().pending_requests == 1 }).await;

        // 请求被接受后从通知数中消失
        fixture
            .requests
            .set_status(request_id, FriendRequestStatus::Accepted)
            .await;
        eventually(|| async { watch.latest().pending_requests == 0 }).await;

        watch.close();
    }

    #[tokio::test]
    async fn test_watch_ignores_events_for_others() {
        let fixture = Fixture::new();
        let (me, friend) = users();
        let bystander = UserId::from(Uuid::new_v4());
        let service = fixture.service_for(me);

        let watch = service.watch().await.unwrap();

        let message = DirectMessage::new_text(friend, bystander, "oi", Utc::now()).unwrap();
        fixture.messages.insert(message).await.unwrap();
        fixture
            .requests
            .insert(FriendRequest::new(friend, bystander, Utc::now()))
            .await;

        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        assert!(watch.latest().is_empty());
        watch.close();
    }

    #[tokio::test]
    async fn test_mark_read_is_idempotent_and_clears_count() {
        let fixture = Fixture::new();
        let (me, friend) = users();

        let message = DirectMessage::new_text(friend, me, "oi", Utc::now()).unwrap();
        fixture.messages.insert(message).await.unwrap();

        assert_eq!(
            fixture
                .reconciler
                .mark_conversation_read(me, friend)
                .await
                .unwrap(),
            1
        );
        // 第二次对账更新 0 条，通知数不变
        assert_eq!(
            fixture
                .reconciler
                .mark_conversation_read(me, friend)
                .await
                .unwrap(),
            0
        );
        assert_eq!(fixture.messages.count_unread(me).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_open_notification_returns_key_and_marks_read() {
        let fixture = Fixture::new();
        let (me, friend) = users();
        let service = fixture.service_for(me);

        let message = DirectMessage::new_text(friend, me, "oi", Utc::now()).unwrap();
        fixture.messages.insert(message.clone()).await.unwrap();

        let key = service.open_message_notification(&message).unwrap();
        assert!(key.contains(me));
        assert!(key.contains(friend));

        // 已读写入不阻塞跳转，但最终会清零未读
        eventually(|| async { fixture.messages.count_unread(me).await.unwrap() == 0 }).await;
    }

    #[tokio::test]
    async fn test_open_notification_rejects_foreign_message() {
        let fixture = Fixture::new();
        let (me, friend) = users();
        let bystander = UserId::from(Uuid::new_v4());
        let service = fixture.service_for(me);

        let message = DirectMessage::new_text(friend, bystander, "oi", Utc::now()).unwrap();
        assert!(service.open_message_notification(&message).is_err());
    }
}
