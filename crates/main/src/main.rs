//! 主应用程序入口
//!
//! 用本地后端跑一段脚本化的双人会话，演示私聊同步、打字指示、
//! 通知聚合、社区广播和媒体附件的完整闭环。

use std::env;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use application::{AttachmentUpload, SessionContext, SystemClock, VoiceRecorder};
use config::AppConfig;
use domain::{CommunityId, UserId, UserProfile};
use infrastructure::{LocalBackend, NullAudioCapture};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 读取配置：默认值 + 可选 YAML + APP_ 环境变量
    let config_path = env::var("APP_CONFIG").ok();
    let config = AppConfig::load(config_path.as_deref())?;
    tracing::info!(
        typing_idle_ms = config.chat.typing_idle_ms,
        bucket = %config.media.bucket,
        "配置已加载"
    );

    let backend = LocalBackend::new(&config);

    // 两个演示用户
    let ana = UserId::from(Uuid::new_v4());
    let bia = UserId::from(Uuid::new_v4());
    backend.profiles.upsert(UserProfile::new(ana, "Ana")).await;
    backend.profiles.upsert(UserProfile::new(bia, "Bia")).await;

    direct_chat_demo(&backend, ana, bia).await?;
    community_demo(&backend, ana, bia).await?;
    media_demo(&backend, ana, bia).await?;

    tracing::info!("演示结束");
    Ok(())
}

/// 私聊：打字指示、发送、已读对账和通知数
async fn direct_chat_demo(backend: &LocalBackend, ana: UserId, bia: UserId) -> anyhow::Result<()> {
    let session_ana = backend.direct_session(ana, bia);
    let session_bia = backend.direct_session(bia, ana);
    session_ana.open().await?;
    session_bia.open().await?;

    let notifications = backend.notifications(bia);
    let mut watch = notifications.watch().await?;

    session_ana.keystroke().await;
    session_ana.send("oi").await?;

    let summary = watch.changed().await?;
    tracing::info!(unread = summary.unread_messages, "Bia 的通知数已更新");

    // 等消息通过订阅回声进入双方视图
    while session_bia.visible_messages().await.is_empty() {
        tokio::task::yield_now().await;
    }
    let inbound = session_bia.visible_messages().await.remove(0);
    tracing::info!(content = %inbound.content, "Bia 收到消息");

    session_bia.set_reply_target(inbound.id).await;
    session_bia.send("tudo bem?").await?;

    while session_ana.visible_messages().await.len() < 2 {
        tokio::task::yield_now().await;
    }
    let reply = session_ana.visible_messages().await.remove(1);
    tracing::info!(
        content = %reply.content,
        quoted = ?session_ana.reply_preview(&reply).await,
        "Ana 收到回复"
    );

    watch.close();
    session_ana.close().await;
    session_bia.close().await;
    Ok(())
}

/// 社区：两份视图在插入与删除上收敛
async fn community_demo(backend: &LocalBackend, ana: UserId, bia: UserId) -> anyhow::Result<()> {
    let community = CommunityId::from(Uuid::new_v4());
    backend.directory.add_member(community, ana).await;
    backend.directory.add_member(community, bia).await;

    let session_ana = backend.community_session(ana, community);
    let session_bia = backend.community_session(bia, community);
    session_ana.open().await?;
    session_bia.open().await?;

    session_ana.send("hello").await?;
    while session_bia.messages().await.is_empty() {
        tokio::task::yield_now().await;
    }
    let seen = session_bia.messages().await.remove(0);
    tracing::info!(author = %seen.author.display_name, content = %seen.message.content, "社区消息已送达");

    session_ana.delete(seen.id()).await?;
    while !session_bia.messages().await.is_empty() {
        tokio::task::yield_now().await;
    }
    tracing::info!("删除已传播到所有成员视图");

    session_ana.close().await;
    session_bia.close().await;
    Ok(())
}

/// 媒体：语音录制走附件管线，作为媒体消息送达
async fn media_demo(backend: &LocalBackend, ana: UserId, bia: UserId) -> anyhow::Result<()> {
    let session_ana = backend.direct_session(ana, bia);
    let session_bia = backend.direct_session(bia, ana);
    session_ana.open().await?;
    session_bia.open().await?;

    let mut recorder = VoiceRecorder::new(Arc::new(SystemClock));
    recorder.start(Box::new(NullAudioCapture::new()))?;
    recorder.push_chunk(vec![0u8; 4096])?;
    let voice = recorder.stop()?;

    let prepared = backend
        .media
        .prepare_attachment(&SessionContext::new(ana), voice)
        .await?;
    session_ana.send_attachment(prepared).await?;

    let image = AttachmentUpload::new("praia.png", "image/png", vec![0u8; 2048]);
    let prepared = backend
        .media
        .prepare_attachment(&SessionContext::new(ana), image)
        .await?;
    session_ana.send_attachment(prepared).await?;

    while session_bia.visible_messages().await.len() < 2 {
        tokio::task::yield_now().await;
    }
    for message in session_bia.visible_messages().await {
        let media = message.media.as_ref().map(|m| m.url.clone());
        tracing::info!(caption = %message.content, url = ?media, "Bia 收到媒体消息");
    }

    session_ana.close().await;
    session_bia.close().await;
    Ok(())
}
