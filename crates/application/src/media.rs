//! 媒体附件管线
//!
//! 负责把图片、视频、音频附加到待发送的消息上：大小验证在任何
//! 上传调用之前完成，按 MIME 前缀分类，上传路径用发送者标识加
//! 时间戳做命名空间避免冲突。录音走同一条验证/上传路径。

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::debug;

use domain::{MediaKind, MessageMedia, UserId};

use crate::clock::Clock;
use crate::error::{ApplicationError, ApplicationResult};
use crate::session::SessionContext;

/// 上传进度回调（0..=100 的百分比）
pub type ProgressFn = Box<dyn Fn(u8) + Send + Sync>;

/// 对象存储协作方
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// 上传并返回持久的公开URL
    async fn upload(&self, bucket: &str, path: &str, content: Vec<u8>)
        -> ApplicationResult<String>;

    /// 带进度上报的上传
    async fn upload_with_progress(
        &self,
        bucket: &str,
        path: &str,
        content: Vec<u8>,
        on_progress: ProgressFn,
    ) -> ApplicationResult<String>;

    async fn delete(&self, bucket: &str, path: &str) -> ApplicationResult<()>;
}

/// 待上传的附件内容
#[derive(Debug, Clone)]
pub struct AttachmentUpload {
    pub filename: String,
    pub mime_type: String,
    pub content: Vec<u8>,
}

impl AttachmentUpload {
    pub fn new(
        filename: impl Into<String>,
        mime_type: impl Into<String>,
        content: Vec<u8>,
    ) -> Self {
        Self {
            filename: filename.into(),
            mime_type: mime_type.into(),
            content,
        }
    }

    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }
}

/// 上传完成的附件：媒体描述加上占位文案
#[derive(Debug, Clone)]
pub struct PreparedAttachment {
    pub media: MessageMedia,
    pub caption: String,
}

/// 媒体附件管线
pub struct MediaAttachmentPipeline {
    storage: Arc<dyn ObjectStorage>,
    clock: Arc<dyn Clock>,
    bucket: String,
    attachment_max_bytes: u64,
    image_max_bytes: u64,
}

impl MediaAttachmentPipeline {
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        clock: Arc<dyn Clock>,
        bucket: impl Into<String>,
        attachment_max_bytes: u64,
        image_max_bytes: u64,
    ) -> Self {
        Self {
            storage,
            clock,
            bucket: bucket.into(),
            attachment_max_bytes,
            image_max_bytes,
        }
    }

    /// 验证并上传聊天附件，产出可附加到消息上的媒体描述。
    /// 超过大小上限的文件在发起任何上传调用之前被拒绝。
    pub async fn prepare_attachment(
        &self,
        session: &SessionContext,
        upload: AttachmentUpload,
    ) -> ApplicationResult<PreparedAttachment> {
        self.check_attachment_size(&upload)?;

        let kind = MediaKind::from_mime(&upload.mime_type);
        let path = self.object_path(session.user_id(), &upload.filename);

        debug!(path = %path, kind = %kind, size = upload.size(), "上传聊天附件");
        let url = self
            .storage
            .upload(&self.bucket, &path, upload.content)
            .await?;

        let media = MessageMedia::new(url, kind)?;
        let caption = kind.placeholder_caption().to_owned();
        Ok(PreparedAttachment { media, caption })
    }

    /// 带进度上报的附件上传，返回可中止的任务句柄
    pub fn start_attachment_upload(
        self: &Arc<Self>,
        session: &SessionContext,
        upload: AttachmentUpload,
    ) -> ApplicationResult<UploadTask> {
        self.check_attachment_size(&upload)?;

        let kind = MediaKind::from_mime(&upload.mime_type);
        let path = self.object_path(session.user_id(), &upload.filename);
        let progress = Arc::new(AtomicU8::new(0));

        let pipeline = self.clone();
        let reporter = progress.clone();
        let handle = tokio::spawn(async move {
            let on_progress: ProgressFn = Box::new(move |percent| {
                reporter.store(percent.min(100), Ordering::SeqCst);
            });

            let url = pipeline
                .storage
                .upload_with_progress(&pipeline.bucket, &path, upload.content, on_progress)
                .await?;

            let media = MessageMedia::new(url, kind)?;
            let caption = kind.placeholder_caption().to_owned();
            Ok(PreparedAttachment { media, caption })
        });

        Ok(UploadTask { handle, progress })
    }

    /// 纯图片资源（缩略图等）的上传路径，上限更低（5MB）
    pub async fn upload_image_asset(
        &self,
        session: &SessionContext,
        upload: AttachmentUpload,
    ) -> ApplicationResult<String> {
        if !upload.mime_type.starts_with("image/") {
            return Err(ApplicationError::validation("只接受图片文件"));
        }

        if upload.size() > self.image_max_bytes {
            return Err(ApplicationError::validation(format!(
                "图片大小超过上限 {} 字节",
                self.image_max_bytes
            )));
        }

        let path = self.object_path(session.user_id(), &upload.filename);
        self.storage.upload(&self.bucket, &path, upload.content).await
    }

    fn check_attachment_size(&self, upload: &AttachmentUpload) -> ApplicationResult<()> {
        if upload.size() > self.attachment_max_bytes {
            return Err(ApplicationError::validation(format!(
                "附件大小超过上限 {} 字节",
                self.attachment_max_bytes
            )));
        }
        Ok(())
    }

    /// 用发送者标识加毫秒时间戳做命名空间，避免路径冲突
    fn object_path(&self, sender: UserId, filename: &str) -> String {
        let ts = self.clock.now().timestamp_millis();
        format!("{sender}/{ts}_{filename}")
    }
}

/// 进行中的附件上传任务
pub struct UploadTask {
    handle: JoinHandle<ApplicationResult<PreparedAttachment>>,
    progress: Arc<AtomicU8>,
}

impl UploadTask {
    /// 当前进度百分比
    pub fn progress(&self) -> u8 {
        self.progress.load(Ordering::SeqCst)
    }

    /// 中止传输并把进度重置为零
    pub fn abort(&self) {
        self.handle.abort();
        self.progress.store(0, Ordering::SeqCst);
    }

    /// 等待上传完成
    pub async fn wait(self) -> ApplicationResult<PreparedAttachment> {
        match self.handle.await {
            Ok(result) => result,
            Err(join_error) if join_error.is_cancelled() => {
                Err(ApplicationError::storage("上传已中止"))
            }
            Err(join_error) => Err(ApplicationError::storage(join_error.to_string())),
        }
    }
}

/// 麦克风采集流协作方。`release` 必须在停止或取消时调用，
/// 否则设备锁会泄漏。
pub trait AudioCapture: Send {
    fn release(&mut self);
}

struct ActiveRecording {
    capture: Box<dyn AudioCapture>,
    chunks: Vec<Vec<u8>>,
}

/// 语音录制状态机
///
/// 每个打开的会话同一时刻至多一段录音；录音产出的音频走与
/// 文件附件相同的验证/上传路径。
pub struct VoiceRecorder {
    clock: Arc<dyn Clock>,
    active: Option<ActiveRecording>,
}

impl VoiceRecorder {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            active: None,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    /// 开始录音。已有录音进行中时拒绝（不支持并发录音）。
    pub fn start(&mut self, capture: Box<dyn AudioCapture>) -> ApplicationResult<()> {
        if self.active.is_some() {
            return Err(ApplicationError::recording("已有录音进行中"));
        }

        self.active = Some(ActiveRecording {
            capture,
            chunks: Vec::new(),
        });
        Ok(())
    }

    /// 追加一段采集到的音频数据
    pub fn push_chunk(&mut self, chunk: Vec<u8>) -> ApplicationResult<()> {
        let recording = self
            .active
            .as_mut()
            .ok_or_else(|| ApplicationError::recording("没有进行中的录音"))?;
        recording.chunks.push(chunk);
        Ok(())
    }

    /// 停止录音：拼装音频、释放采集流，返回可走附件管线的内容
    pub fn stop(&mut self) -> ApplicationResult<AttachmentUpload> {
        let mut recording = self
            .active
            .take()
            .ok_or_else(|| ApplicationError::recording("没有进行中的录音"))?;

        let content: Vec<u8> = recording.chunks.concat();
        recording.capture.release();

        let ts = self.clock.now().timestamp_millis();
        Ok(AttachmentUpload::new(
            format!("voice_{ts}.webm"),
            "audio/webm",
            content,
        ))
    }

    /// 取消录音：释放采集流并丢弃已累积的数据，不产生任何上传
    pub fn cancel(&mut self) {
        if let Some(mut recording) = self.active.take() {
            recording.capture.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::sync::Mutex;

    use uuid::Uuid;

    use super::*;
    use crate::clock::SystemClock;

    const MB: u64 = 1024 * 1024;

    /// 记录上传调用的假对象存储
    #[derive(Default)]
    struct FakeStorage {
        uploads: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ObjectStorage for FakeStorage {
        async fn upload(
            &self,
            bucket: &str,
            path: &str,
            _content: Vec<u8>,
        ) -> ApplicationResult<String> {
            self.uploads.lock().unwrap().push(path.to_owned());
            Ok(format!("https://storage.local/{bucket}/{path}"))
        }

        async fn upload_with_progress(
            &self,
            bucket: &str,
            path: &str,
            content: Vec<u8>,
            on_progress: ProgressFn,
        ) -> ApplicationResult<String> {
            for percent in 1..=100u8 {
                on_progress(percent);
                tokio::task::yield_now().await;
            }
            self.upload(bucket, path, content).await
        }

        async fn delete(&self, _bucket: &str, _path: &str) -> ApplicationResult<()> {
            Ok(())
        }
    }

    fn pipeline(storage: Arc<FakeStorage>) -> Arc<MediaAttachmentPipeline> {
        Arc::new(MediaAttachmentPipeline::new(
            storage,
            Arc::new(SystemClock),
            "chat-media",
            50 * MB,
            5 * MB,
        ))
    }

    fn session() -> SessionContext {
        SessionContext::new(UserId::from(Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_oversized_attachment_rejected_before_upload() {
        let storage = Arc::new(FakeStorage::default());
        let pipeline = pipeline(storage.clone());

        let upload = AttachmentUpload::new(
            "big.mp4",
            "video/mp4",
            vec![0u8; (50 * MB + 1) as usize],
        );
        let result = pipeline.prepare_attachment(&session(), upload).await;

        assert!(matches!(result, Err(ApplicationError::Validation(_))));
        // 没有发起任何上传调用
        assert!(storage.uploads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_oversized_image_asset_rejected_before_upload() {
        let storage = Arc::new(FakeStorage::default());
        let pipeline = pipeline(storage.clone());

        let upload =
            AttachmentUpload::new("thumb.png", "image/png", vec![0u8; (5 * MB + 1) as usize]);
        let result = pipeline.upload_image_asset(&session(), upload).await;

        assert!(matches!(result, Err(ApplicationError::Validation(_))));
        assert!(storage.uploads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_attachment_classified_and_namespaced() {
        let storage = Arc::new(FakeStorage::default());
        let pipeline = pipeline(storage.clone());
        let session = session();

        let upload = AttachmentUpload::new("note.webm", "audio/webm", vec![1, 2, 3]);
        let prepared = pipeline.prepare_attachment(&session, upload).await.unwrap();

        assert_eq!(prepared.media.kind, MediaKind::Audio);
        assert_eq!(prepared.caption, "voice message");

        let uploads = storage.uploads.lock().unwrap();
        assert_eq!(uploads.len(), 1);
        // 路径以发送者标识开头，文件名保留在末尾
        assert!(uploads[0].starts_with(&session.user_id().to_string()));
        assert!(uploads[0].ends_with("_note.webm"));
    }

    #[tokio::test]
    async fn test_unknown_mime_falls_back_to_file() {
        let storage = Arc::new(FakeStorage::default());
        let pipeline = pipeline(storage);

        let upload = AttachmentUpload::new("doc.pdf", "application/pdf", vec![0u8; 128]);
        let prepared = pipeline
            .prepare_attachment(&session(), upload)
            .await
            .unwrap();

        assert_eq!(prepared.media.kind, MediaKind::File);
        assert_eq!(prepared.caption, "file");
    }

    #[tokio::test]
    async fn test_upload_task_reports_progress_and_completes() {
        let storage = Arc::new(FakeStorage::default());
        let pipeline = pipeline(storage);

        let upload = AttachmentUpload::new("pic.png", "image/png", vec![0u8; 1024]);
        let task = pipeline
            .start_attachment_upload(&session(), upload)
            .unwrap();

        let prepared = task.wait().await.unwrap();
        assert_eq!(prepared.media.kind, MediaKind::Image);
    }

    #[tokio::test]
    async fn test_abort_resets_progress_to_zero() {
        let storage = Arc::new(FakeStorage::default());
        let pipeline = pipeline(storage);

        let upload = AttachmentUpload::new("clip.mp4", "video/mp4", vec![0u8; 1024]);
        let task = pipeline
            .start_attachment_upload(&session(), upload)
            .unwrap();

        // 让上传跑起来一段
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        task.abort();
        assert_eq!(task.progress(), 0);
        assert!(matches!(
            task.wait().await,
            Err(ApplicationError::Storage(_))
        ));
    }

    /// 释放标记可观察的假采集流
    struct FakeCapture {
        released: Arc<AtomicBool>,
    }

    impl AudioCapture for FakeCapture {
        fn release(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    fn capture() -> (Box<FakeCapture>, Arc<AtomicBool>) {
        let released = Arc::new(AtomicBool::new(false));
        (
            Box::new(FakeCapture {
                released: released.clone(),
            }),
            released,
        )
    }

    #[test]
    fn test_recorder_rejects_concurrent_recording() {
        let mut recorder = VoiceRecorder::new(Arc::new(SystemClock));
        let (first, _) = capture();
        let (second, _) = capture();

        recorder.start(first).unwrap();
        assert!(matches!(
            recorder.start(second),
            Err(ApplicationError::Recording(_))
        ));
    }

    #[test]
    fn test_recorder_stop_assembles_chunks_and_releases() {
        let mut recorder = VoiceRecorder::new(Arc::new(SystemClock));
        let (stream, released) = capture();

        recorder.start(stream).unwrap();
        recorder.push_chunk(vec![1, 2]).unwrap();
        recorder.push_chunk(vec![3]).unwrap();

        let upload = recorder.stop().unwrap();
        assert_eq!(upload.content, vec![1, 2, 3]);
        assert_eq!(upload.mime_type, "audio/webm");
        assert!(upload.filename.starts_with("voice_"));
        assert!(released.load(Ordering::SeqCst));
        assert!(!recorder.is_recording());
    }

    #[test]
    fn test_recorder_cancel_releases_and_discards() {
        let mut recorder = VoiceRecorder::new(Arc::new(SystemClock));
        let (stream, released) = capture();

        recorder.start(stream).unwrap();
        recorder.push_chunk(vec![1, 2, 3]).unwrap();
        recorder.cancel();

        // 采集流已释放，数据被丢弃，没有可上传的内容
        assert!(released.load(Ordering::SeqCst));
        assert!(!recorder.is_recording());
        assert!(matches!(
            recorder.stop(),
            Err(ApplicationError::Recording(_))
        ));
    }
}
