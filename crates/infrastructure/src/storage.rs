//! 内存对象存储适配器
//!
//! 把上传的对象保存在进程内，返回与真实对象存储同构的公开URL。
//! 用于本地演示和集成测试；带进度的上传按块写入并在块间让出，
//! 使中止能在传输中途生效。

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use application::media::{ObjectStorage, ProgressFn};
use application::ApplicationResult;

const CHUNK_BYTES: usize = 64 * 1024;

/// 进程内对象存储
pub struct MemoryObjectStorage {
    base_url: String,
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryObjectStorage {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            objects: RwLock::new(HashMap::new()),
        }
    }

    /// 对象是否存在（测试断言用）
    pub async fn contains(&self, bucket: &str, path: &str) -> bool {
        let objects = self.objects.read().await;
        objects.contains_key(&object_key(bucket, path))
    }

    /// 已存储的对象数量
    pub async fn object_count(&self) -> usize {
        self.objects.read().await.len()
    }

    async fn store(&self, bucket: &str, path: &str, content: Vec<u8>) -> String {
        let key = object_key(bucket, path);
        debug!(key = %key, bytes = content.len(), "写入对象");
        self.objects.write().await.insert(key, content);
        format!("{}/{bucket}/{path}", self.base_url)
    }
}

fn object_key(bucket: &str, path: &str) -> String {
    format!("{bucket}/{path}")
}

#[async_trait]
impl ObjectStorage for MemoryObjectStorage {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        content: Vec<u8>,
    ) -> ApplicationResult<String> {
        Ok(self.store(bucket, path, content).await)
    }

    async fn upload_with_progress(
        &self,
        bucket: &str,
        path: &str,
        content: Vec<u8>,
        on_progress: ProgressFn,
    ) -> ApplicationResult<String> {
        let total = content.len().max(1);
        let mut written = 0usize;

        // 按块推进，块间让出调度，进度在完整写入前不会到 100
        while written < content.len() {
            written = (written + CHUNK_BYTES).min(content.len());
            on_progress(((written * 100) / total) as u8);
            tokio::task::yield_now().await;
        }
        if content.is_empty() {
            on_progress(100);
        }

        Ok(self.store(bucket, path, content).await)
    }

    async fn delete(&self, bucket: &str, path: &str) -> ApplicationResult<()> {
        self.objects.write().await.remove(&object_key(bucket, path));
        Ok(())
    }
}
