//! 集成测试共用辅助

use std::future::Future;

use config::AppConfig;
use infrastructure::LocalBackend;

pub fn backend() -> LocalBackend {
    LocalBackend::new(&AppConfig::default())
}

/// 轮询等待条件成立，到达上限仍不成立视为失败
pub async fn eventually<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..500 {
        if condition().await {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("条件在轮询上限内未满足");
}
