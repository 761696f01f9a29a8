//! 服务测试的共用辅助

use std::future::Future;

/// 轮询等待条件成立。订阅循环在 current_thread 测试运行时里
/// 只需要让出调度即可推进，到达轮询上限仍不成立就视为失败。
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
