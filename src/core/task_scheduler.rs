//! 轮次调度：限制同时在途的对话轮数
//!
//! 每条入站消息在派发前先取得一个许可，许可随处理任务结束释放；Semaphore 保证跨会话并行但总量受限。

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

/// 轮次调度器
#[derive(Debug, Clone)]
pub struct TurnScheduler {
    permits: Arc<Semaphore>,
    max_concurrent: usize,
}

impl TurnScheduler {
    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    /// 获取一个轮次许可；取消时返回 None
    pub async fn acquire(&self, cancel: &CancellationToken) -> Option<OwnedSemaphorePermit> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            permit = self.permits.clone().acquire_owned() => permit.ok(),
        }
    }

    /// 当前在途轮数
    pub fn in_flight(&self) -> usize {
        self.max_concurrent - self.permits.available_permits()
    }
}

impl Default for TurnScheduler {
    fn default() -> Self {
        Self::new(10)
    }
}
