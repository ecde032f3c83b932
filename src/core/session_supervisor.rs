//! 会话监管：每个会话一把轮次锁
//!
//! 同一会话的两轮对话必须串行（上一轮写回完成后下一轮才能修改历史），不同会话之间互不阻塞。
//! 锁表本身用一把同步锁保护，只在取/建条目时短暂持有。
//! 一轮结束后调用 [`SessionLocks::release`]，无人持有或等待的条目被移除，锁表大小随活跃会话数而非历史会话数变化。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// 持有期间独占该会话的一轮处理
pub type TurnGuard = OwnedMutexGuard<()>;

/// 会话级轮次锁表
#[derive(Debug, Default)]
pub struct SessionLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, session_key: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks
            .entry(session_key.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// 等待并取得该会话的轮次锁
    pub async fn acquire(&self, session_key: &str) -> TurnGuard {
        self.entry(session_key).lock_owned().await
    }

    /// 释放轮次锁后调用：没有其他轮次持有或排队时移除条目
    ///
    /// 排队者在锁表锁内克隆了 Arc，因此引用计数为 1 即表示空闲。
    pub fn release(&self, session_key: &str) {
        let mut locks = match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if locks
            .get(session_key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(session_key);
        }
    }

    /// 当前锁表条目数
    pub fn len(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 不等待；会话正忙时返回 None
    pub fn try_acquire(&self, session_key: &str) -> Option<TurnGuard> {
        self.entry(session_key).try_lock_owned().ok()
    }
}
