//! 优雅关闭
//!
//! 根 CancellationToken 由 ShutdownManager 持有，入站消费、轮次调度、重试等待都监听它的子 token。
//! 关闭时先停止接收新消息，再由 ShutdownCoordinator 依次执行清理（如刷写全部会话文件）。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use super::AgentError;
use crate::session::SessionStore;

/// 关闭信号管理器
#[derive(Clone)]
pub struct ShutdownManager {
    shutdown_token: CancellationToken,
    reason_tx: broadcast::Sender<ShutdownReason>,
}

/// 关闭原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Ctrl+C 或输入流结束
    UserInitiated,
    /// SIGTERM
    Signal,
    FatalError(String),
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (reason_tx, _) = broadcast::channel(1);
        Self {
            shutdown_token: CancellationToken::new(),
            reason_tx,
        }
    }

    /// 根 token 的子 token；取消子 token 不会影响根
    pub fn token(&self) -> CancellationToken {
        self.shutdown_token.child_token()
    }

    pub fn shutdown(&self, reason: ShutdownReason) {
        tracing::info!(reason = ?reason, "shutdown requested");
        let _ = self.reason_tx.send(reason);
        self.shutdown_token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownReason> {
        self.reason_tx.subscribe()
    }

    pub async fn wait_for_shutdown(&self) {
        self.shutdown_token.cancelled().await;
    }

    /// 安装 Ctrl+C / SIGTERM 处理
    pub fn install_signal_handlers(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
                manager.shutdown(ShutdownReason::UserInitiated);
            }
        });

        #[cfg(unix)]
        {
            let manager = Arc::clone(self);
            tokio::spawn(async move {
                use tokio::signal::unix::{signal, SignalKind};
                if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                    sigterm.recv().await;
                    tracing::info!("Received SIGTERM, initiating graceful shutdown...");
                    manager.shutdown(ShutdownReason::Signal);
                }
            });
        }
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

/// 关闭时执行的清理步骤
#[async_trait::async_trait]
pub trait ShutdownCleanup: Send + Sync {
    async fn cleanup(&self) -> Result<(), AgentError>;

    fn name(&self) -> &'static str;
}

/// 一次清理的结果统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub completed: usize,
    pub failed: usize,
    pub timed_out: usize,
}

/// 按注册顺序执行清理，每步有独立超时；某一步失败不影响后续步骤
pub struct ShutdownCoordinator {
    steps: Vec<Box<dyn ShutdownCleanup>>,
    step_timeout: Duration,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            step_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.step_timeout = Duration::from_secs(secs);
        self
    }

    pub fn register<T: ShutdownCleanup + 'static>(&mut self, step: T) {
        self.steps.push(Box::new(step));
    }

    pub async fn run_cleanup(&self) -> CleanupReport {
        tracing::info!(steps = self.steps.len(), "running shutdown cleanup");
        let mut report = CleanupReport::default();

        for step in &self.steps {
            let name = step.name();
            match tokio::time::timeout(self.step_timeout, step.cleanup()).await {
                Ok(Ok(())) => {
                    report.completed += 1;
                    tracing::info!(step = name, "cleanup step done");
                }
                Ok(Err(e)) => {
                    report.failed += 1;
                    tracing::error!(step = name, error = %e, "cleanup step failed");
                }
                Err(_) => {
                    report.timed_out += 1;
                    tracing::warn!(
                        step = name,
                        timeout_secs = self.step_timeout.as_secs(),
                        "cleanup step timed out"
                    );
                }
            }
        }
        report
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// 退出前把所有会话写回磁盘
pub struct SessionFlush {
    store: Arc<SessionStore>,
}

impl SessionFlush {
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl ShutdownCleanup for SessionFlush {
    async fn cleanup(&self) -> Result<(), AgentError> {
        let saved = self.store.save_all().await?;
        tracing::info!(saved, "sessions flushed");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "session_flush"
    }
}
