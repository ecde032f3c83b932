//! 核心编排层：错误、重试、轮次阶段、会话锁、轮次调度、优雅关闭

pub mod error;
pub mod retry;
pub mod session_supervisor;
pub mod shutdown;
pub mod state;
pub mod task_scheduler;

pub use error::{AgentError, StoreError};
pub use retry::{retry_with_backoff, RetryConfig, RetryError, Retryable};
pub use session_supervisor::{SessionLocks, TurnGuard};
pub use shutdown::{
    CleanupReport, SessionFlush, ShutdownCleanup, ShutdownCoordinator, ShutdownManager, ShutdownReason,
};
pub use state::{PhaseTracker, TurnPhase};
pub use task_scheduler::TurnScheduler;
