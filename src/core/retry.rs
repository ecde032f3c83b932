//! 指数退避重试
//!
//! retry_with_backoff 执行一个异步操作：成功立即返回；可重试错误按当前等待时长休眠后重试，
//! 每次等待翻倍并以 max_wait 封顶；致命错误立即返回；取消令牌在等待或调用期间触发时立即中止，
//! 返回与网络错误区分开的 Cancelled。

use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// 错误是否值得重试（临时性网络故障）
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// 重试配置（对应 config 的 [retry] 段）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// 总尝试次数（含首次），最少 1
    pub max_attempts: u32,
    #[serde(rename = "initial_wait_ms", with = "millis")]
    pub initial_wait: Duration,
    #[serde(rename = "max_wait_ms", with = "millis")]
    pub max_wait: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_wait: Duration::from_secs(1),
            max_wait: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// 依次返回每次重试前的等待时长（共 max_attempts - 1 个）
    pub fn backoff_schedule(&self) -> Vec<Duration> {
        let mut waits = Vec::new();
        let mut wait = self.initial_wait.min(self.max_wait);
        for _ in 1..self.max_attempts.max(1) {
            waits.push(wait);
            wait = (wait * 2).min(self.max_wait);
        }
        waits
    }
}

/// 重试失败的三种结局
#[derive(Error, Debug)]
pub enum RetryError<E: std::error::Error + 'static> {
    /// 不可重试的错误，未再尝试
    #[error(transparent)]
    Fatal(E),

    /// 用尽尝试次数
    #[error("failed after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: E,
    },

    /// 外部取消（等待或调用期间）
    #[error("cancelled during retry after {attempts} attempts")]
    Cancelled { attempts: u32 },
}

impl<E: std::error::Error + 'static> RetryError<E> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetryError::Cancelled { .. })
    }

    /// 最后一次失败的底层错误（取消时没有）
    pub fn last_error(&self) -> Option<&E> {
        match self {
            RetryError::Fatal(e) => Some(e),
            RetryError::Exhausted { last, .. } => Some(last),
            RetryError::Cancelled { .. } => None,
        }
    }

    pub fn into_last_error(self) -> Option<E> {
        match self {
            RetryError::Fatal(e) => Some(e),
            RetryError::Exhausted { last, .. } => Some(last),
            RetryError::Cancelled { .. } => None,
        }
    }
}

/// 带指数退避执行 operation
pub async fn retry_with_backoff<T, E, F, Fut>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::error::Error + Retryable + 'static,
{
    let max_attempts = config.max_attempts.max(1);
    let mut wait = config.initial_wait.min(config.max_wait);
    let mut attempt = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled { attempts: attempt });
        }
        attempt += 1;

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RetryError::Cancelled { attempts: attempt }),
            result = operation() => result,
        };

        let err = match result {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !err.is_retryable() {
            return Err(RetryError::Fatal(err));
        }
        if attempt >= max_attempts {
            return Err(RetryError::Exhausted {
                attempts: attempt,
                last: err,
            });
        }

        tracing::warn!(
            attempt,
            max_attempts,
            wait_ms = wait.as_millis() as u64,
            error = %err,
            "retryable failure, backing off"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RetryError::Cancelled { attempts: attempt }),
            _ = tokio::time::sleep(wait) => {}
        }
        wait = (wait * 2).min(config.max_wait);
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
