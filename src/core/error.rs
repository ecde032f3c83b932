//! 编排层错误类型
//!
//! 配置类错误（切换到不存在的 Agent）同步返回给发起用户；模型调用失败在所有候选耗尽后才成为轮次错误；
//! 持久化错误只上报，不回滚内存中的会话。

use thiserror::Error;

use crate::llm::LlmError;

/// 一轮对话中可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    /// 当前 Profile 没有任何候选模型
    #[error("no model configured for agent '{0}'")]
    NoModelConfigured(String),

    /// 所有候选模型都失败；last 为最后一个候选的错误
    #[error("all {tried} model candidates failed, last error: {last}")]
    AllCandidatesFailed { tried: usize, last: LlmError },

    /// 外部取消或关闭信号
    #[error("turn cancelled")]
    Cancelled,

    /// /agent switch 到未注册的名字
    #[error("Agent '{0}' does not exist")]
    UnknownAgent(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Persistence(#[from] StoreError),
}

/// 会话存储错误
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("session I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("session serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl StoreError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}
