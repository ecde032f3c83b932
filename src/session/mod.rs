//! 会话：每个 (channel, 对话) 一份持久状态
//!
//! - **Session**: 历史消息、滚动摘要、绑定的 Agent 名、时间戳
//! - **SessionStore**: 并发安全的 key -> Session 映射，按 key 落盘
//! - **persistence**: 文件名编码与原子写入

pub mod persistence;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::memory::Message;

pub use persistence::{session_file_name, SessionFiles};
pub use store::{SessionHandle, SessionStore};

/// 单个会话
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub key: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub summary: String,
    /// 粘性绑定的 Agent；空表示默认
    #[serde(default)]
    pub current_agent: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(key: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            key: key.into(),
            messages: Vec::new(),
            summary: String::new(),
            current_agent: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
