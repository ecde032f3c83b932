//! 并发会话存储
//!
//! 映射表用一把 RwLock 保护（只管成员增删），每个会话自带一把 Mutex 保护字段修改。
//! save 先在会话锁内克隆，再释放所有锁写文件，慢 I/O 不会阻塞其他会话。

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use super::persistence::SessionFiles;
use super::Session;
use crate::core::StoreError;
use crate::memory::Message;

/// 共享的单个会话
pub type SessionHandle = Arc<Mutex<Session>>;

/// 会话存储
pub struct SessionStore {
    sessions: RwLock<HashMap<String, SessionHandle>>,
    files: SessionFiles,
}

impl SessionStore {
    /// 打开会话目录并加载已有会话
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let files = SessionFiles::new(dir);
        let loaded = files.load_all().await?;
        tracing::info!(dir = %files.dir().display(), sessions = loaded.len(), "session store opened");

        let sessions = loaded
            .into_iter()
            .map(|s| (s.key.clone(), Arc::new(Mutex::new(s))))
            .collect();
        Ok(Self {
            sessions: RwLock::new(sessions),
            files,
        })
    }

    async fn get(&self, key: &str) -> Option<SessionHandle> {
        self.sessions.read().await.get(key).cloned()
    }

    /// 获取会话，不存在时创建
    pub async fn get_or_create(&self, key: &str) -> SessionHandle {
        if let Some(handle) = self.get(key).await {
            return handle;
        }
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(key.to_string())
            .or_insert_with(|| {
                tracing::debug!(session = key, "session created");
                Arc::new(Mutex::new(Session::new(key)))
            })
            .clone()
    }

    /// 在会话锁内执行 f（会话不存在时先创建）
    pub async fn with_session<F, R>(&self, key: &str, f: F) -> R
    where
        F: FnOnce(&mut Session) -> R,
    {
        let handle = self.get_or_create(key).await;
        let mut session = handle.lock().await;
        f(&mut session)
    }

    /// 绑定的 Agent 名；未知会话返回空串且不创建
    pub async fn get_current_agent(&self, key: &str) -> String {
        match self.get(key).await {
            Some(handle) => handle.lock().await.current_agent.clone(),
            None => String::new(),
        }
    }

    pub async fn set_current_agent(&self, key: &str, agent: &str) {
        self.with_session(key, |s| {
            s.current_agent = agent.to_string();
            s.touch();
        })
        .await;
    }

    pub async fn history(&self, key: &str) -> Vec<Message> {
        match self.get(key).await {
            Some(handle) => handle.lock().await.messages.clone(),
            None => Vec::new(),
        }
    }

    pub async fn summary(&self, key: &str) -> String {
        match self.get(key).await {
            Some(handle) => handle.lock().await.summary.clone(),
            None => String::new(),
        }
    }

    /// 一次追加多条消息（一轮对话的完整交换）
    pub async fn append_messages(&self, key: &str, messages: Vec<Message>) {
        self.with_session(key, |s| {
            s.messages.extend(messages);
            s.touch();
        })
        .await;
    }

    pub async fn set_summary(&self, key: &str, summary: &str) {
        self.with_session(key, |s| {
            s.summary = summary.to_string();
            s.touch();
        })
        .await;
    }

    /// 只保留最后 keep_last 条消息（外部压缩在写入摘要后调用）
    pub async fn truncate_history(&self, key: &str, keep_last: usize) {
        if let Some(handle) = self.get(key).await {
            let mut session = handle.lock().await;
            let len = session.messages.len();
            if len > keep_last {
                session.messages.drain(..len - keep_last);
                session.touch();
            }
        }
    }

    /// 会话的完整副本
    pub async fn snapshot(&self, key: &str) -> Option<Session> {
        match self.get(key).await {
            Some(handle) => Some(handle.lock().await.clone()),
            None => None,
        }
    }

    /// 把会话写入磁盘；未知会话什么也不做
    pub async fn save(&self, key: &str) -> Result<(), StoreError> {
        let Some(snapshot) = self.snapshot(key).await else {
            return Ok(());
        };
        self.files.write(&snapshot).await
    }

    /// 保存全部会话，返回写入数量；单个失败不影响其余，最后返回第一个错误
    pub async fn save_all(&self) -> Result<usize, StoreError> {
        let keys = self.keys().await;
        let mut saved = 0;
        let mut first_err = None;
        for key in keys {
            match self.save(&key).await {
                Ok(()) => saved += 1,
                Err(e) => {
                    tracing::error!(session = %key, error = %e, "failed to save session");
                    first_err.get_or_insert(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(saved),
        }
    }

    pub async fn keys(&self) -> Vec<String> {
        self.sessions.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
