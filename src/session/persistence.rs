//! 会话文件持久化
//!
//! 每个会话一个 JSON 文件：`<dir>/<name>.json`。文件名中 ':' 写作 '_'（"telegram:123456" -> telegram_123456.json），
//! '_' '/' '\' '%' 按 `%XX` 转义，不同 key 不会落到同一个文件。
//! 写入先落到同目录的临时文件再 rename，读到一半的文件不会出现。损坏或无法解析的文件视为不存在。

use std::path::{Path, PathBuf};

use super::Session;
use crate::core::StoreError;

/// 由会话 key 得到文件名
pub fn session_file_name(key: &str) -> String {
    let mut name = String::with_capacity(key.len() + 5);
    for c in key.chars() {
        match c {
            ':' => name.push('_'),
            '_' => name.push_str("%5F"),
            '/' => name.push_str("%2F"),
            '\\' => name.push_str("%5C"),
            '%' => name.push_str("%25"),
            c => name.push(c),
        }
    }
    name.push_str(".json");
    name
}

/// 文件名主干还原为会话 key；转义不合法时返回 None
pub fn session_key_from_stem(stem: &str) -> Option<String> {
    let mut key = String::with_capacity(stem.len());
    let mut chars = stem.chars();
    while let Some(c) = chars.next() {
        match c {
            '_' => key.push(':'),
            '%' => {
                let code: String = chars.by_ref().take(2).collect();
                let decoded = match code.as_str() {
                    "5F" => '_',
                    "2F" => '/',
                    "5C" => '\\',
                    "25" => '%',
                    _ => return None,
                };
                key.push(decoded);
            }
            c => key.push(c),
        }
    }
    Some(key)
}

/// 会话目录
#[derive(Debug, Clone)]
pub struct SessionFiles {
    dir: PathBuf,
}

impl SessionFiles {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(session_file_name(key))
    }

    /// 读取目录下全部会话；目录不存在时创建并返回空
    pub async fn load_all(&self) -> Result<Vec<Session>, StoreError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StoreError::io(&self.dir, e))?;

        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| StoreError::io(&self.dir, e))?;

        let mut sessions = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::io(&self.dir, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(session) = Self::read_one(&path).await {
                sessions.push(session);
            }
        }
        Ok(sessions)
    }

    async fn read_one(path: &Path) -> Option<Session> {
        let data = match tokio::fs::read_to_string(path).await {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable session file");
                return None;
            }
        };
        match serde_json::from_str::<Session>(&data) {
            Ok(mut session) => {
                if session.key.is_empty() {
                    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
                    match session_key_from_stem(stem) {
                        Some(key) => session.key = key,
                        None => {
                            tracing::warn!(path = %path.display(), "skipping session file with no key");
                            return None;
                        }
                    }
                }
                Some(session)
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping corrupt session file");
                None
            }
        }
    }

    /// 原子写入一个会话
    pub async fn write(&self, session: &Session) -> Result<(), StoreError> {
        let data = serde_json::to_vec_pretty(session)?;
        let path = self.path_for(&session.key);
        let tmp = self.dir.join(format!(
            ".{}.{}.tmp",
            session_file_name(&session.key),
            uuid::Uuid::new_v4().simple()
        ));

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StoreError::io(&self.dir, e))?;
        tokio::fs::write(&tmp, &data)
            .await
            .map_err(|e| StoreError::io(&tmp, e))?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(StoreError::io(&path, e));
        }
        Ok(())
    }
}
