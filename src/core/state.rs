//! 会话轮次阶段
//!
//! 每个会话在 Idle -> Resolving -> Invoking -> Persisting -> Idle 之间流转；
//! /agent 命令直接 Idle -> Responding -> Idle。阶段仅用于观测与日志，不参与调度。

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

/// 单个会话当前所处阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnPhase {
    #[default]
    Idle,
    /// 解析路由 / 会话绑定 / Profile
    Resolving,
    /// 调用模型（含工具循环）
    Invoking,
    /// 写回会话文件
    Persisting,
    /// 处理 /agent 命令
    Responding,
}

impl fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TurnPhase::Idle => "idle",
            TurnPhase::Resolving => "resolving",
            TurnPhase::Invoking => "invoking",
            TurnPhase::Persisting => "persisting",
            TurnPhase::Responding => "responding",
        };
        f.write_str(s)
    }
}

/// 各会话阶段的投影表；Idle 的会话不占条目
#[derive(Debug, Default)]
pub struct PhaseTracker {
    phases: Mutex<HashMap<String, TurnPhase>>,
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, session_key: &str, phase: TurnPhase) {
        let Ok(mut phases) = self.phases.lock() else {
            return;
        };
        let previous = if phase == TurnPhase::Idle {
            phases.remove(session_key)
        } else {
            phases.insert(session_key.to_string(), phase)
        };
        tracing::debug!(
            session = session_key,
            from = %previous.unwrap_or_default(),
            to = %phase,
            "turn phase"
        );
    }

    pub fn get(&self, session_key: &str) -> TurnPhase {
        self.phases
            .lock()
            .ok()
            .and_then(|p| p.get(session_key).copied())
            .unwrap_or_default()
    }

    /// 正在处理中的会话数
    pub fn busy_count(&self) -> usize {
        self.phases.lock().map(|p| p.len()).unwrap_or(0)
    }
}
