//! 脚本化 Provider（测试与无 API Key 时的离线回退）
//!
//! 按顺序弹出预置的响应或错误；脚本用完后回显最后一条 User 消息。每次调用都会记录模型名与消息，便于断言。

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::traits::{ChatOptions, LlmProvider, LlmResponse, ToolDefinition};
use super::LlmError;
use crate::memory::{Message, Role, ToolCall};

/// 一次被记录的调用
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub model: String,
    pub messages: Vec<Message>,
    pub tools: Vec<String>,
}

/// 脚本化 Provider
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    name: String,
    script: Mutex<VecDeque<Result<LlmResponse, LlmError>>>,
    calls: Mutex<Vec<RecordedCall>>,
    latency: Option<Duration>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::named("scripted")
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// 每次调用先等待一段时间，模拟网络耗时
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn push(&self, step: Result<LlmResponse, LlmError>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(step);
        }
    }

    pub fn push_response(&self, response: LlmResponse) -> &Self {
        self.push(Ok(response));
        self
    }

    pub fn push_text(&self, text: &str) -> &Self {
        self.push_response(LlmResponse::text(text))
    }

    /// 预置一次工具调用响应；调用 ID 按顺序生成
    pub fn push_tool_call(&self, tool: &str, arguments: Value) -> &Self {
        let id = format!("call_{}", self.pending() + self.call_count() + 1);
        self.push_response(LlmResponse::with_tool_calls(
            "",
            vec![ToolCall {
                id,
                name: tool.to_string(),
                arguments,
            }],
        ))
    }

    pub fn push_error(&self, err: LlmError) -> &Self {
        self.push(Err(err));
        self
    }

    pub fn pending(&self) -> usize {
        self.script.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn models_called(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.model).collect()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        model: &str,
        _options: &ChatOptions,
    ) -> Result<LlmResponse, LlmError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                model: model.to_string(),
                messages: messages.to_vec(),
                tools: tools.iter().map(|t| t.name.clone()).collect(),
            });
        }

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let step = self.script.lock().ok().and_then(|mut s| s.pop_front());
        match step {
            Some(step) => step,
            None => {
                let last_user = messages
                    .iter()
                    .rev()
                    .find(|m| m.role == Role::User)
                    .map(|m| m.content.as_str())
                    .unwrap_or("(no input)");
                Ok(LlmResponse::text(format!("Echo: {}", last_user)))
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
