//! OpenAI 兼容 API 提供方
//!
//! 用 reqwest 直接 POST `{api_base}/chat/completions`，支持工具调用；适用于 OpenAI、DeepSeek、智谱、OpenRouter、自建代理等。
//! HTTP 401/403 视为鉴权失败，400/404/422 视为请求非法，其余非 2xx 为业务错误；连接层故障转为可重试的传输错误。

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::traits::{ChatOptions, LlmProvider, LlmResponse, TokenUsage, ToolDefinition};
use super::LlmError;
use crate::memory::{Message, ToolCall};

/// 错误响应体最多保留的字符数
const MAX_ERROR_BODY: usize = 500;

/// OpenAI 兼容提供方
pub struct OpenAiCompatProvider {
    name: String,
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    pub usage: TokenUsage,
}

impl OpenAiCompatProvider {
    pub fn new(
        name: impl Into<String>,
        api_base: &str,
        api_key: &str,
        request_timeout: Duration,
    ) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .connect_timeout(request_timeout.min(Duration::from_secs(30)))
            .build()
            .map_err(|e| LlmError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            name: name.into(),
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            usage: TokenUsage::new(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        model: &str,
        options: &ChatOptions,
    ) -> Result<LlmResponse, LlmError> {
        let request = build_request(messages, tools, model, options);
        tracing::debug!(provider = %self.name, model, messages = messages.len(), tools = tools.len(), "chat request");

        let mut builder = self.client.post(self.endpoint()).json(&request);
        if !self.api_key.is_empty() {
            builder = builder.bearer_auth(&self.api_key);
        }
        let response = builder.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status.as_u16(), &body));
        }

        let body: ChatCompletionResponse = response.json().await?;
        if let Some(usage) = &body.usage {
            self.usage.add(usage.prompt_tokens, usage.completion_tokens);
        }
        parse_response(body)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }
}

fn status_error(status: u16, body: &str) -> LlmError {
    let message: String = body.trim().chars().take(MAX_ERROR_BODY).collect();
    match status {
        401 | 403 => LlmError::Auth(message),
        400 | 404 | 422 => LlmError::InvalidRequest(message),
        _ => LlmError::Api { status, message },
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    kind: String,
    function: WireFunctionCall,
}

#[derive(Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    /// API 约定为 JSON 字符串
    #[serde(default)]
    arguments: String,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: &'a ToolDefinition,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

fn build_request<'a>(
    messages: &[Message],
    tools: &'a [ToolDefinition],
    model: &'a str,
    options: &ChatOptions,
) -> ChatCompletionRequest<'a> {
    ChatCompletionRequest {
        model,
        messages: messages.iter().map(to_wire_message).collect(),
        tools: tools
            .iter()
            .map(|t| WireTool {
                kind: "function",
                function: t,
            })
            .collect(),
        max_tokens: options.max_tokens,
        temperature: options.temperature,
    }
}

fn to_wire_message(m: &Message) -> WireMessage {
    WireMessage {
        role: m.role.as_str(),
        content: m.content.clone(),
        tool_calls: m
            .tool_calls
            .iter()
            .map(|c| WireToolCall {
                id: c.id.clone(),
                kind: function_type(),
                function: WireFunctionCall {
                    name: c.name.clone(),
                    arguments: c.arguments.to_string(),
                },
            })
            .collect(),
        tool_call_id: m.tool_call_id.clone(),
    }
}

/// 取首个 choice；工具参数在此处一次性解析为 JSON 值
fn parse_response(body: ChatCompletionResponse) -> Result<LlmResponse, LlmError> {
    let choice = body
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::InvalidResponse("response has no choices".to_string()))?;

    let tool_calls = choice
        .message
        .tool_calls
        .into_iter()
        .map(|c| ToolCall {
            id: c.id,
            name: c.function.name,
            arguments: parse_arguments(&c.function.arguments),
        })
        .collect();

    Ok(LlmResponse {
        content: choice.message.content.unwrap_or_default(),
        tool_calls,
    })
}

fn parse_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(Default::default());
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
