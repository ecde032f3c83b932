//! 按 provider 前缀路由模型调用
//!
//! 模型标识 "provider/model"：前缀是已注册的 provider 时，去掉前缀交给它；
//! 否则（无前缀或前缀未知，如 OpenRouter 的 "meta-llama/llama-3"）原样交给默认 provider。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::traits::{ChatOptions, LlmProvider, LlmResponse, ToolDefinition};
use super::LlmError;
use crate::memory::Message;

/// provider 名 -> 实现
pub struct ProviderRouter {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    default_provider: Option<String>,
}

impl ProviderRouter {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: None,
        }
    }

    /// 注册 provider；第一个注册的自动成为默认
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn LlmProvider>) {
        let name = name.into();
        if self.default_provider.is_none() {
            self.default_provider = Some(name.clone());
        }
        self.providers.insert(name, provider);
    }

    pub fn set_default(&mut self, name: impl Into<String>) {
        self.default_provider = Some(name.into());
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    /// 选出处理该模型的 provider 与实际传给它的模型名
    pub fn select<'m>(&self, model: &'m str) -> Result<(&Arc<dyn LlmProvider>, &'m str), LlmError> {
        if let Some((prefix, rest)) = model.split_once('/') {
            if let Some(provider) = self.providers.get(prefix) {
                return Ok((provider, rest));
            }
        }
        self.default_provider
            .as_ref()
            .and_then(|name| self.providers.get(name))
            .map(|provider| (provider, model))
            .ok_or_else(|| LlmError::UnknownModel(model.to_string()))
    }
}

impl Default for ProviderRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for ProviderRouter {
    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        model: &str,
        options: &ChatOptions,
    ) -> Result<LlmResponse, LlmError> {
        let (provider, model_name) = self.select(model)?;
        provider.chat(messages, tools, model_name, options).await
    }

    fn name(&self) -> &str {
        "router"
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.providers
            .values()
            .map(|p| p.token_usage())
            .fold((0, 0, 0), |acc, (a, b, c)| (acc.0 + a, acc.1 + b, acc.2 + c))
    }
}
