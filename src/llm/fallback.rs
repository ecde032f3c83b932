//! 候选模型回退
//!
//! 依次尝试 Profile 的候选模型：每个候选都包在 retry_with_backoff 里。
//! 致命错误或重试耗尽则换下一个候选；取消立即返回；全部候选失败才是本轮失败。

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::traits::{ChatOptions, LlmProvider, LlmResponse, ToolDefinition};
use crate::agents::AgentProfile;
use crate::core::{retry_with_backoff, AgentError, RetryConfig, RetryError};
use crate::memory::Message;

/// 成功的调用及实际使用的模型
#[derive(Debug, Clone)]
pub struct ModelReply {
    pub response: LlmResponse,
    pub model: String,
}

/// 带重试的候选回退执行器
#[derive(Clone)]
pub struct FallbackChain {
    provider: Arc<dyn LlmProvider>,
    retry: RetryConfig,
}

impl FallbackChain {
    pub fn new(provider: Arc<dyn LlmProvider>, retry: RetryConfig) -> Self {
        Self { provider, retry }
    }

    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }

    pub async fn chat(
        &self,
        profile: &AgentProfile,
        messages: &[Message],
        tools: &[ToolDefinition],
        cancel: &CancellationToken,
    ) -> Result<ModelReply, AgentError> {
        if profile.candidates.is_empty() {
            return Err(AgentError::NoModelConfigured(profile.name.clone()));
        }

        let options = ChatOptions {
            max_tokens: profile.max_tokens,
            temperature: profile.temperature,
        };
        let mut last = None;

        for (index, model) in profile.candidates.iter().enumerate() {
            let result = retry_with_backoff(&self.retry, cancel, || {
                self.provider.chat(messages, tools, model, &options)
            })
            .await;

            let err = match result {
                Ok(response) => {
                    if index > 0 {
                        tracing::info!(agent = %profile.name, model = %model, "fallback candidate succeeded");
                    }
                    return Ok(ModelReply {
                        response,
                        model: model.clone(),
                    });
                }
                Err(RetryError::Cancelled { attempts }) => {
                    tracing::info!(agent = %profile.name, model = %model, attempts, "model call cancelled");
                    return Err(AgentError::Cancelled);
                }
                Err(err) => err,
            };

            let next = profile.candidates.get(index + 1);
            tracing::warn!(
                agent = %profile.name,
                model = %model,
                next = next.map(String::as_str).unwrap_or("none"),
                error = %err,
                "model candidate failed"
            );
            last = err.into_last_error();
        }

        match last {
            Some(last) => Err(AgentError::AllCandidatesFailed {
                tried: profile.candidates.len(),
                last,
            }),
            None => Err(AgentError::Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::agents::{AgentDefaults, ModelSpec};
    use crate::llm::{LlmError, ScriptedProvider, TransportErrorKind};

    fn profile(candidates: &[(&str, &str)]) -> AgentProfile {
        AgentProfile::from_defaults(&AgentDefaults {
            model: String::new(),
            models: candidates.iter().map(|(p, m)| ModelSpec::new(*p, *m)).collect(),
            ..AgentDefaults::default()
        })
    }

    fn fast_retry(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_wait: Duration::from_millis(10),
            max_wait: Duration::from_millis(40),
        }
    }

    fn refused() -> LlmError {
        LlmError::transport(TransportErrorKind::ConnectionRefused, "connection refused")
    }

    #[tokio::test]
    async fn test_fatal_error_advances_to_next_candidate() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_error(LlmError::Auth("bad key".into())).push_text("from b");
        let chain = FallbackChain::new(provider.clone(), fast_retry(3));

        let reply = chain
            .chat(&profile(&[("a", "one"), ("b", "two")]), &[Message::user("hi")], &[], &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(reply.model, "b/two");
        assert_eq!(reply.response.content, "from b");
        assert_eq!(provider.models_called(), vec!["a/one", "b/two"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_retry_same_candidate() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_error(refused()).push_error(refused()).push_text("ok");
        let chain = FallbackChain::new(provider.clone(), fast_retry(3));

        let reply = chain
            .chat(&profile(&[("a", "one"), ("b", "two")]), &[Message::user("hi")], &[], &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(reply.model, "a/one");
        assert_eq!(provider.models_called(), vec!["a/one", "a/one", "a/one"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_candidates_failed() {
        let provider = Arc::new(ScriptedProvider::new());
        provider
            .push_error(refused())
            .push_error(refused())
            .push_error(LlmError::InvalidRequest("bad".into()));
        let chain = FallbackChain::new(provider.clone(), fast_retry(2));

        let err = chain
            .chat(&profile(&[("a", "one"), ("b", "two")]), &[Message::user("hi")], &[], &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            AgentError::AllCandidatesFailed { tried, last } => {
                assert_eq!(tried, 2);
                assert!(matches!(last, LlmError::InvalidRequest(_)));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn test_no_candidates() {
        let chain = FallbackChain::new(Arc::new(ScriptedProvider::new()), fast_retry(1));
        let err = chain
            .chat(&profile(&[]), &[Message::user("hi")], &[], &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::NoModelConfigured(_)));
    }

    #[tokio::test]
    async fn test_cancelled_does_not_fall_back() {
        let provider = Arc::new(ScriptedProvider::new());
        let chain = FallbackChain::new(provider.clone(), fast_retry(3));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = chain
            .chat(&profile(&[("a", "one"), ("b", "two")]), &[Message::user("hi")], &[], &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
        assert_eq!(provider.call_count(), 0);
    }
}
