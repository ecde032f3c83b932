//! LLM 层：Provider 抽象、错误分类、OpenAI 兼容实现、前缀路由、候选回退、脚本化 Mock

pub mod error;
pub mod fallback;
pub mod mock;
pub mod openai;
pub mod router;
pub mod traits;

pub use error::{classify_message, describe_network_error, LlmError, TransportErrorKind};
pub use fallback::{FallbackChain, ModelReply};
pub use mock::{RecordedCall, ScriptedProvider};
pub use openai::OpenAiCompatProvider;
pub use router::ProviderRouter;
pub use traits::{ChatOptions, LlmProvider, LlmResponse, TokenUsage, ToolDefinition};
