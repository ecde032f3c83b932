//! 编排器：主循环、/agent 命令、上下文构建

pub mod commands;
pub mod context;
pub mod loop_;

pub use commands::{AgentCommand, AgentInfo};
pub use context::{ContextBuilder, ContextData, DefaultContextBuilder};
pub use loop_::{AgentLoop, EMPTY_RESPONSE_NOTICE, ITERATION_LIMIT_NOTICE};
