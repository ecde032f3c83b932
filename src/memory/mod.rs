//! 对话消息：会话历史与模型调用共用的消息结构

pub mod conversation;

pub use conversation::{Message, Role, ToolCall};
