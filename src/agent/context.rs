//! 上下文构建：system + 历史 + 本轮用户消息
//!
//! 结果恰好以一条 system 消息开头、以最新的 user 消息结尾；历史里残留的 system 消息会被丢弃。

use chrono::Local;

use crate::memory::{Message, Role};

/// 构建一轮上下文所需的数据
#[derive(Debug, Clone, Default)]
pub struct ContextData {
    pub history: Vec<Message>,
    pub summary: String,
    pub user_message: String,
    pub media: Vec<String>,
    pub channel: String,
    pub chat_id: String,
    /// Profile 的 system_prompt
    pub system_prompt: Option<String>,
    pub workspace: String,
}

/// 上下文构建器
pub trait ContextBuilder: Send + Sync {
    fn build_messages(&self, data: &ContextData) -> Vec<Message>;
}

/// 默认构建器：基础提示词 + Agent 提示词 + 会话信息 + 摘要
#[derive(Debug, Clone)]
pub struct DefaultContextBuilder {
    base_prompt: String,
}

impl DefaultContextBuilder {
    pub fn new(base_prompt: impl Into<String>) -> Self {
        Self {
            base_prompt: base_prompt.into(),
        }
    }

    fn system_prompt(&self, data: &ContextData) -> String {
        let mut sections = vec![self.base_prompt.trim().to_string()];

        if let Some(prompt) = data.system_prompt.as_deref().filter(|p| !p.trim().is_empty()) {
            sections.push(prompt.trim().to_string());
        }

        sections.push(format!(
            "## Runtime\nCurrent Time: {}\nWorkspace: {}",
            Local::now().format("%Y-%m-%d %H:%M (%A)"),
            data.workspace
        ));

        if !data.channel.is_empty() {
            sections.push(format!(
                "## Current Session\nChannel: {}\nChat ID: {}",
                data.channel, data.chat_id
            ));
        }

        if !data.summary.trim().is_empty() {
            sections.push(format!(
                "## Summary of Previous Conversation\n{}",
                data.summary.trim()
            ));
        }

        sections.retain(|s| !s.is_empty());
        sections.join("\n\n")
    }
}

impl Default for DefaultContextBuilder {
    fn default() -> Self {
        Self::new("You are Bee, a helpful AI assistant.")
    }
}

impl ContextBuilder for DefaultContextBuilder {
    fn build_messages(&self, data: &ContextData) -> Vec<Message> {
        let mut messages = Vec::with_capacity(data.history.len() + 2);
        messages.push(Message::system(self.system_prompt(data)));
        messages.extend(data.history.iter().filter(|m| m.role != Role::System).cloned());
        messages.push(Message::user(user_content(&data.user_message, &data.media)));
        messages
    }
}

/// 附件引用追加在用户文本之后
pub fn user_content(text: &str, media: &[String]) -> String {
    if media.is_empty() {
        return text.to_string();
    }
    format!("{}\n\n[Attached media: {}]", text, media.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_first_user_last() {
        let builder = DefaultContextBuilder::default();
        let data = ContextData {
            history: vec![
                Message::system("stale"),
                Message::user("Hello"),
                Message::assistant("Hi there!"),
            ],
            summary: "Previous summary".into(),
            user_message: "New message".into(),
            media: vec!["test.jpg".into()],
            channel: "test-channel".into(),
            chat_id: "123".into(),
            system_prompt: Some("Custom system prompt".into()),
            workspace: "/tmp/ws".into(),
        };

        let messages = builder.build_messages(&data);
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages.iter().filter(|m| m.role == Role::System).count(), 1);

        let system = &messages[0].content;
        assert!(system.contains("Custom system prompt"));
        assert!(system.contains("Current Session"));
        assert!(system.contains("Previous summary"));
        assert!(system.contains("/tmp/ws"));

        let last = messages.last().unwrap();
        assert_eq!(last.role, Role::User);
        assert!(last.content.starts_with("New message"));
        assert!(last.content.contains("test.jpg"));
    }

    #[test]
    fn test_empty_history() {
        let messages = DefaultContextBuilder::new("base").build_messages(&ContextData {
            user_message: "hi".into(),
            ..ContextData::default()
        });
        assert_eq!(messages.len(), 2);
        assert!(!messages[0].content.contains("Current Session"));
        assert_eq!(messages[1].content, "hi");
    }
}
