//! `/agent` 命令
//!
//! 以 /agent 开头的消息在调用模型之前被拦截；无法识别的子命令也算已处理，只回复提示。

use std::fmt::Write;

use crate::agents::{AgentProfile, BindingSource};

pub const COMMAND_PREFIX: &str = "/agent";

/// 解析后的命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentCommand {
    List,
    /// 缺少名字时为 None
    Switch(Option<String>),
    Info,
    Help,
    Unknown(String),
}

impl AgentCommand {
    /// 不是 /agent 命令时返回 None
    pub fn parse(content: &str) -> Option<Self> {
        let content = content.trim();
        let rest = content.strip_prefix(COMMAND_PREFIX)?;
        if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
            return None;
        }

        let mut parts = rest.split_whitespace();
        let command = match parts.next() {
            None | Some("help") => AgentCommand::Help,
            Some("list") => AgentCommand::List,
            Some("info") => AgentCommand::Info,
            Some("switch") => AgentCommand::Switch(parts.next().map(str::to_string)),
            Some(other) => AgentCommand::Unknown(other.to_string()),
        };
        Some(command)
    }
}

/// 当前会话生效的 Agent 配置
#[derive(Debug, Clone, PartialEq)]
pub struct AgentInfo {
    pub profile: AgentProfile,
    pub source: BindingSource,
}

pub fn render_list(names: &[String], current: &str) -> String {
    let mut out = String::from("Available agents:");
    for name in names {
        if name == current {
            let _ = write!(out, "\n  - {} (current)", name);
        } else {
            let _ = write!(out, "\n  - {}", name);
        }
    }
    out
}

pub fn render_info(info: &AgentInfo) -> String {
    let p = &info.profile;
    let mut out = format!("Current Agent: {}", p.name);
    let _ = write!(out, "\nBound by: {}", info.source);
    let _ = write!(
        out,
        "\nModel: {}",
        if p.model.is_empty() { "(none)" } else { p.model.as_str() }
    );
    if p.candidates.len() > 1 {
        let _ = write!(out, "\nFallback models: {}", p.candidates[1..].join(", "));
    }
    let _ = write!(out, "\nTemperature: {}", p.temperature);
    let _ = write!(out, "\nMax tokens: {}", p.max_tokens);
    let _ = write!(out, "\nMax tool iterations: {}", p.max_tool_iterations);
    let _ = write!(out, "\nWorkspace: {}", p.workspace);
    let _ = write!(out, "\nRestrict to workspace: {}", p.restrict_to_workspace);
    if p.allowed_tools.is_empty() {
        out.push_str("\nAllowed tools: all");
    } else {
        let _ = write!(out, "\nAllowed tools: {}", p.allowed_tools.join(", "));
    }
    out
}

pub fn render_help() -> String {
    [
        "Agent Commands:",
        "  /agent list            - list available agents",
        "  /agent switch <name>   - switch this conversation to another agent",
        "  /agent info            - show the current agent's configuration",
        "  /agent help            - show this help",
    ]
    .join("\n")
}

pub fn render_unknown(sub: &str) -> String {
    format!("Unknown command: {}\n\n{}", sub, render_help())
}

pub fn render_switch_usage() -> String {
    "Usage: /agent switch <name>".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(AgentCommand::parse("Hello world"), None);
        assert_eq!(AgentCommand::parse("/agents"), None);
        assert_eq!(AgentCommand::parse("/agent"), Some(AgentCommand::Help));
        assert_eq!(AgentCommand::parse("  /agent list "), Some(AgentCommand::List));
        assert_eq!(
            AgentCommand::parse("/agent switch coder"),
            Some(AgentCommand::Switch(Some("coder".into())))
        );
        assert_eq!(AgentCommand::parse("/agent switch"), Some(AgentCommand::Switch(None)));
        assert_eq!(
            AgentCommand::parse("/agent unknown"),
            Some(AgentCommand::Unknown("unknown".into()))
        );
    }

    #[test]
    fn test_render_list_marks_current() {
        let names = vec!["default".to_string(), "coder".to_string()];
        let text = render_list(&names, "coder");
        assert!(text.starts_with("Available agents:"));
        assert!(text.contains("- coder (current)"));
        assert!(text.contains("- default\n") || text.ends_with("- default"));
    }

    #[test]
    fn test_unknown_includes_help() {
        let text = render_unknown("frobnicate");
        assert!(text.starts_with("Unknown command: frobnicate"));
        assert!(text.contains("Agent Commands"));
    }
}
