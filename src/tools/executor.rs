//! 工具执行器
//!
//! 持有 ToolRegistry 与单次调用超时，execute 在超时内调用 registry.execute；
//! 失败或超时不会中断本轮，而是变成 is_error 的工具结果交回模型。每次调用输出结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::time::timeout;

use crate::llm::ToolDefinition;
use crate::tools::ToolRegistry;

/// 一次工具调用的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutcome {
    pub content: String,
    pub is_error: bool,
}

impl ToolOutcome {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: format!("Error: {}", message.into()),
            is_error: true,
        }
    }
}

/// 工具执行器：对每次调用施加超时
pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs.max(1)),
        }
    }

    pub async fn execute(&self, tool_name: &str, args: Value) -> ToolOutcome {
        let start = Instant::now();
        let args_preview = args_preview(&args);
        let result = timeout(self.timeout, self.registry.execute(tool_name, args)).await;

        let (ok, outcome): (bool, &str) = match &result {
            Ok(Ok(_)) => (true, "ok"),
            Ok(Err(_)) => (false, "error"),
            Err(_) => (false, "timeout"),
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": duration_ms,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match result {
            Ok(Ok(content)) => ToolOutcome::ok(content),
            Ok(Err(e)) => ToolOutcome::error(e),
            Err(_) => ToolOutcome::error(format!(
                "tool {} timed out after {}s",
                tool_name,
                self.timeout.as_secs()
            )),
        }
    }

    pub fn definitions(&self, allowed: &[String]) -> Vec<ToolDefinition> {
        self.registry.definitions(allowed)
    }

    /// 已注册的工具名，按字母序
    pub fn tool_names(&self) -> Vec<String> {
        let mut names = self.registry.tool_names();
        names.sort();
        names
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{EchoTool, Tool};
    use async_trait::async_trait;
    use serde_json::json;

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }

        fn description(&self) -> &str {
            "Sleeps for a minute"
        }

        async fn execute(&self, _args: Value) -> Result<String, String> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("done".into())
        }
    }

    fn executor() -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        registry.register(SlowTool);
        ToolExecutor::new(registry, 2)
    }

    #[tokio::test]
    async fn test_success_and_failure_outcomes() {
        let executor = executor();
        assert_eq!(executor.execute("echo", json!({"text": "hi"})).await, ToolOutcome::ok("hi"));

        let missing = executor.execute("nope", json!({})).await;
        assert!(missing.is_error);
        assert_eq!(missing.content, "Error: Unknown tool: nope");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_becomes_error_outcome() {
        let outcome = executor().execute("slow", json!({})).await;
        assert!(outcome.is_error);
        assert!(outcome.content.contains("timed out after 2s"));
    }

    #[test]
    fn test_tool_names_sorted() {
        assert_eq!(executor().tool_names(), vec!["echo", "slow"]);
    }

    #[test]
    fn test_args_preview_truncates() {
        let long = json!({"text": "x".repeat(500)});
        assert!(args_preview(&long).ends_with("..."));
        assert_eq!(args_preview(&json!({"a": 1})), r#"{"a":1}"#);
    }
}
