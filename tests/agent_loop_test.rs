//! 总线 -> Agent 主循环 -> 会话存储 集成测试

use std::sync::Arc;
use std::time::Duration;

use bee_relay::agent::AgentLoop;
use bee_relay::agents::{AgentsConfig, ProfileConfig, ProfileResolver};
use bee_relay::bus::{InboundMessage, MessageBus};
use bee_relay::core::{RetryConfig, ShutdownManager, ShutdownReason};
use bee_relay::llm::{FallbackChain, ScriptedProvider};
use bee_relay::memory::Role;
use bee_relay::session::SessionStore;
use bee_relay::tools::{EchoTool, ToolExecutor, ToolRegistry};
use serde_json::json;
use tokio::time::timeout;

fn agents() -> AgentsConfig {
    let mut agents = AgentsConfig::default();
    agents.profiles.insert(
        "coder".into(),
        ProfileConfig {
            model: "claude-opus".into(),
            temperature: 0.2,
            ..ProfileConfig::default()
        },
    );
    agents
}

async fn build(dir: &std::path::Path, provider: Arc<ScriptedProvider>, bus: Arc<MessageBus>) -> Arc<AgentLoop> {
    let store = Arc::new(SessionStore::open(dir).await.unwrap());
    let mut registry = ToolRegistry::new();
    registry.register(EchoTool);
    Arc::new(AgentLoop::new(
        bus,
        store,
        Arc::new(ProfileResolver::new(agents())),
        FallbackChain::new(provider, RetryConfig::default()),
        Arc::new(ToolExecutor::new(registry, 5)),
    ))
}

#[tokio::test]
async fn test_bus_round_trip_persists_across_restart() {
    let dir = tempfile::tempdir().unwrap();
    let bus = Arc::new(MessageBus::default());
    let mut replies = bus.subscribe_outbound("telegram");

    let provider = Arc::new(ScriptedProvider::new());
    provider
        .push_tool_call("echo", json!({"text": "pong"}))
        .push_text("the tool said pong");

    let agent = build(dir.path(), provider.clone(), Arc::clone(&bus)).await;
    let shutdown = ShutdownManager::new();
    let handle = tokio::spawn(Arc::clone(&agent).run(shutdown.token()));

    bus.publish_inbound(InboundMessage::new("telegram", "42", "chat-1", "/agent switch coder"))
        .await
        .unwrap();
    let reply = timeout(Duration::from_secs(5), replies.recv()).await.unwrap().unwrap();
    assert_eq!(reply.chat_id, "chat-1");
    assert!(reply.content.starts_with("Switched to 'coder'"));

    bus.publish_inbound(InboundMessage::new("telegram", "42", "chat-1", "ping via tool"))
        .await
        .unwrap();
    let reply = timeout(Duration::from_secs(5), replies.recv()).await.unwrap().unwrap();
    assert_eq!(reply.content, "the tool said pong");
    assert_eq!(provider.models_called(), vec!["claude-opus", "claude-opus"]);

    shutdown.shutdown(ShutdownReason::UserInitiated);
    timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
    drop(agent);

    // 重新打开同一目录：历史与绑定都在
    let store = SessionStore::open(dir.path()).await.unwrap();
    assert_eq!(store.get_current_agent("telegram:chat-1").await, "coder");
    let history = store.history("telegram:chat-1").await;
    let roles: Vec<Role> = history.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]);
    assert_eq!(history[2].content, "pong");
    assert_eq!(history[3].content, "the tool said pong");
}

#[tokio::test]
async fn test_sessions_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let bus = Arc::new(MessageBus::default());
    let mut replies = bus.subscribe_outbound("cli");
    let provider = Arc::new(ScriptedProvider::new());

    let agent = build(dir.path(), provider, Arc::clone(&bus)).await;
    let shutdown = ShutdownManager::new();
    let handle = tokio::spawn(Arc::clone(&agent).run(shutdown.token()));

    for chat in ["a", "b", "c"] {
        bus.publish_inbound(InboundMessage::new("cli", "u", chat, format!("hello from {chat}")))
            .await
            .unwrap();
    }

    let mut contents = Vec::new();
    for _ in 0..3 {
        let reply = timeout(Duration::from_secs(5), replies.recv()).await.unwrap().unwrap();
        contents.push((reply.chat_id, reply.content));
    }
    contents.sort();
    assert_eq!(
        contents,
        vec![
            ("a".to_string(), "Echo: hello from a".to_string()),
            ("b".to_string(), "Echo: hello from b".to_string()),
            ("c".to_string(), "Echo: hello from c".to_string()),
        ]
    );

    shutdown.shutdown(ShutdownReason::UserInitiated);
    timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();

    for chat in ["a", "b", "c"] {
        let history = agent.store().history(&format!("cli:{chat}")).await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, format!("hello from {chat}"));
    }
}
