//! Bee Relay - 多渠道对话中枢
//!
//! 入口：加载配置、初始化日志、打开会话存储、组装 Provider 与工具，运行 Agent 主循环，
//! 并把标准输入输出作为 cli 渠道接入总线。SIGHUP 重新加载 Agent 配置；Ctrl+C / SIGTERM 或输入结束后触发优雅关闭。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use bee_relay::{
    agent::{AgentLoop, DefaultContextBuilder},
    agents::ProfileResolver,
    bus::{InboundMessage, MessageBus, OutboundMessage},
    config::{load_config, reload_agents, AppConfig},
    core::{SessionFlush, ShutdownCoordinator, ShutdownManager, ShutdownReason},
    llm::{FallbackChain, LlmProvider, OpenAiCompatProvider, ProviderRouter, ScriptedProvider},
    observability,
    session::SessionStore,
    tools::{EchoTool, ToolExecutor, ToolRegistry},
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

const CLI_CHANNEL: &str = "cli";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path.clone()).context("Failed to load config")?;

    observability::init(&cfg.app.log_level);
    tracing::info!(app = %cfg.app.name, "starting");

    let store = Arc::new(
        SessionStore::open(&cfg.sessions.dir)
            .await
            .with_context(|| format!("Failed to open session store at {}", cfg.sessions.dir.display()))?,
    );

    let provider = build_provider(&cfg)?;
    let fallback = FallbackChain::new(provider, cfg.retry.clone());

    let mut registry = ToolRegistry::new();
    registry.register(EchoTool);
    let tools = Arc::new(ToolExecutor::new(registry, cfg.runtime.tool_timeout_secs));
    tracing::info!(tools = ?tools.tool_names(), "tools registered");

    let bus = Arc::new(MessageBus::default());
    let resolver = Arc::new(ProfileResolver::new(cfg.agents.clone()));
    let agent = Arc::new(
        AgentLoop::new(Arc::clone(&bus), Arc::clone(&store), Arc::clone(&resolver), fallback, tools)
            .with_context_builder(Arc::new(DefaultContextBuilder::new(
                cfg.runtime.base_system_prompt.clone(),
            )))
            .with_max_concurrent_turns(cfg.runtime.max_concurrent_turns),
    );

    let shutdown = Arc::new(ShutdownManager::new());
    shutdown.install_signal_handlers();
    let cancel = shutdown.token();
    #[cfg(unix)]
    spawn_reload_on_sighup(config_path, resolver, cancel.clone());

    let loop_handle = tokio::spawn(Arc::clone(&agent).run(cancel.clone()));
    let (printed_tx, mut printed_rx) = watch::channel(0usize);
    let printer = tokio::spawn(print_replies(bus.subscribe_outbound(CLI_CHANNEL), printed_tx));
    let mut reader = tokio::spawn(read_stdin(Arc::clone(&bus)));

    tokio::select! {
        _ = shutdown.wait_for_shutdown() => reader.abort(),
        sent = &mut reader => {
            // 输入结束：等已发出的消息都得到回复再关闭
            let sent = sent.unwrap_or(0);
            tokio::select! {
                _ = shutdown.wait_for_shutdown() => {}
                _ = printed_rx.wait_for(|printed| *printed >= sent) => {}
            }
            shutdown.shutdown(ShutdownReason::UserInitiated);
        }
    }

    if let Err(e) = loop_handle.await {
        tracing::error!(error = %e, "agent loop task failed");
    }
    printer.abort();

    let mut coordinator = ShutdownCoordinator::new().with_timeout(10);
    coordinator.register(SessionFlush::new(store));
    let report = coordinator.run_cleanup().await;

    let (prompt_tokens, completion_tokens, total_tokens) = agent.token_usage();
    tracing::info!(
        prompt_tokens,
        completion_tokens,
        total_tokens,
        completed = report.completed,
        failed = report.failed,
        timed_out = report.timed_out,
        "shutdown complete"
    );
    Ok(())
}

/// SIGHUP 时重新加载 Profile 与路由规则
#[cfg(unix)]
fn spawn_reload_on_sighup(config_path: Option<PathBuf>, resolver: Arc<ProfileResolver>, cancel: CancellationToken) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "cannot listen for SIGHUP, config reload disabled");
                return;
            }
        };
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = hangup.recv() => {
                    if received.is_none() {
                        break;
                    }
                    tracing::info!("Received SIGHUP, reloading agent configuration...");
                    let _ = reload_agents(config_path.clone(), &resolver);
                }
            }
        }
    });
}

/// 有 API Key 的 Provider 注册进路由；一个都没有时用脚本化 Provider 回显
fn build_provider(cfg: &AppConfig) -> anyhow::Result<Arc<dyn LlmProvider>> {
    let timeout = Duration::from_secs(cfg.llm.request_timeout_secs);
    let mut router = ProviderRouter::new();

    let mut names: Vec<_> = cfg.providers.keys().cloned().collect();
    names.sort();
    for name in names {
        let section = &cfg.providers[&name];
        if !section.is_configured() {
            tracing::debug!(provider = %name, "provider has no api key or base, skipped");
            continue;
        }
        let provider = OpenAiCompatProvider::new(name.clone(), &section.api_base, &section.api_key, timeout)
            .with_context(|| format!("Failed to build provider '{}'", name))?;
        router.register(name.clone(), Arc::new(provider));
        tracing::info!(provider = %name, api_base = %section.api_base, "provider registered");
    }

    if router.provider_count() == 0 {
        tracing::warn!("no provider configured with an API key, replies will be echoed");
        return Ok(Arc::new(ScriptedProvider::named("offline")));
    }
    if !cfg.llm.default_provider.is_empty() {
        router.set_default(cfg.llm.default_provider.clone());
    }
    Ok(Arc::new(router))
}

/// 标准输入的每一行作为一条 cli 消息；返回发出的条数
async fn read_stdin(bus: Arc<MessageBus>) -> usize {
    let user = std::env::var("USER").unwrap_or_else(|_| "local".to_string());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut sent = 0;

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let msg = InboundMessage::new(CLI_CHANNEL, &user, &user, line);
                if bus.publish_inbound(msg).await.is_err() {
                    break;
                }
                sent += 1;
            }
            Ok(None) => break,
            Err(e) => {
                tracing::error!(error = %e, "failed to read stdin");
                break;
            }
        }
    }
    sent
}

async fn print_replies(mut replies: mpsc::UnboundedReceiver<OutboundMessage>, printed: watch::Sender<usize>) {
    let mut stdout = tokio::io::stdout();
    while let Some(reply) = replies.recv().await {
        let text = format!("{}\n\n", reply.content);
        if stdout.write_all(text.as_bytes()).await.is_err() || stdout.flush().await.is_err() {
            break;
        }
        printed.send_modify(|n| *n += 1);
    }
}
