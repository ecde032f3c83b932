//! Agent 主循环
//!
//! 从总线取入站消息，每条消息在一个轮次许可下独立处理：
//! 取会话轮次锁 -> 拦截 /agent 命令 -> 解析绑定与 Profile -> 构建上下文 -> 调用模型（循环执行工具调用）
//! -> 一次性追加本轮消息并落盘 -> 发布回复。失败的轮次不追加任何消息，只回复一条错误。

use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::commands::{self, AgentCommand, AgentInfo};
use super::context::{user_content, ContextBuilder, ContextData, DefaultContextBuilder};
use crate::agents::{AgentProfile, Binding, ProfileResolver, DEFAULT_AGENT};
use crate::bus::{InboundMessage, MessageBus, OutboundMessage};
use crate::core::{AgentError, PhaseTracker, SessionLocks, TurnPhase, TurnScheduler};
use crate::llm::{describe_network_error, FallbackChain, ToolDefinition};
use crate::memory::Message;
use crate::session::SessionStore;
use crate::tools::{ToolExecutor, ToolOutcome};

pub const ITERATION_LIMIT_NOTICE: &str =
    "I reached the tool iteration limit before finishing. Please try again or narrow the request.";
pub const EMPTY_RESPONSE_NOTICE: &str = "I've completed processing but have no response to give.";

/// 编排器
pub struct AgentLoop {
    bus: Arc<MessageBus>,
    store: Arc<SessionStore>,
    resolver: Arc<ProfileResolver>,
    fallback: FallbackChain,
    tools: Arc<ToolExecutor>,
    context: Arc<dyn ContextBuilder>,
    locks: SessionLocks,
    scheduler: TurnScheduler,
    phases: PhaseTracker,
}

impl AgentLoop {
    pub fn new(
        bus: Arc<MessageBus>,
        store: Arc<SessionStore>,
        resolver: Arc<ProfileResolver>,
        fallback: FallbackChain,
        tools: Arc<ToolExecutor>,
    ) -> Self {
        Self {
            bus,
            store,
            resolver,
            fallback,
            tools,
            context: Arc::new(DefaultContextBuilder::default()),
            locks: SessionLocks::new(),
            scheduler: TurnScheduler::default(),
            phases: PhaseTracker::new(),
        }
    }

    pub fn with_context_builder(mut self, context: Arc<dyn ContextBuilder>) -> Self {
        self.context = context;
        self
    }

    pub fn with_max_concurrent_turns(mut self, max: usize) -> Self {
        self.scheduler = TurnScheduler::new(max);
        self
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// 累计 token 用量：(prompt, completion, total)
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.fallback.provider().token_usage()
    }

    pub fn phase(&self, session_key: &str) -> TurnPhase {
        self.phases.get(session_key)
    }

    /// 消费入站消息直到取消；返回前等待在途轮次结束
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        tracing::info!("agent loop started");
        let mut tasks = JoinSet::new();

        loop {
            let msg = tokio::select! {
                msg = self.bus.consume_inbound(&cancel) => msg,
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!(error = %e, "turn task failed");
                    }
                    continue;
                }
            };
            let Some(msg) = msg else { break };
            let Some(permit) = self.scheduler.acquire(&cancel).await else {
                break;
            };

            let this = Arc::clone(&self);
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let _permit = permit;
                if let Some(reply) = this.handle_inbound(&msg, &cancel).await {
                    this.bus.publish_outbound(reply);
                }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "turn task failed");
            }
        }
        tracing::info!("agent loop stopped");
    }

    /// 处理一条入站消息并给出回复；被取消时不回复
    pub async fn handle_inbound(
        &self,
        msg: &InboundMessage,
        cancel: &CancellationToken,
    ) -> Option<OutboundMessage> {
        match self.process_message(msg, cancel).await {
            Ok(text) => Some(OutboundMessage::reply_to(msg, text)),
            Err(AgentError::Cancelled) => {
                tracing::info!(session = %msg.session_key, "turn cancelled, no reply sent");
                None
            }
            Err(e) => {
                tracing::error!(session = %msg.session_key, channel = %msg.channel, error = %e, "turn failed");
                Some(OutboundMessage::reply_to(msg, user_facing_error(&e)))
            }
        }
    }

    /// 处理一轮：命令直接回复，普通消息走模型
    pub async fn process_message(
        &self,
        msg: &InboundMessage,
        cancel: &CancellationToken,
    ) -> Result<String, AgentError> {
        let key = msg.session_key.as_str();
        let turn = self.locks.acquire(key).await;

        let result = if let Some(command) = AgentCommand::parse(&msg.content) {
            self.phases.set(key, TurnPhase::Responding);
            Ok(self.handle_command(command, msg).await)
        } else {
            self.run_turn(msg, cancel).await
        };
        self.phases.set(key, TurnPhase::Idle);

        drop(turn);
        self.locks.release(key);
        result
    }

    async fn run_turn(
        &self,
        msg: &InboundMessage,
        cancel: &CancellationToken,
    ) -> Result<String, AgentError> {
        let key = msg.session_key.as_str();
        self.phases.set(key, TurnPhase::Resolving);

        let (profile, binding) = self.resolve_profile(key, &msg.channel, &msg.sender_id).await;
        tracing::info!(
            session = key,
            channel = %msg.channel,
            agent = %profile.name,
            bound_by = %binding.source,
            model = %profile.model,
            "processing message"
        );

        let data = ContextData {
            history: self.store.history(key).await,
            summary: self.store.summary(key).await,
            user_message: msg.content.clone(),
            media: msg.media.clone(),
            channel: msg.channel.clone(),
            chat_id: msg.chat_id.clone(),
            system_prompt: profile.system_prompt.clone(),
            workspace: profile.workspace.clone(),
        };
        let mut messages = self.context.build_messages(&data);
        let tools = self.tools.definitions(&profile.allowed_tools);

        self.phases.set(key, TurnPhase::Invoking);
        let mut exchange = vec![Message::user(user_content(&msg.content, &msg.media))];
        let reply = self
            .run_tool_loop(&profile, &mut messages, &mut exchange, &tools, cancel)
            .await?;
        exchange.push(Message::assistant(reply.clone()));

        self.phases.set(key, TurnPhase::Persisting);
        self.store.append_messages(key, exchange).await;
        if let Err(e) = self.store.save(key).await {
            tracing::error!(session = key, error = %e, "failed to persist session");
        }

        Ok(reply)
    }

    /// 调用模型，执行其请求的工具并把结果交回，直到不再请求工具或达到迭代上限
    async fn run_tool_loop(
        &self,
        profile: &AgentProfile,
        messages: &mut Vec<Message>,
        exchange: &mut Vec<Message>,
        tools: &[ToolDefinition],
        cancel: &CancellationToken,
    ) -> Result<String, AgentError> {
        let max_iterations = profile.max_tool_iterations.max(1);
        let mut last_text = String::new();

        for iteration in 1..=max_iterations {
            let reply = self.fallback.chat(profile, messages, tools, cancel).await?;
            let response = reply.response;

            if !response.has_tool_calls() {
                tracing::debug!(agent = %profile.name, model = %reply.model, iteration, "model returned final answer");
                if response.content.trim().is_empty() {
                    return Ok(EMPTY_RESPONSE_NOTICE.to_string());
                }
                return Ok(response.content);
            }

            if !response.content.trim().is_empty() {
                last_text = response.content.clone();
            }
            tracing::debug!(
                agent = %profile.name,
                iteration,
                calls = response.tool_calls.len(),
                "model requested tools"
            );

            let assistant = Message::assistant_with_tools(response.content, response.tool_calls.clone());
            messages.push(assistant.clone());
            exchange.push(assistant);

            for call in &response.tool_calls {
                let outcome = if profile.allows_tool(&call.name) {
                    self.tools.execute(&call.name, call.arguments.clone()).await
                } else {
                    tracing::warn!(agent = %profile.name, tool = %call.name, "tool not in allow-list");
                    ToolOutcome::error(format!(
                        "tool '{}' is not available to agent '{}'",
                        call.name, profile.name
                    ))
                };
                let result = Message::tool_result(call, outcome.content);
                messages.push(result.clone());
                exchange.push(result);
            }
        }

        tracing::warn!(agent = %profile.name, max_iterations, "tool iteration limit reached");
        if last_text.is_empty() {
            Ok(ITERATION_LIMIT_NOTICE.to_string())
        } else {
            Ok(last_text)
        }
    }

    /// 路由规则 > 会话绑定 > 默认；配置快照只取一次
    pub async fn resolve_profile(
        &self,
        session_key: &str,
        channel: &str,
        sender_id: &str,
    ) -> (AgentProfile, Binding) {
        let agents = self.resolver.snapshot();
        let sticky = self.store.get_current_agent(session_key).await;
        let binding = agents.select_agent(channel, sender_id, &sticky);
        (agents.resolve(&binding.agent), binding)
    }

    /// 切换会话的粘性绑定；名字未注册时绑定不变
    pub async fn switch_agent(&self, session_key: &str, name: &str) -> Result<(), AgentError> {
        let agents = self.resolver.snapshot();
        if !agents.profile_exists(name) {
            return Err(AgentError::UnknownAgent(name.to_string()));
        }
        let bound = if name == DEFAULT_AGENT { "" } else { name };
        self.store.set_current_agent(session_key, bound).await;
        if let Err(e) = self.store.save(session_key).await {
            tracing::error!(session = session_key, error = %e, "failed to persist agent switch");
        }
        tracing::info!(session = session_key, agent = name, "agent switched");
        Ok(())
    }

    pub fn list_agents(&self) -> Vec<String> {
        self.resolver.snapshot().list_profiles()
    }

    pub async fn current_agent_info(&self, session_key: &str, channel: &str, sender_id: &str) -> AgentInfo {
        let (profile, binding) = self.resolve_profile(session_key, channel, sender_id).await;
        AgentInfo {
            profile,
            source: binding.source,
        }
    }

    async fn handle_command(&self, command: AgentCommand, msg: &InboundMessage) -> String {
        let key = msg.session_key.as_str();
        tracing::info!(session = key, command = ?command, "agent command");

        match command {
            AgentCommand::List => {
                let (_, binding) = self.resolve_profile(key, &msg.channel, &msg.sender_id).await;
                commands::render_list(&self.list_agents(), &binding.agent)
            }
            AgentCommand::Switch(None) => commands::render_switch_usage(),
            AgentCommand::Switch(Some(name)) => match self.switch_agent(key, &name).await {
                Ok(()) => {
                    let agents = self.resolver.snapshot();
                    match agents.routed_agent(&msg.channel, &msg.sender_id) {
                        Some(routed) if routed != name => format!(
                            "Switched to '{}'. Note: a routing rule assigns '{}' to you on {} and still takes priority.",
                            name, routed, msg.channel
                        ),
                        _ => format!("Switched to '{}'", name),
                    }
                }
                Err(e) => e.to_string(),
            },
            AgentCommand::Info => {
                let info = self.current_agent_info(key, &msg.channel, &msg.sender_id).await;
                commands::render_info(&info)
            }
            AgentCommand::Help => commands::render_help(),
            AgentCommand::Unknown(sub) => commands::render_unknown(&sub),
        }
    }
}

/// 失败轮次给用户的唯一一条回复
fn user_facing_error(err: &AgentError) -> String {
    match err {
        AgentError::AllCandidatesFailed { last, .. } => {
            format!("Error processing message: {}", describe_network_error(last))
        }
        other => format!("Error processing message: {}", other),
    }
}
