//! Profile 解析与 Agent 绑定优先级
//!
//! AgentsConfig 是只读快照；ProfileResolver 持有当前快照的 Arc，reload 时整体替换，
//! 正在进行的轮次继续使用自己取到的旧快照。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use super::profile::{AgentDefaults, AgentProfile, ProfileConfig, DEFAULT_AGENT};
use super::routing::{route, RoutingRule};

/// [agents] 段
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentsConfig {
    pub defaults: AgentDefaults,
    pub profiles: HashMap<String, ProfileConfig>,
    pub routing: Vec<RoutingRule>,
}

/// 本轮使用的 Agent 来自哪一级
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingSource {
    Routing,
    Session,
    Default,
}

impl fmt::Display for BindingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BindingSource::Routing => "routing rule",
            BindingSource::Session => "session",
            BindingSource::Default => "default",
        })
    }
}

/// 绑定结果：Agent 名（default 时为 "default"）与来源
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub agent: String,
    pub source: BindingSource,
}

fn is_default_name(name: &str) -> bool {
    name.is_empty() || name == DEFAULT_AGENT
}

impl AgentsConfig {
    /// 解析 Profile；空名、"default" 或未注册的名字都返回默认配置
    pub fn resolve(&self, name: &str) -> AgentProfile {
        if is_default_name(name) {
            return AgentProfile::from_defaults(&self.defaults);
        }
        match self.profiles.get(name) {
            Some(profile) => AgentProfile::overlay(&self.defaults, name, profile),
            None => AgentProfile::from_defaults(&self.defaults),
        }
    }

    pub fn routed_agent(&self, channel: &str, sender: &str) -> Option<&str> {
        route(&self.routing, channel, sender)
    }

    /// "default" 在前，其余按名字排序
    pub fn list_profiles(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .profiles
            .keys()
            .filter(|n| n.as_str() != DEFAULT_AGENT)
            .cloned()
            .collect();
        names.sort();
        names.insert(0, DEFAULT_AGENT.to_string());
        names
    }

    pub fn profile_exists(&self, name: &str) -> bool {
        is_default_name(name) || self.profiles.contains_key(name)
    }

    /// 路由规则 > 会话粘性绑定 > 默认；绑定的 Profile 已从配置中删除时按默认处理
    pub fn select_agent(&self, channel: &str, sender: &str, sticky: &str) -> Binding {
        if let Some(agent) = self.routed_agent(channel, sender) {
            return Binding {
                agent: agent.to_string(),
                source: BindingSource::Routing,
            };
        }
        if !is_default_name(sticky) && self.profile_exists(sticky) {
            return Binding {
                agent: sticky.to_string(),
                source: BindingSource::Session,
            };
        }
        Binding {
            agent: DEFAULT_AGENT.to_string(),
            source: BindingSource::Default,
        }
    }
}

/// 持有当前 Agent 配置快照
pub struct ProfileResolver {
    current: watch::Sender<Arc<AgentsConfig>>,
}

impl ProfileResolver {
    pub fn new(config: AgentsConfig) -> Self {
        let (current, _) = watch::channel(Arc::new(config));
        Self { current }
    }

    /// 当前快照；调用方在一轮内只取一次
    pub fn snapshot(&self) -> Arc<AgentsConfig> {
        self.current.borrow().clone()
    }

    /// 替换配置；已取出的快照不受影响
    pub fn reload(&self, config: AgentsConfig) {
        let profiles = config.profiles.len();
        let rules = config.routing.len();
        self.current.send_replace(Arc::new(config));
        tracing::info!(profiles, rules, "agent configuration reloaded");
    }
}

impl fmt::Debug for ProfileResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProfileResolver")
            .field("profiles", &self.current.borrow().profiles.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::profile::ModelSpec;

    fn sample() -> AgentsConfig {
        let mut agents = AgentsConfig::default();
        agents.profiles.insert(
            "coder".into(),
            ProfileConfig {
                models: vec![ModelSpec::new("openai", "gpt-4o")],
                ..ProfileConfig::default()
            },
        );
        agents.profiles.insert("writer".into(), ProfileConfig::default());
        agents.routing.push(RoutingRule {
            channel: "telegram".into(),
            agent: "coder".into(),
            user_ids: vec!["42".into()],
            user_id: String::new(),
        });
        agents
    }

    #[test]
    fn test_resolve_default_and_unknown() {
        let agents = sample();
        let default = agents.resolve("");
        assert_eq!(default, agents.resolve("default"));
        assert_eq!(default.model, "glm-4.7");

        let unknown = agents.resolve("ghost");
        assert_eq!(unknown, default);
    }

    #[test]
    fn test_resolve_named_profile() {
        let coder = sample().resolve("coder");
        assert_eq!(coder.name, "coder");
        assert_eq!(coder.model, "openai/gpt-4o");
        assert_eq!(coder.max_tokens, 8192);
    }

    #[test]
    fn test_list_and_exists() {
        let agents = sample();
        assert_eq!(agents.list_profiles(), vec!["default", "coder", "writer"]);
        assert_eq!(AgentsConfig::default().list_profiles(), vec!["default"]);
        assert!(agents.profile_exists(""));
        assert!(agents.profile_exists("default"));
        assert!(agents.profile_exists("writer"));
        assert!(!agents.profile_exists("ghost"));
    }

    #[test]
    fn test_routing_overrides_sticky() {
        let agents = sample();
        let binding = agents.select_agent("telegram", "42", "writer");
        assert_eq!(binding.agent, "coder");
        assert_eq!(binding.source, BindingSource::Routing);
    }

    #[test]
    fn test_sticky_used_off_route() {
        let agents = sample();
        let binding = agents.select_agent("discord", "42", "writer");
        assert_eq!(binding.agent, "writer");
        assert_eq!(binding.source, BindingSource::Session);
    }

    #[test]
    fn test_removed_sticky_profile_falls_back() {
        let binding = sample().select_agent("discord", "u1", "ghost");
        assert_eq!(binding.agent, DEFAULT_AGENT);
        assert_eq!(binding.source, BindingSource::Default);
    }

    #[test]
    fn test_default_when_nothing_binds() {
        let agents = sample();
        let binding = agents.select_agent("discord", "42", "");
        assert_eq!(binding.agent, "default");
        assert_eq!(binding.source, BindingSource::Default);
    }

    #[test]
    fn test_reload_keeps_old_snapshot() {
        let resolver = ProfileResolver::new(sample());
        let before = resolver.snapshot();

        resolver.reload(AgentsConfig::default());

        assert!(before.profile_exists("coder"));
        assert!(!resolver.snapshot().profile_exists("coder"));
    }
}
