//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `BEE__*` 覆盖（双下划线表示嵌套，如 `BEE__AGENTS__DEFAULTS__MODEL=gpt-4o`）。

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::agents::{migrate_legacy_models, AgentsConfig, ProfileResolver};
use crate::core::RetryConfig;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub agents: AgentsConfig,
    pub sessions: SessionsSection,
    pub retry: RetryConfig,
    pub runtime: RuntimeSection,
    pub llm: LlmSection,
    /// [providers.<name>]：名字即模型 ID 的前缀
    pub providers: HashMap<String, ProviderSection>,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    #[serde(default = "default_app_name")]
    pub name: String,
    /// RUST_LOG 未设置时的日志级别
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_app_name() -> String {
    "bee-relay".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// [sessions] 段：会话文件目录
#[derive(Debug, Clone, Deserialize)]
pub struct SessionsSection {
    #[serde(default = "default_sessions_dir")]
    pub dir: PathBuf,
}

impl Default for SessionsSection {
    fn default() -> Self {
        Self {
            dir: default_sessions_dir(),
        }
    }
}

fn default_sessions_dir() -> PathBuf {
    PathBuf::from("workspace/sessions")
}

/// [runtime] 段：并发、工具超时、基础提示词
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeSection {
    #[serde(default = "default_max_concurrent_turns")]
    pub max_concurrent_turns: usize,
    /// 单次工具调用超时（秒）
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    #[serde(default = "default_base_system_prompt")]
    pub base_system_prompt: String,
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            max_concurrent_turns: default_max_concurrent_turns(),
            tool_timeout_secs: default_tool_timeout_secs(),
            base_system_prompt: default_base_system_prompt(),
        }
    }
}

fn default_max_concurrent_turns() -> usize {
    10
}

fn default_tool_timeout_secs() -> u64 {
    30
}

fn default_base_system_prompt() -> String {
    "You are Bee, a helpful AI assistant.".to_string()
}

/// [llm] 段：请求超时与默认 Provider
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// 模型 ID 没有已知前缀时使用的 Provider；为空则取第一个可用的
    #[serde(default)]
    pub default_provider: String,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            default_provider: String::new(),
        }
    }
}

fn default_request_timeout() -> u64 {
    60
}

/// [providers.<name>] 段：OpenAI 兼容端点
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderSection {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_base: String,
}

impl ProviderSection {
    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty() && !self.api_base.trim().is_empty()
    }
}

/// 从 config 目录加载配置，环境变量 BEE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 BEE__*（双下划线表示嵌套键）
///
/// 旧式的单模型写法在这里统一迁移为 models 列表。
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        } else {
            tracing::warn!(path = %path.display(), "config file not found, skipping");
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("BEE")
            .separator("__")
            .try_parsing(true),
    );

    let mut cfg: AppConfig = builder.build()?.try_deserialize()?;
    let migrated = migrate_legacy_models(&mut cfg.agents);
    if migrated > 0 {
        tracing::info!(sections = migrated, "migrated legacy model/provider fields to models list");
    }
    Ok(cfg)
}

/// 重新加载配置并换入新的 agents 段（Profile 与路由规则）
///
/// 加载失败时保留旧配置；进行中的轮次继续使用它们已取出的快照。
pub fn reload_agents(
    config_path: Option<PathBuf>,
    resolver: &ProfileResolver,
) -> Result<(), config::ConfigError> {
    match load_config(config_path) {
        Ok(cfg) => {
            resolver.reload(cfg.agents);
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "config reload failed, keeping current agents");
            Err(e)
        }
    }
}
