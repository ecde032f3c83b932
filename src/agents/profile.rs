//! Agent Profile：配置侧类型与覆盖合并
//!
//! 默认配置（[agents.defaults]）总是存在；命名 Profile（[agents.profiles.<name>]）按字段覆盖：
//! 非零值替换默认值，零值继承。布尔字段例外，始终取 Profile 中的值（false 无法区分「未设置」）。
//! 模型信息（model / models）作为整体替换：Profile 声明了任一模型字段，就完全使用自己的候选来源。

use serde::{Deserialize, Serialize};

pub const DEFAULT_AGENT: &str = "default";

/// 一个候选模型：provider 可空
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSpec {
    pub provider: String,
    pub model: String,
}

impl ModelSpec {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }

    /// 完整模型标识："provider/model"，无 provider 时为 "model"；model 为空时 None
    pub fn resolved(&self) -> Option<String> {
        let model = self.model.trim();
        if model.is_empty() {
            return None;
        }
        let provider = self.provider.trim();
        if provider.is_empty() {
            Some(model.to_string())
        } else {
            Some(format!("{}/{}", provider, model))
        }
    }
}

/// 由 models 列表构建候选列表；列表为空时退回单个 model 字段
pub fn build_candidates(model: &str, models: &[ModelSpec]) -> Vec<String> {
    let mut candidates: Vec<String> = models.iter().filter_map(ModelSpec::resolved).collect();
    let model = model.trim();
    if candidates.is_empty() && !model.is_empty() {
        candidates.push(model.to_string());
    }
    candidates
}

/// [agents.defaults] 段
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentDefaults {
    pub workspace: String,
    pub restrict_to_workspace: bool,
    /// 旧版单 provider 字段，加载时迁移进 models
    pub provider: String,
    pub model: String,
    pub models: Vec<ModelSpec>,
    pub max_tokens: u32,
    pub temperature: f64,
    pub max_tool_iterations: u32,
}

impl Default for AgentDefaults {
    fn default() -> Self {
        Self {
            workspace: "./workspace".to_string(),
            restrict_to_workspace: true,
            provider: String::new(),
            model: "glm-4.7".to_string(),
            models: Vec::new(),
            max_tokens: 8192,
            temperature: 0.7,
            max_tool_iterations: 20,
        }
    }
}

/// [agents.profiles.<name>] 段；所有字段缺省为零值
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    pub workspace: String,
    pub restrict_to_workspace: bool,
    pub provider: String,
    pub model: String,
    pub models: Vec<ModelSpec>,
    pub max_tokens: u32,
    pub temperature: f64,
    pub max_tool_iterations: u32,
    pub system_prompt: String,
    pub allowed_tools: Vec<String>,
}

/// 解析后的 Agent 配置，一轮对话内只读
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentProfile {
    pub name: String,
    pub workspace: String,
    pub restrict_to_workspace: bool,
    /// 主模型，等于 candidates 的第一个（无候选时为空）
    pub model: String,
    /// 按回退顺序排列的候选模型
    pub candidates: Vec<String>,
    pub max_tokens: u32,
    pub temperature: f64,
    pub max_tool_iterations: u32,
    pub system_prompt: Option<String>,
    /// 空表示不限制
    pub allowed_tools: Vec<String>,
}

impl AgentProfile {
    pub fn from_defaults(defaults: &AgentDefaults) -> Self {
        let candidates = build_candidates(&defaults.model, &defaults.models);
        Self {
            name: DEFAULT_AGENT.to_string(),
            workspace: defaults.workspace.clone(),
            restrict_to_workspace: defaults.restrict_to_workspace,
            model: candidates.first().cloned().unwrap_or_default(),
            candidates,
            max_tokens: defaults.max_tokens,
            temperature: defaults.temperature,
            max_tool_iterations: defaults.max_tool_iterations,
            system_prompt: None,
            allowed_tools: Vec::new(),
        }
    }

    /// 以默认配置为底叠加一个命名 Profile，返回新值
    ///
    /// model 与 models 各自按"非空才覆盖"合并，候选列表由合并后的结果生成。
    pub fn overlay(defaults: &AgentDefaults, name: &str, profile: &ProfileConfig) -> Self {
        let model = non_empty(&profile.model).unwrap_or(&defaults.model);
        let models = if profile.models.is_empty() {
            defaults.models.as_slice()
        } else {
            profile.models.as_slice()
        };
        let candidates = build_candidates(model, models);

        Self {
            name: name.to_string(),
            workspace: non_empty(&profile.workspace).unwrap_or(&defaults.workspace).to_string(),
            restrict_to_workspace: profile.restrict_to_workspace,
            model: candidates.first().cloned().unwrap_or_default(),
            candidates,
            max_tokens: non_zero(profile.max_tokens).unwrap_or(defaults.max_tokens),
            temperature: if profile.temperature != 0.0 {
                profile.temperature
            } else {
                defaults.temperature
            },
            max_tool_iterations: non_zero(profile.max_tool_iterations)
                .unwrap_or(defaults.max_tool_iterations),
            system_prompt: non_empty(&profile.system_prompt).map(str::to_string),
            allowed_tools: profile.allowed_tools.clone(),
        }
    }

    /// 工具是否在白名单内（白名单为空时全部允许）
    pub fn allows_tool(&self, tool: &str) -> bool {
        self.allowed_tools.is_empty() || self.allowed_tools.iter().any(|t| t == tool)
    }
}

fn non_empty(s: &str) -> Option<&str> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

fn non_zero(n: u32) -> Option<u32> {
    (n != 0).then_some(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_spec_resolved() {
        assert_eq!(ModelSpec::new("zhipu", " glm-4.7 ").resolved().as_deref(), Some("zhipu/glm-4.7"));
        assert_eq!(ModelSpec::new("", "gpt-4o").resolved().as_deref(), Some("gpt-4o"));
        assert_eq!(ModelSpec::new("openai", "  ").resolved(), None);
    }

    #[test]
    fn test_candidates_prefer_models_list() {
        let candidates = build_candidates("old", &[ModelSpec::new("z", "new")]);
        assert_eq!(candidates, vec!["z/new"]);
    }

    #[test]
    fn test_candidates_fall_back_to_single_model() {
        assert_eq!(build_candidates("m", &[]), vec!["m"]);
        assert_eq!(build_candidates("m", &[ModelSpec::new("p", "")]), vec!["m"]);
        assert!(build_candidates("", &[]).is_empty());
    }

    #[test]
    fn test_candidates_keep_declared_order() {
        let specs = vec![
            ModelSpec::new("a", "one"),
            ModelSpec::new("", ""),
            ModelSpec::new("b", "two"),
            ModelSpec::new("", "three"),
        ];
        assert_eq!(build_candidates("", &specs), vec!["a/one", "b/two", "three"]);
    }

    #[test]
    fn test_from_defaults_primary_is_first_candidate() {
        let defaults = AgentDefaults {
            model: "old".into(),
            models: vec![ModelSpec::new("z", "new")],
            ..AgentDefaults::default()
        };
        let profile = AgentProfile::from_defaults(&defaults);
        assert_eq!(profile.name, "default");
        assert_eq!(profile.model, "z/new");
        assert_eq!(profile.candidates, vec!["z/new"]);

        let empty = AgentProfile::from_defaults(&AgentDefaults {
            model: String::new(),
            ..AgentDefaults::default()
        });
        assert!(empty.candidates.is_empty());
        assert_eq!(empty.model, "");
    }

    #[test]
    fn test_overlay_zero_values_inherit() {
        let defaults = AgentDefaults::default();
        let profile = AgentProfile::overlay(&defaults, "coder", &ProfileConfig::default());
        assert_eq!(profile.name, "coder");
        assert_eq!(profile.workspace, defaults.workspace);
        assert_eq!(profile.model, "glm-4.7");
        assert_eq!(profile.max_tokens, 8192);
        assert_eq!(profile.temperature, 0.7);
        assert_eq!(profile.max_tool_iterations, 20);
        assert_eq!(profile.system_prompt, None);
        // 布尔字段按原值覆盖
        assert!(!profile.restrict_to_workspace);
    }

    #[test]
    fn test_overlay_non_zero_values_replace() {
        let defaults = AgentDefaults::default();
        let cfg = ProfileConfig {
            workspace: "/srv/code".into(),
            restrict_to_workspace: true,
            models: vec![ModelSpec::new("openai", "gpt-4o"), ModelSpec::new("zhipu", "glm-4.7")],
            max_tokens: 2048,
            temperature: 0.2,
            max_tool_iterations: 5,
            system_prompt: "You write Rust.".into(),
            allowed_tools: vec!["echo".into()],
            ..ProfileConfig::default()
        };
        let profile = AgentProfile::overlay(&defaults, "coder", &cfg);
        assert_eq!(profile.workspace, "/srv/code");
        assert!(profile.restrict_to_workspace);
        assert_eq!(profile.model, "openai/gpt-4o");
        assert_eq!(profile.candidates, vec!["openai/gpt-4o", "zhipu/glm-4.7"]);
        assert_eq!(profile.max_tokens, 2048);
        assert_eq!(profile.temperature, 0.2);
        assert_eq!(profile.max_tool_iterations, 5);
        assert_eq!(profile.system_prompt.as_deref(), Some("You write Rust."));
        assert!(profile.allows_tool("echo"));
        assert!(!profile.allows_tool("shell"));
    }

    #[test]
    fn test_overlay_model_only_keeps_default_models() {
        let defaults = AgentDefaults {
            model: String::new(),
            models: vec![ModelSpec::new("zhipu", "glm-4.7")],
            ..AgentDefaults::default()
        };
        let cfg = ProfileConfig {
            model: "deepseek-chat".into(),
            ..ProfileConfig::default()
        };
        let profile = AgentProfile::overlay(&defaults, "cheap", &cfg);
        // 默认的 models 列表仍然优先于单个 model
        assert_eq!(profile.candidates, vec!["zhipu/glm-4.7"]);
        assert_eq!(profile.model, "zhipu/glm-4.7");
    }

    #[test]
    fn test_overlay_model_used_when_no_models_anywhere() {
        let defaults = AgentDefaults::default();
        let cfg = ProfileConfig {
            model: "deepseek-chat".into(),
            ..ProfileConfig::default()
        };
        let profile = AgentProfile::overlay(&defaults, "cheap", &cfg);
        assert_eq!(profile.candidates, vec!["deepseek-chat"]);
    }

    #[test]
    fn test_overlay_profile_models_replace_default_models() {
        let defaults = AgentDefaults {
            models: vec![ModelSpec::new("zhipu", "glm-4.7")],
            ..AgentDefaults::default()
        };
        let cfg = ProfileConfig {
            models: vec![ModelSpec::new("openai", "gpt-4o")],
            ..ProfileConfig::default()
        };
        let profile = AgentProfile::overlay(&defaults, "coder", &cfg);
        assert_eq!(profile.candidates, vec!["openai/gpt-4o"]);
    }

    #[test]
    fn test_empty_allow_list_allows_everything() {
        let profile = AgentProfile::from_defaults(&AgentDefaults::default());
        assert!(profile.allows_tool("anything"));
    }
}
