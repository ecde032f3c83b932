//! Agent 配置：Profile 覆盖合并、候选模型、路由规则、旧配置迁移、快照解析

pub mod migrate;
pub mod profile;
pub mod resolver;
pub mod routing;

pub use migrate::migrate_legacy_models;
pub use profile::{build_candidates, AgentDefaults, AgentProfile, ModelSpec, ProfileConfig, DEFAULT_AGENT};
pub use resolver::{AgentsConfig, Binding, BindingSource, ProfileResolver};
pub use routing::{route, RoutingRule};
