//! 旧版单模型配置迁移
//!
//! 同时设置了 model 与 provider、但没有 models 列表的段，改写为 models = [{provider, model}] 并清空旧字段。

use super::profile::ModelSpec;
use super::resolver::AgentsConfig;

/// 迁移 defaults 与全部 Profile，返回被改写的段数
pub fn migrate_legacy_models(agents: &mut AgentsConfig) -> usize {
    let mut migrated = 0;

    if migrate_section(
        "defaults",
        &mut agents.defaults.model,
        &mut agents.defaults.provider,
        &mut agents.defaults.models,
    ) {
        migrated += 1;
    }

    for (name, profile) in agents.profiles.iter_mut() {
        if migrate_section(name, &mut profile.model, &mut profile.provider, &mut profile.models) {
            migrated += 1;
        }
    }

    migrated
}

fn migrate_section(
    section: &str,
    model: &mut String,
    provider: &mut String,
    models: &mut Vec<ModelSpec>,
) -> bool {
    if !models.is_empty() || model.trim().is_empty() || provider.trim().is_empty() {
        return false;
    }
    tracing::info!(
        section,
        provider = %provider.trim(),
        model = %model.trim(),
        "migrating legacy model/provider to models list"
    );
    models.push(ModelSpec::new(provider.trim(), model.trim()));
    model.clear();
    provider.clear();
    true
}
