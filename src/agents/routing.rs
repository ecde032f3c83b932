//! 静态路由规则：(channel, 用户) -> Agent 名
//!
//! 同一 channel 下先找显式列出该用户的规则，再找通配规则（"*" 或未列任何用户）；各自按声明顺序取第一条。

use serde::{Deserialize, Deserializer, Serialize};

pub const WILDCARD: &str = "*";

/// [[agents.routing]] 条目
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingRule {
    pub channel: String,
    pub agent: String,
    /// 接受字符串或数字：user_ids = [123456, "alice"]
    #[serde(deserialize_with = "flexible_ids")]
    pub user_ids: Vec<String>,
    /// 旧版单用户字段，仅在 user_ids 为空时生效
    pub user_id: String,
}

impl RoutingRule {
    pub fn effective_user_ids(&self) -> Vec<&str> {
        if self.user_ids.is_empty() && !self.user_id.is_empty() {
            return vec![self.user_id.as_str()];
        }
        self.user_ids.iter().map(String::as_str).collect()
    }

    fn matches_exactly(&self, sender: &str) -> bool {
        !sender.is_empty() && self.effective_user_ids().iter().any(|id| *id == sender)
    }

    fn matches_wildcard(&self, sender: &str) -> bool {
        let ids = self.effective_user_ids();
        ids.is_empty() || (!sender.is_empty() && ids.iter().any(|id| *id == WILDCARD))
    }
}

/// 找出 (channel, sender) 命中的 Agent 名
pub fn route<'a>(rules: &'a [RoutingRule], channel: &str, sender: &str) -> Option<&'a str> {
    let on_channel = || rules.iter().filter(move |r| r.channel == channel);

    on_channel()
        .find(|r| r.matches_exactly(sender))
        .or_else(|| on_channel().find(|r| r.matches_wildcard(sender)))
        .map(|r| r.agent.as_str())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FlexibleId {
    Text(String),
    Int(i64),
    Float(f64),
}

impl From<FlexibleId> for String {
    fn from(id: FlexibleId) -> Self {
        match id {
            FlexibleId::Text(s) => s,
            FlexibleId::Int(n) => n.to_string(),
            FlexibleId::Float(f) if f.fract() == 0.0 => format!("{}", f as i64),
            FlexibleId::Float(f) => f.to_string(),
        }
    }
}

fn flexible_ids<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let ids = Vec::<FlexibleId>::deserialize(deserializer)?;
    Ok(ids
        .into_iter()
        .map(String::from)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(channel: &str, agent: &str, ids: &[&str]) -> RoutingRule {
        RoutingRule {
            channel: channel.into(),
            agent: agent.into(),
            user_ids: ids.iter().map(|s| s.to_string()).collect(),
            user_id: String::new(),
        }
    }

    #[test]
    fn test_exact_match_beats_earlier_wildcard() {
        let rules = vec![
            rule("telegram", "general", &["*"]),
            rule("telegram", "coder", &["42"]),
        ];
        assert_eq!(route(&rules, "telegram", "42"), Some("coder"));
        assert_eq!(route(&rules, "telegram", "7"), Some("general"));
    }

    #[test]
    fn test_first_rule_wins_among_same_kind() {
        let rules = vec![
            rule("discord", "first", &["u1", "u2"]),
            rule("discord", "second", &["u1"]),
        ];
        assert_eq!(route(&rules, "discord", "u1"), Some("first"));
    }

    #[test]
    fn test_channel_wide_rule_and_other_channels() {
        let rules = vec![rule("slack", "ops", &[])];
        assert_eq!(route(&rules, "slack", "anyone"), Some("ops"));
        assert_eq!(route(&rules, "slack", ""), Some("ops"));
        assert_eq!(route(&rules, "telegram", "anyone"), None);
    }

    #[test]
    fn test_star_requires_sender() {
        let rules = vec![rule("telegram", "general", &["*"])];
        assert_eq!(route(&rules, "telegram", ""), None);
    }

    #[test]
    fn test_deprecated_user_id() {
        let mut r = rule("qq", "legacy", &[]);
        r.user_id = "1001".into();
        let rules = vec![r];
        assert_eq!(route(&rules, "qq", "1001"), Some("legacy"));
        assert_eq!(route(&rules, "qq", "1002"), None);

        let mut both = rule("qq", "new", &["2002"]);
        both.user_id = "1001".into();
        assert_eq!(both.effective_user_ids(), vec!["2002"]);
    }

    #[test]
    fn test_user_ids_accept_numbers() {
        let json = r#"{"channel":"telegram","agent":"coder","user_ids":[123456, "alice", 7.0]}"#;
        let r: RoutingRule = serde_json::from_str(json).unwrap();
        assert_eq!(r.user_ids, vec!["123456", "alice", "7"]);
    }
}
