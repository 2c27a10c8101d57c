//! Agent configuration and the ambient retry/approval policy types that
//! support it (SPEC_FULL §3 supplement, §6).

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// `{id, systemPrompt, temperature, topP, maxTokens, model, enabledTools[],
/// maxToolConcurrency, requireToolApproval, maxDelegationDepth}` (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub id: String,
    pub system_prompt: String,
    #[serde(default = "d_temperature")]
    pub temperature: f32,
    #[serde(default = "d_top_p")]
    pub top_p: f32,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// `"<providerId>/<model>"`, or bare model name to use role-based
    /// resolution (SPEC_FULL §4.1 supplement).
    pub model: Option<String>,
    /// Concrete allow-list of tool names this agent may call. When a
    /// broader declarative policy is preferred, populate this list by
    /// filtering a tool registry snapshot through [`ToolPolicy::allows`]
    /// at configuration time rather than at dispatch time.
    #[serde(default)]
    pub enabled_tools: Vec<String>,
    #[serde(default = "d_max_tool_concurrency")]
    pub max_tool_concurrency: usize,
    #[serde(default)]
    pub require_tool_approval: bool,
    #[serde(default = "d_max_delegation_depth")]
    pub max_delegation_depth: u32,
    #[serde(default = "d_tool_timeout_ms")]
    pub tool_timeout_ms: u64,
    #[serde(default = "d_max_llm_calls_per_turn")]
    pub max_llm_calls_per_turn: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            id: "default".into(),
            system_prompt: String::new(),
            temperature: d_temperature(),
            top_p: d_top_p(),
            max_tokens: None,
            model: None,
            enabled_tools: Vec::new(),
            max_tool_concurrency: d_max_tool_concurrency(),
            require_tool_approval: false,
            max_delegation_depth: d_max_delegation_depth(),
            tool_timeout_ms: d_tool_timeout_ms(),
            max_llm_calls_per_turn: d_max_llm_calls_per_turn(),
        }
    }
}

fn d_temperature() -> f32 {
    1.0
}
fn d_top_p() -> f32 {
    1.0
}
fn d_max_tool_concurrency() -> usize {
    3
}
fn d_max_delegation_depth() -> u32 {
    3
}
fn d_tool_timeout_ms() -> u64 {
    30_000
}
fn d_max_llm_calls_per_turn() -> usize {
    25
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool policy — prefix-based allow/deny, shared by delegation templates
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Tool allow/deny policy — prefix-based matching, dotted namespaces
/// (`"memory"` matches `"memory.search"`).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolPolicy {
    /// Tool name prefixes this agent may use. `["*"]` or empty = unrestricted.
    #[serde(default)]
    pub allow: Vec<String>,
    /// Tool name prefixes this agent is denied (evaluated before allow).
    #[serde(default)]
    pub deny: Vec<String>,
}

impl ToolPolicy {
    /// Whether `tool_name` is permitted by this policy. Matching is
    /// case-insensitive; deny always wins over allow.
    pub fn allows(&self, tool_name: &str) -> bool {
        let name = tool_name.to_ascii_lowercase();

        for d in &self.deny {
            let d_lower = d.to_ascii_lowercase();
            if d_lower == "*" || name == d_lower || name.starts_with(&format!("{d_lower}.")) {
                return false;
            }
        }
        if self.allow.is_empty() || self.allow.iter().any(|a| a == "*") {
            return true;
        }
        for a in &self.allow {
            let a_lower = a.to_ascii_lowercase();
            if name == a_lower || name.starts_with(&format!("{a_lower}.")) {
                return true;
            }
        }
        false
    }

    /// Filter a full registry snapshot down to the names this policy
    /// permits, preserving input order.
    pub fn filter<'a, I: IntoIterator<Item = &'a String>>(&self, names: I) -> Vec<String> {
        names
            .into_iter()
            .filter(|n| self.allows(n))
            .cloned()
            .collect()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Transport retry policy (§4.3)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(with = "duration_millis", default = "d_base_delay")]
    pub base_delay: Duration,
    #[serde(default = "d_multiplier")]
    pub multiplier: f64,
    #[serde(with = "duration_millis", default = "d_max_delay")]
    pub max_delay: Duration,
    #[serde(default = "d_jitter")]
    pub jitter_factor: f64,
    #[serde(default = "d_max_retries")]
    pub max_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay: d_base_delay(),
            multiplier: d_multiplier(),
            max_delay: d_max_delay(),
            jitter_factor: d_jitter(),
            max_retries: d_max_retries(),
        }
    }
}

fn d_base_delay() -> Duration {
    Duration::from_secs(1)
}
fn d_multiplier() -> f64 {
    2.0
}
fn d_max_delay() -> Duration {
    Duration::from_secs(60)
}
fn d_jitter() -> f64 {
    0.2
}
fn d_max_retries() -> u32 {
    10
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(d)?;
        Ok(Duration::from_millis(ms))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool approval policy (§6)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ToolApprovalPolicy {
    #[default]
    Never,
    SessionScoped,
    Always,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_policy_empty_allows_all() {
        let policy = ToolPolicy::default();
        assert!(policy.allows("exec"));
        assert!(policy.allows("memory.search"));
    }

    #[test]
    fn tool_policy_deny_takes_precedence() {
        let policy = ToolPolicy {
            allow: vec!["*".into()],
            deny: vec!["exec".into()],
        };
        assert!(!policy.allows("exec"));
        assert!(policy.allows("memory.search"));
    }

    #[test]
    fn tool_policy_filter_preserves_order() {
        let policy = ToolPolicy {
            allow: vec!["memory".into()],
            deny: vec![],
        };
        let names = vec!["exec".to_string(), "memory.search".to_string(), "memory.ingest".to_string()];
        assert_eq!(policy.filter(&names), vec!["memory.search", "memory.ingest"]);
    }

    #[test]
    fn retry_config_defaults_match_spec() {
        let r = RetryConfig::default();
        assert_eq!(r.base_delay, Duration::from_secs(1));
        assert_eq!(r.multiplier, 2.0);
        assert_eq!(r.max_delay, Duration::from_secs(60));
        assert_eq!(r.jitter_factor, 0.2);
        assert_eq!(r.max_retries, 10);
    }

    #[test]
    fn agent_config_defaults_match_spec() {
        let c = AgentConfig::default();
        assert_eq!(c.max_tool_concurrency, 3);
        assert_eq!(c.max_delegation_depth, 3);
        assert_eq!(c.tool_timeout_ms, 30_000);
        assert_eq!(c.max_llm_calls_per_turn, 25);
    }
}
