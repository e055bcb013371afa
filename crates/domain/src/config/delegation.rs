use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Delegation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Global delegation gate and named delegation profiles.
///
/// A profile is a named bundle of overrides applied to a child turn when
/// the parent calls `delegate_agent`, independent of the per-agent
/// [`super::agents::AgentConfig`] definitions (which are keyed by agent id,
/// not delegation profile name — an agent can be delegated to under
/// several different profiles with different limits).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationConfig {
    /// Master switch. When `false`, `delegate_agent` is never advertised as
    /// a tool regardless of per-agent tool policy.
    #[serde(default = "d_true")]
    pub enabled: bool,
    /// Maximum delegation depth across the whole chain (parent = depth 0).
    #[serde(default = "d_max_depth")]
    pub max_depth: u32,
    /// Named delegation profiles, keyed by profile name.
    #[serde(default)]
    pub profiles: HashMap<String, DelegationProfile>,
}

impl Default for DelegationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_depth: d_max_depth(),
            profiles: HashMap::new(),
        }
    }
}

/// A single delegation profile: the overrides applied to a delegated turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationProfile {
    /// Extra system prompt text prepended for the child turn.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Tool name allowlist for the child (intersected with the target
    /// agent's own [`super::agents::ToolPolicy`]; `delegate_agent` itself is
    /// excluded from a child's tool set unless explicitly re-added).
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    /// Maximum transcript turns replayed into the child's context.
    #[serde(default = "d_max_history_turns")]
    pub max_history_turns: u32,
    /// Maximum think-act-observe iterations for the child turn.
    #[serde(default = "d_max_iterations")]
    pub max_iterations: u32,
}

impl Default for DelegationProfile {
    fn default() -> Self {
        Self {
            system_prompt: None,
            allowed_tools: Vec::new(),
            max_history_turns: d_max_history_turns(),
            max_iterations: d_max_iterations(),
        }
    }
}

fn d_true() -> bool {
    true
}
fn d_max_depth() -> u32 {
    3
}
fn d_max_history_turns() -> u32 {
    0
}
fn d_max_iterations() -> u32 {
    25
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_delegation_with_depth_cap() {
        let cfg = DelegationConfig::default();
        assert!(cfg.enabled);
        assert_eq!(cfg.max_depth, 3);
        assert!(cfg.profiles.is_empty());
    }

    #[test]
    fn profile_defaults_match_turn_loop_cap() {
        let profile = DelegationProfile::default();
        assert_eq!(profile.max_iterations, 25);
        assert!(profile.allowed_tools.is_empty());
    }
}
