use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Middleware admission pipeline
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Budgets enforced by the built-in admission middlewares before a turn is
/// allowed to start. `0` disables the corresponding check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiddlewareConfig {
    /// Maximum cumulative tokens (input + output, estimated via the
    /// character/4 heuristic when a provider doesn't report usage) a
    /// session may consume before `TokenBudget` short-circuits new turns.
    /// `0` disables the check.
    #[serde(default)]
    pub session_token_budget: u64,
    /// Maximum inbound turns per session per rolling 60s window before
    /// `RateLimit` short-circuits. `0` disables the check.
    #[serde(default)]
    pub session_rate_limit_per_minute: u32,
    /// Whether the `Audit` middleware logs every admitted turn at `info`
    /// level (in addition to the turn span the runtime already emits).
    #[serde(default = "d_true")]
    pub audit_log_enabled: bool,
}

impl Default for MiddlewareConfig {
    fn default() -> Self {
        Self {
            session_token_budget: 0,
            session_rate_limit_per_minute: 0,
            audit_log_enabled: true,
        }
    }
}

fn d_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_disable_budgets() {
        let cfg = MiddlewareConfig::default();
        assert_eq!(cfg.session_token_budget, 0);
        assert_eq!(cfg.session_rate_limit_per_minute, 0);
        assert!(cfg.audit_log_enabled);
    }
}
