use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tooling
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Configuration for the tool dispatcher: concurrency, approval gating,
/// per-call timeout, and the `Before`-hook exec denylist. Individual tool
/// implementations (exec, HTTP, file I/O, etc.) are out of scope here —
/// this governs how the dispatcher runs whichever tools are registered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Run independent tool calls from the same turn concurrently via
    /// `join_all` rather than sequentially. Results are always reassembled
    /// in original call order regardless of completion order.
    #[serde(default = "d_true")]
    pub parallel_tool_execution: bool,
    /// Require a human approval decision before executing any tool in
    /// `approval_required_tools`, regardless of hook decisions.
    #[serde(default)]
    pub require_tool_approval: bool,
    /// Tool names (or dotted prefixes) that must pass the approval gate
    /// before execution. Matching follows the same prefix rules as
    /// [`super::agents::ToolPolicy`].
    #[serde(default)]
    pub approval_required_tools: Vec<String>,
    /// How long the dispatcher waits for a human approval decision before
    /// treating the call as denied.
    #[serde(default = "d_300")]
    pub approval_timeout_sec: u64,
    /// Hard wall-clock timeout for a single tool execution (seconds).
    #[serde(default = "d_120")]
    pub tool_timeout_seconds: u64,
    /// Patterns checked by the built-in deny-pattern `Before` hook.
    #[serde(default)]
    pub exec_security: ExecSecurityConfig,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            parallel_tool_execution: true,
            require_tool_approval: false,
            approval_required_tools: Vec::new(),
            approval_timeout_sec: 300,
            tool_timeout_seconds: 120,
            exec_security: ExecSecurityConfig::default(),
        }
    }
}

/// Regex patterns matched against a tool call's arguments by the built-in
/// deny-pattern `Before` hook (ported from the exec-specific denylist the
/// dispatcher used to hardcode — see `gateway::runtime::hooks`).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExecSecurityConfig {
    /// Regex patterns. A tool call whose serialized arguments match any
    /// pattern is vetoed before execution.
    #[serde(default)]
    pub denied_patterns: Vec<String>,
}

// ── serde default helpers ───────────────────────────────────────────

fn d_true() -> bool {
    true
}
fn d_300() -> u64 {
    300
}
fn d_120() -> u64 {
    120
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_permissive() {
        let cfg = ToolsConfig::default();
        assert!(cfg.parallel_tool_execution);
        assert!(!cfg.require_tool_approval);
        assert!(cfg.approval_required_tools.is_empty());
        assert!(cfg.exec_security.denied_patterns.is_empty());
    }
}
