//! Tool hooks — a `Before`/`After` interceptor chain that runs around every
//! tool dispatch, independent of the approval gate.
//!
//! `Before` hooks can veto a call outright (e.g. a denied command pattern);
//! `After` hooks observe the result for logging/auditing. Hooks are plain
//! trait objects registered in order, mirroring the way `LlmProvider` and
//! `SerialMemoryProvider` are used elsewhere in this codebase: a small
//! polymorphic interface over concrete values, not a class hierarchy.

use std::sync::Arc;

use regex::Regex;
use serde_json::Value;

use orc_domain::config::ExecSecurityConfig;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// HookDecision
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The outcome of running a tool call through a `Before` hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookDecision {
    Allow,
    Deny { hook: String, reason: String },
}

impl HookDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, HookDecision::Allow)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ToolCallContext
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Everything a hook needs to implement policy keyed on more than just the
/// tool name and arguments (SPEC_FULL §4.5: `sessionId, channelId, senderId,
/// correlationId, isStreaming`). Built once per turn and shared across every
/// tool call within it — only `tool_name`/`arguments` vary per call.
#[derive(Debug, Clone, Copy)]
pub struct ToolCallContext<'a> {
    pub session_key: &'a str,
    /// The originating channel (e.g. `"discord"`, `"telegram"`), when known.
    pub channel_id: Option<&'a str>,
    /// The human sender's peer ID within that channel, when known.
    pub sender_id: Option<&'a str>,
    /// Ties every hook invocation in one turn back to the same run, for
    /// audit-log correlation.
    pub correlation_id: &'a str,
    /// Whether this turn is being delivered as a stream of events (SSE,
    /// interactive REPL) rather than aggregated into one final response.
    pub is_streaming: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ToolHook trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A single interceptor in the `Before`/`After` chain.
pub trait ToolHook: Send + Sync {
    /// Identifies this hook in deny reasons and audit logs.
    fn name(&self) -> &str;

    /// Inspect a call before dispatch. Returning `Deny` short-circuits the
    /// whole chain; no later hook's `before` runs and the tool never executes.
    fn before(&self, tool_name: &str, arguments: &Value, ctx: &ToolCallContext) -> HookDecision;

    /// Observe the result after dispatch (or after a veto/approval denial).
    /// Default no-op; hooks that only care about vetoing don't need this.
    fn after(
        &self,
        _tool_name: &str,
        _arguments: &Value,
        _result: &str,
        _is_error: bool,
        _ctx: &ToolCallContext,
    ) {
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// HookRegistry — ordered chain
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Clone, Default)]
pub struct HookRegistry {
    hooks: Vec<Arc<dyn ToolHook>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self { hooks: Vec::new() }
    }

    pub fn register(&mut self, hook: Arc<dyn ToolHook>) {
        self.hooks.push(hook);
    }

    /// Run every `Before` hook in order. The first `Deny` wins.
    pub fn run_before(
        &self,
        tool_name: &str,
        arguments: &Value,
        ctx: &ToolCallContext,
    ) -> HookDecision {
        for hook in &self.hooks {
            let decision = hook.before(tool_name, arguments, ctx);
            if !decision.is_allowed() {
                return decision;
            }
        }
        HookDecision::Allow
    }

    /// Run every `After` hook in order. Failures inside a hook are not
    /// propagated — hooks observe, they don't participate in error flow.
    pub fn run_after(
        &self,
        tool_name: &str,
        arguments: &Value,
        result: &str,
        is_error: bool,
        ctx: &ToolCallContext,
    ) {
        for hook in &self.hooks {
            hook.after(tool_name, arguments, result, is_error, ctx);
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Built-in: deny-pattern hook
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Vetoes any tool call whose serialized arguments match a configured
/// deny pattern. Generalizes the exec-specific denylist the dispatcher
/// used to hardcode into a hook that runs for every tool.
pub struct DenyPatternHook {
    patterns: Vec<Regex>,
}

impl DenyPatternHook {
    pub fn from_config(config: &ExecSecurityConfig) -> Self {
        let patterns = config
            .denied_patterns
            .iter()
            .filter_map(|p| match Regex::new(p) {
                Ok(re) => Some(re),
                Err(e) => {
                    tracing::warn!(pattern = p, error = %e, "invalid denied_pattern regex, skipping");
                    None
                }
            })
            .collect();
        Self { patterns }
    }
}

impl ToolHook for DenyPatternHook {
    fn name(&self) -> &str {
        "deny_pattern"
    }

    fn before(&self, _tool_name: &str, arguments: &Value, _ctx: &ToolCallContext) -> HookDecision {
        let serialized = arguments.to_string();
        for re in &self.patterns {
            if re.is_match(&serialized) {
                return HookDecision::Deny {
                    hook: self.name().to_string(),
                    reason: format!("arguments match denied pattern `{}`", re.as_str()),
                };
            }
        }
        HookDecision::Allow
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns(pats: &[&str]) -> ExecSecurityConfig {
        ExecSecurityConfig {
            denied_patterns: pats.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn test_ctx() -> ToolCallContext<'static> {
        ToolCallContext {
            session_key: "agent:test:main",
            channel_id: Some("discord"),
            sender_id: Some("user-1"),
            correlation_id: "run-1",
            is_streaming: false,
        }
    }

    #[test]
    fn deny_pattern_allows_by_default() {
        let hook = DenyPatternHook::from_config(&ExecSecurityConfig::default());
        let args = serde_json::json!({"command": "ls -la"});
        assert_eq!(hook.before("exec", &args, &test_ctx()), HookDecision::Allow);
    }

    #[test]
    fn deny_pattern_vetoes_match() {
        let hook = DenyPatternHook::from_config(&patterns(&["rm\\s+-rf"]));
        let args = serde_json::json!({"command": "rm -rf /"});
        let decision = hook.before("exec", &args, &test_ctx());
        assert!(!decision.is_allowed());
    }

    #[test]
    fn deny_pattern_ignores_invalid_regex() {
        let hook = DenyPatternHook::from_config(&patterns(&["(unclosed"]));
        let args = serde_json::json!({"command": "anything"});
        assert_eq!(hook.before("exec", &args, &test_ctx()), HookDecision::Allow);
    }

    #[test]
    fn registry_first_deny_short_circuits() {
        struct AlwaysDeny;
        impl ToolHook for AlwaysDeny {
            fn name(&self) -> &str {
                "always_deny"
            }
            fn before(&self, _: &str, _: &Value, _: &ToolCallContext) -> HookDecision {
                HookDecision::Deny {
                    hook: "always_deny".into(),
                    reason: "nope".into(),
                }
            }
        }
        let mut registry = HookRegistry::new();
        registry.register(Arc::new(AlwaysDeny));
        registry.register(Arc::new(DenyPatternHook::from_config(&ExecSecurityConfig::default())));

        let decision = registry.run_before("memory.ingest", &serde_json::json!({}), &test_ctx());
        match decision {
            HookDecision::Deny { hook, .. } => assert_eq!(hook, "always_deny"),
            HookDecision::Allow => panic!("expected deny"),
        }
    }

    #[test]
    fn registry_allows_when_no_hooks_deny() {
        let mut registry = HookRegistry::new();
        registry.register(Arc::new(DenyPatternHook::from_config(&ExecSecurityConfig::default())));
        let decision =
            registry.run_before("memory.search", &serde_json::json!({"query": "x"}), &test_ctx());
        assert!(decision.is_allowed());
    }

    #[test]
    fn context_carries_channel_and_sender() {
        let ctx = test_ctx();
        assert_eq!(ctx.channel_id, Some("discord"));
        assert_eq!(ctx.sender_id, Some("user-1"));
        assert_eq!(ctx.correlation_id, "run-1");
        assert!(!ctx.is_streaming);
    }
}
