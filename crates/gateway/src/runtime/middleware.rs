//! Middleware pipeline — ordered admission checks that run before a turn
//! is allowed to start.
//!
//! The teacher has no standalone middleware abstraction of its own (CORS
//! and rate limiting are `tower`/`axum` HTTP layers, not agent-turn
//! concerns); this is added fresh in the same "concrete value, ordered
//! `Vec<Arc<dyn _>>`" shape already used for hooks, providers, and agents.
//! First short-circuit wins: a middleware that denies stops the chain and
//! its message is surfaced directly, later middlewares don't run.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use orc_domain::config::MiddlewareConfig;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// MessageContext / MiddlewareDecision
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Everything an admission middleware needs to judge whether a turn may
/// proceed. Built once per inbound turn, before `run_turn` is invoked.
pub struct MessageContext<'a> {
    pub session_key: &'a str,
    pub agent_id: Option<&'a str>,
    /// Tokens already consumed by this session (from `SessionStore`).
    pub session_tokens_used: u64,
}

/// The result of running a turn through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MiddlewareDecision {
    Continue,
    ShortCircuit { middleware: String, message: String },
}

impl MiddlewareDecision {
    pub fn is_continue(&self) -> bool {
        matches!(self, MiddlewareDecision::Continue)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Middleware trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub trait Middleware: Send + Sync {
    fn name(&self) -> &str;
    fn invoke(&self, ctx: &MessageContext) -> MiddlewareDecision;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Pipeline
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Clone, Default)]
pub struct MiddlewarePipeline {
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl MiddlewarePipeline {
    pub fn new() -> Self {
        Self {
            middlewares: Vec::new(),
        }
    }

    pub fn register(&mut self, middleware: Arc<dyn Middleware>) {
        self.middlewares.push(middleware);
    }

    /// Build the default pipeline (`RateLimit` then `TokenBudget` then
    /// `Audit`) from config. Middlewares whose budget is `0` (disabled)
    /// are still registered — they simply always continue.
    pub fn from_config(config: &MiddlewareConfig) -> Self {
        let mut pipeline = Self::new();
        pipeline.register(Arc::new(RateLimitMiddleware::new(
            config.session_rate_limit_per_minute,
        )));
        pipeline.register(Arc::new(TokenBudgetMiddleware::new(
            config.session_token_budget,
        )));
        pipeline.register(Arc::new(AuditMiddleware::new(config.audit_log_enabled)));
        pipeline
    }

    /// Run every middleware in order; the first short-circuit wins.
    pub fn run(&self, ctx: &MessageContext) -> MiddlewareDecision {
        for mw in &self.middlewares {
            let decision = mw.invoke(ctx);
            if !decision.is_continue() {
                return decision;
            }
        }
        MiddlewareDecision::Continue
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// RateLimit — per-session fixed-window counter
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Caps inbound turns per session within a rolling 60s window. Grounded on
/// the fixed-window counter shape implied by `tower_governor`'s GCRA config,
/// simplified here to a per-session window since this runs in-process
/// ahead of the HTTP-level governor layer.
pub struct RateLimitMiddleware {
    limit_per_minute: u32,
    windows: Mutex<HashMap<String, (Instant, u32)>>,
}

impl RateLimitMiddleware {
    pub fn new(limit_per_minute: u32) -> Self {
        Self {
            limit_per_minute,
            windows: Mutex::new(HashMap::new()),
        }
    }
}

impl Middleware for RateLimitMiddleware {
    fn name(&self) -> &str {
        "rate_limit"
    }

    fn invoke(&self, ctx: &MessageContext) -> MiddlewareDecision {
        if self.limit_per_minute == 0 {
            return MiddlewareDecision::Continue;
        }

        let mut windows = self.windows.lock();
        let now = Instant::now();
        let entry = windows
            .entry(ctx.session_key.to_string())
            .or_insert((now, 0));

        if now.duration_since(entry.0).as_secs() >= 60 {
            *entry = (now, 0);
        }

        entry.1 += 1;
        if entry.1 > self.limit_per_minute {
            return MiddlewareDecision::ShortCircuit {
                middleware: self.name().into(),
                message: format!(
                    "rate limit exceeded: {} turns/minute for session {}",
                    self.limit_per_minute, ctx.session_key
                ),
            };
        }

        MiddlewareDecision::Continue
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TokenBudget — cumulative session token cap
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Caps cumulative tokens (input + output) a session may consume. Grounded
/// directly on the quota tracker's daily-budget shape
/// (`runtime::quota::QuotaTracker`), applied per-session instead of per-agent.
pub struct TokenBudgetMiddleware {
    budget: u64,
}

impl TokenBudgetMiddleware {
    pub fn new(budget: u64) -> Self {
        Self { budget }
    }
}

impl Middleware for TokenBudgetMiddleware {
    fn name(&self) -> &str {
        "token_budget"
    }

    fn invoke(&self, ctx: &MessageContext) -> MiddlewareDecision {
        if self.budget == 0 {
            return MiddlewareDecision::Continue;
        }
        if ctx.session_tokens_used >= self.budget {
            return MiddlewareDecision::ShortCircuit {
                middleware: self.name().into(),
                message: format!(
                    "session token budget exhausted: {}/{} tokens used",
                    ctx.session_tokens_used, self.budget
                ),
            };
        }
        MiddlewareDecision::Continue
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Audit — always continues, logs admitted turns
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct AuditMiddleware {
    enabled: bool,
}

impl AuditMiddleware {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

impl Middleware for AuditMiddleware {
    fn name(&self) -> &str {
        "audit"
    }

    fn invoke(&self, ctx: &MessageContext) -> MiddlewareDecision {
        if self.enabled {
            tracing::info!(
                session_key = ctx.session_key,
                agent_id = ctx.agent_id,
                "turn admitted"
            );
        }
        MiddlewareDecision::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(session_key: &str, tokens_used: u64) -> MessageContext {
        MessageContext {
            session_key,
            agent_id: None,
            session_tokens_used: tokens_used,
        }
    }

    #[test]
    fn rate_limit_disabled_when_zero() {
        let mw = RateLimitMiddleware::new(0);
        for _ in 0..100 {
            assert!(mw.invoke(&ctx("sk", 0)).is_continue());
        }
    }

    #[test]
    fn rate_limit_short_circuits_over_threshold() {
        let mw = RateLimitMiddleware::new(2);
        assert!(mw.invoke(&ctx("sk", 0)).is_continue());
        assert!(mw.invoke(&ctx("sk", 0)).is_continue());
        assert!(!mw.invoke(&ctx("sk", 0)).is_continue());
    }

    #[test]
    fn rate_limit_tracks_sessions_independently() {
        let mw = RateLimitMiddleware::new(1);
        assert!(mw.invoke(&ctx("a", 0)).is_continue());
        assert!(mw.invoke(&ctx("b", 0)).is_continue());
        assert!(!mw.invoke(&ctx("a", 0)).is_continue());
    }

    #[test]
    fn token_budget_disabled_when_zero() {
        let mw = TokenBudgetMiddleware::new(0);
        assert!(mw.invoke(&ctx("sk", 1_000_000)).is_continue());
    }

    #[test]
    fn token_budget_short_circuits_when_exhausted() {
        let mw = TokenBudgetMiddleware::new(1000);
        assert!(mw.invoke(&ctx("sk", 999)).is_continue());
        assert!(!mw.invoke(&ctx("sk", 1000)).is_continue());
    }

    #[test]
    fn pipeline_first_short_circuit_wins() {
        let mut pipeline = MiddlewarePipeline::new();
        pipeline.register(Arc::new(TokenBudgetMiddleware::new(10)));
        pipeline.register(Arc::new(RateLimitMiddleware::new(1)));

        let decision = pipeline.run(&ctx("sk", 10));
        match decision {
            MiddlewareDecision::ShortCircuit { middleware, .. } => {
                assert_eq!(middleware, "token_budget");
            }
            MiddlewareDecision::Continue => panic!("expected short circuit"),
        }
    }

    #[test]
    fn pipeline_continues_when_all_pass() {
        let pipeline = MiddlewarePipeline::from_config(&MiddlewareConfig::default());
        assert!(pipeline.run(&ctx("sk", 0)).is_continue());
    }
}
