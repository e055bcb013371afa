//! Resilience layer — timeout, bounded exponential-backoff retry (decorrelated
//! jitter), and a circuit breaker, composed around any [`LlmProvider`].
//!
//! Composition order per call: cancellation is the caller's concern (the
//! agent runtime checks its `CancelToken` between iterations, not inside a
//! single provider call) → circuit check → timeout → attempt. A failed
//! attempt feeds back into the circuit breaker's consecutive-failure count
//! before the retry loop decides whether to try again.
//!
//! Grounded on [`crate::rest`]-style retry engines elsewhere in this
//! workspace (`RestSerialMemoryClient::execute_with_retry`): attempt loop,
//! retry only on transport/throttling/timeout, never on auth/client errors.
//! The backoff math's jitter shape is adapted from `node-sdk`'s
//! `ReconnectBackoff` (cheap multiplicative hash, no external RNG
//! dependency) but the jitter itself is decorrelated rather than proportional
//! — see `DESIGN.md` for why. The open/half-open/closed circuit breaker has
//! no direct precedent elsewhere in this workspace and is added fresh.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use orc_domain::capability::LlmCapabilities;
use orc_domain::error::{Error, Result};
use orc_domain::stream::{BoxStream, StreamEvent};
use orc_domain::trace::TraceEvent;

use crate::traits::{ChatRequest, ChatResponse, EmbeddingsRequest, EmbeddingsResponse, LlmProvider};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Tunables for [`ResilientProvider`]. Defaults are conservative: a handful
/// of quick retries, a circuit that trips after five straight failures and
/// cools down for half a minute.
#[derive(Debug, Clone)]
pub struct ResilienceConfig {
    /// Wall-clock timeout applied to a single attempt.
    pub call_timeout: Duration,
    /// Maximum number of retry attempts after the first try (so up to
    /// `max_retries + 1` total attempts).
    pub max_retries: u32,
    /// Lower bound of the decorrelated-jitter backoff range.
    pub base_backoff: Duration,
    /// Upper bound every computed delay is clamped to.
    pub max_backoff: Duration,
    /// Consecutive failures (that count toward the circuit, see
    /// [`Error::counts_as_circuit_failure`]) before the circuit opens.
    pub failure_threshold: u32,
    /// How long the circuit stays open before allowing a half-open probe.
    pub cooldown: Duration,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(60),
            max_retries: 3,
            base_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Circuit breaker
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    fn label(self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Per-provider circuit breaker. Serializes its own state transitions behind
/// a `parking_lot::Mutex`, independent of the retry loop above it.
struct CircuitBreaker {
    provider_id: String,
    failure_threshold: u32,
    cooldown: Duration,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    fn new(provider_id: String, failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            provider_id,
            failure_threshold,
            cooldown,
            state: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    /// Check whether a call may proceed. `Ok(())` means proceed (closed, or
    /// the single half-open probe). `Err(CircuitOpen)` means fail fast.
    fn admit(&self) -> Result<()> {
        let mut s = self.state.lock();
        match s.state {
            CircuitState::Closed => Ok(()),
            CircuitState::HalfOpen => Ok(()),
            CircuitState::Open => {
                let opened_at = s.opened_at.unwrap_or_else(Instant::now);
                let elapsed = opened_at.elapsed();
                if elapsed >= self.cooldown {
                    self.transition(&mut s, CircuitState::HalfOpen);
                    Ok(())
                } else {
                    Err(Error::CircuitOpen {
                        retry_after: self.cooldown - elapsed,
                    })
                }
            }
        }
    }

    fn record_success(&self) {
        let mut s = self.state.lock();
        if s.state != CircuitState::Closed {
            self.transition(&mut s, CircuitState::Closed);
        }
        s.consecutive_failures = 0;
        s.opened_at = None;
    }

    fn record_failure(&self) {
        let mut s = self.state.lock();
        s.consecutive_failures += 1;
        let should_open = s.state == CircuitState::HalfOpen || s.consecutive_failures >= self.failure_threshold;
        if should_open && s.state != CircuitState::Open {
            self.transition(&mut s, CircuitState::Open);
            s.opened_at = Some(Instant::now());
        }
    }

    fn transition(&self, s: &mut BreakerState, to: CircuitState) {
        if s.state == to {
            return;
        }
        tracing::info!(
            provider = %self.provider_id,
            from = s.state.label(),
            to = to.label(),
            "circuit breaker state change"
        );
        TraceEvent::CircuitStateChanged {
            provider: self.provider_id.clone(),
            from: s.state.label().into(),
            to: to.label().into(),
        }
        .emit();
        s.state = to;
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Backoff
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Decorrelated-jitter delay: sampled in `[base, min(cap, previous*3))`,
/// clamped to the `min(cap, base * 2^attempt)` envelope for the first
/// attempt (`previous == base`). `nonce` decorrelates calls that race on the
/// same `attempt` number across sessions without pulling in an RNG crate.
fn next_backoff(base: Duration, cap: Duration, previous: Duration, attempt: u32, nonce: u64) -> Duration {
    let base_ms = base.as_millis().max(1) as u64;
    let cap_ms = cap.as_millis().max(base_ms as u128) as u64;
    let prev_ms = (previous.as_millis() as u64).max(base_ms);

    let upper = cap_ms.min(prev_ms.saturating_mul(3)).max(base_ms);
    let envelope = cap_ms.min(base_ms.saturating_mul(1u64 << attempt.min(20)));
    let upper = upper.min(envelope.max(base_ms));

    let span = upper.saturating_sub(base_ms);
    let r = pseudo_random_fraction(attempt, nonce);
    Duration::from_millis(base_ms + (span as f64 * r) as u64)
}

/// Cheap deterministic "random" fraction in `[0, 1)`. Not cryptographically
/// secure — just enough to spread concurrent retries across sessions hitting
/// the same provider at the same moment.
fn pseudo_random_fraction(attempt: u32, nonce: u64) -> f64 {
    let mut h = (attempt as u64).wrapping_mul(2654435761) ^ nonce.wrapping_mul(0x9e3779b97f4a7c15);
    h ^= h >> 33;
    h = h.wrapping_mul(0xff51afd7ed558ccd);
    h ^= h >> 33;
    (h % 1_000_000) as f64 / 1_000_000.0
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ResilientProvider
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Wraps any [`LlmProvider`] with timeout, retry, and a circuit breaker. The
/// wrapper itself implements `LlmProvider`, so it can be registered and used
/// anywhere the inner provider would be.
pub struct ResilientProvider {
    inner: Arc<dyn LlmProvider>,
    config: ResilienceConfig,
    breaker: CircuitBreaker,
    call_seq: AtomicU64,
}

impl ResilientProvider {
    pub fn new(inner: Arc<dyn LlmProvider>, config: ResilienceConfig) -> Self {
        let provider_id = inner.provider_id().to_owned();
        Self {
            breaker: CircuitBreaker::new(provider_id, config.failure_threshold, config.cooldown),
            inner,
            config,
            call_seq: AtomicU64::new(0),
        }
    }

    /// Run `attempt` (a single try at the underlying call) under the timeout
    /// + retry + circuit-breaker policy.
    async fn run_resilient<T, F, Fut>(&self, op: &str, attempt: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let nonce = self.call_seq.fetch_add(1, Ordering::Relaxed);
        let mut previous = self.config.base_backoff;

        for n in 0..=self.config.max_retries {
            self.breaker.admit()?;

            let result = tokio::time::timeout(self.config.call_timeout, attempt()).await;

            let err = match result {
                Ok(Ok(value)) => {
                    self.breaker.record_success();
                    return Ok(value);
                }
                Ok(Err(e)) => e,
                Err(_) => Error::Timeout(format!("{op} timed out after {:?}", self.config.call_timeout)),
            };

            if err.counts_as_circuit_failure() {
                self.breaker.record_failure();
            }

            if !err.is_retryable() || n == self.config.max_retries {
                return Err(err);
            }

            let delay = next_backoff(self.config.base_backoff, self.config.max_backoff, previous, n, nonce);
            previous = delay;
            tracing::warn!(
                provider = self.inner.provider_id(),
                op,
                attempt = n,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "retrying after resilience-layer failure"
            );
            tokio::time::sleep(delay).await;
        }

        unreachable!("loop always returns on the final iteration")
    }
}

#[async_trait]
impl LlmProvider for ResilientProvider {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse> {
        self.run_resilient("chat", || self.inner.chat(req.clone())).await
    }

    async fn chat_stream(&self, req: ChatRequest) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        // Retry/timeout/circuit apply to establishing the stream. Once it's
        // flowing, events (including a terminal `StreamEvent::Error`) pass
        // through unmodified — the agent runtime's turn loop owns deciding
        // what to do with a mid-stream error.
        self.run_resilient("chat_stream", || self.inner.chat_stream(req.clone()))
            .await
    }

    async fn embeddings(&self, req: EmbeddingsRequest) -> Result<EmbeddingsResponse> {
        self.run_resilient("embeddings", || self.inner.embeddings(req.clone()))
            .await
    }

    fn capabilities(&self) -> &LlmCapabilities {
        self.inner.capabilities()
    }

    fn provider_id(&self) -> &str {
        self.inner.provider_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct FlakyProvider {
        id: String,
        caps: LlmCapabilities,
        fail_times: usize,
        calls: AtomicUsize,
        terminal_err: fn() -> Error,
    }

    #[async_trait]
    impl LlmProvider for FlakyProvider {
        async fn chat(&self, _req: ChatRequest) -> Result<ChatResponse> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_times {
                return Err((self.terminal_err)());
            }
            Ok(ChatResponse {
                content: "ok".into(),
                tool_calls: vec![],
                usage: None,
                model: "test".into(),
                finish_reason: Some("stop".into()),
            })
        }

        async fn chat_stream(&self, _req: ChatRequest) -> Result<BoxStream<'static, Result<StreamEvent>>> {
            unimplemented!()
        }

        async fn embeddings(&self, _req: EmbeddingsRequest) -> Result<EmbeddingsResponse> {
            unimplemented!()
        }

        fn capabilities(&self) -> &LlmCapabilities {
            &self.caps
        }

        fn provider_id(&self) -> &str {
            &self.id
        }
    }

    fn fast_config() -> ResilienceConfig {
        ResilienceConfig {
            call_timeout: Duration::from_secs(5),
            max_retries: 3,
            base_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(20),
            failure_threshold: 2,
            cooldown: Duration::from_millis(50),
        }
    }

    #[tokio::test]
    async fn retries_transport_errors_and_eventually_succeeds() {
        let inner = Arc::new(FlakyProvider {
            id: "flaky".into(),
            caps: LlmCapabilities::default(),
            fail_times: 2,
            calls: AtomicUsize::new(0),
            terminal_err: || Error::Transport("boom".into()),
        });
        let provider = ResilientProvider::new(inner, fast_config());

        let resp = provider.chat(ChatRequest::default()).await.unwrap();
        assert_eq!(resp.content, "ok");
    }

    #[tokio::test]
    async fn does_not_retry_client_errors() {
        let inner = Arc::new(FlakyProvider {
            id: "flaky".into(),
            caps: LlmCapabilities::default(),
            fail_times: 100,
            calls: AtomicUsize::new(0),
            terminal_err: || Error::Client("bad request".into()),
        });
        let provider = ResilientProvider::new(inner.clone(), fast_config());

        let err = provider.chat(ChatRequest::default()).await.unwrap_err();
        assert!(matches!(err, Error::Client(_)));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn circuit_opens_after_threshold_and_fails_fast() {
        let inner = Arc::new(FlakyProvider {
            id: "flaky".into(),
            caps: LlmCapabilities::default(),
            fail_times: 100,
            calls: AtomicUsize::new(0),
            terminal_err: || Error::Transport("down".into()),
        });
        let mut cfg = fast_config();
        cfg.max_retries = 0;
        let provider = ResilientProvider::new(inner.clone(), cfg);

        // Two calls, each exhausting its single attempt, trips the breaker
        // (failure_threshold = 2).
        let _ = provider.chat(ChatRequest::default()).await;
        let _ = provider.chat(ChatRequest::default()).await;

        let calls_before = inner.calls.load(Ordering::SeqCst);
        let err = provider.chat(ChatRequest::default()).await.unwrap_err();
        assert!(matches!(err, Error::CircuitOpen { .. }));
        // The circuit-open call never reached the inner provider.
        assert_eq!(inner.calls.load(Ordering::SeqCst), calls_before);
    }

    #[tokio::test]
    async fn cancellation_never_trips_circuit() {
        let inner = Arc::new(FlakyProvider {
            id: "flaky".into(),
            caps: LlmCapabilities::default(),
            fail_times: 100,
            calls: AtomicUsize::new(0),
            terminal_err: || Error::Cancelled("stopped".into()),
        });
        let mut cfg = fast_config();
        cfg.max_retries = 0;
        cfg.failure_threshold = 1;
        let provider = ResilientProvider::new(inner, cfg);

        let _ = provider.chat(ChatRequest::default()).await;
        // A second call should still be admitted — cancellation never counts
        // against the breaker.
        let err = provider.chat(ChatRequest::default()).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled(_)));
    }

    #[test]
    fn backoff_grows_and_is_capped() {
        let base = Duration::from_millis(100);
        let cap = Duration::from_secs(10);
        let d0 = next_backoff(base, cap, base, 0, 1);
        let d5 = next_backoff(base, cap, cap, 5, 1);
        assert!(d0 >= base);
        assert!(d5 <= cap);
    }
}
