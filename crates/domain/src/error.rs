/// Shared error type used across all orchestration-core crates.
///
/// Variants map onto the error taxonomy the resilience layer and the agent
/// runtime reason about: transport/throttling/timeout are retried by the
/// resilience layer before surfacing as [`Error::Internal`]; auth/client are
/// never retried; the remaining variants are produced by the tool dispatcher,
/// the session/memory store, and the circuit breaker respectively.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("SerialMemory: {0}")]
    SerialMemory(String),

    #[error("skill not found: {0}")]
    SkillNotFound(String),

    #[error("config: {0}")]
    Config(String),

    #[error("auth: {0}")]
    Auth(String),

    /// A network-level failure (connection refused/reset, DNS, etc.) or a
    /// retryable HTTP status (408/429/5xx). Retried by the resilience layer.
    #[error("transport: {0}")]
    Transport(String),

    /// Provider signalled rate limiting (HTTP 429). Carries the provider's
    /// `retry-after` hint when present. Retried by the resilience layer.
    #[error("throttled: {message}")]
    Throttling {
        message: String,
        retry_after: Option<std::time::Duration>,
    },

    /// A non-retryable 4xx other than 408/429, or a request the provider
    /// rejected outright (bad request, unsupported model). Not retried.
    #[error("client error: {0}")]
    Client(String),

    /// The circuit breaker is open; calls fail fast without reaching the
    /// provider. Carries a hint for when the caller may retry.
    #[error("service temporarily unavailable, retry after {retry_after:?}")]
    CircuitOpen { retry_after: std::time::Duration },

    /// A `Before` tool hook vetoed execution.
    #[error("tool '{tool}' denied by hook: {reason}")]
    ToolDeniedByHook { tool: String, reason: String },

    /// The approval gate denied the tool call, or no approval callback was
    /// registered for a tool requiring approval.
    #[error("tool '{tool}' requires approval: {reason}")]
    ToolDeniedByApproval { tool: String, reason: String },

    /// The tool executed but returned an error result.
    #[error("tool '{tool}' execution failed: {message}")]
    ToolExecution { tool: String, message: String },

    /// The turn (or a sub-operation of it) was cancelled by its caller.
    /// Never counted as a resilience-layer failure.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// The memory store failed to read or write. Logged; the in-memory
    /// session remains authoritative and the turn continues.
    #[error("storage: {0}")]
    Storage(String),

    /// An unexpected internal error — the catch-all surfaced to a caller
    /// after transport/throttling/timeout retries are exhausted.
    #[error("internal: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the resilience layer should retry a call that failed with
    /// this error. Per §4.3/§7: transport, throttling, and timeout are
    /// retryable; auth, client, circuit-open, and cancellation are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Transport(_) | Error::Throttling { .. } | Error::Timeout(_)
        )
    }

    /// Whether this error should ever count against the circuit breaker's
    /// consecutive-failure counter. Cancellation never counts as a failure.
    pub fn counts_as_circuit_failure(&self) -> bool {
        !matches!(self, Error::Cancelled(_) | Error::CircuitOpen { .. })
    }

    /// A bounded, non-sensitive message safe to surface to an end user as
    /// the final assistant message. No raw provider error text is ever
    /// echoed back (§7).
    pub fn user_facing_message(&self) -> String {
        match self {
            Error::Auth(_) => "authentication with the LLM provider failed".into(),
            Error::Client(_) => "the request could not be processed".into(),
            Error::CircuitOpen { retry_after } => format!(
                "service temporarily unavailable, try again in {}s",
                retry_after.as_secs()
            ),
            Error::Throttling { .. } => "the provider is rate-limiting requests, try again shortly".into(),
            Error::Transport(_) | Error::Timeout(_) | Error::Internal(_) => {
                "an internal error occurred while contacting the LLM provider".into()
            }
            Error::Cancelled(_) => "the request was cancelled".into(),
            _ => "an internal error occurred".into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds() {
        assert!(Error::Transport("x".into()).is_retryable());
        assert!(Error::Timeout("x".into()).is_retryable());
        assert!(Error::Throttling {
            message: "x".into(),
            retry_after: None
        }
        .is_retryable());
        assert!(!Error::Auth("x".into()).is_retryable());
        assert!(!Error::Client("x".into()).is_retryable());
        assert!(!Error::Cancelled("x".into()).is_retryable());
    }

    #[test]
    fn cancellation_never_counts_as_circuit_failure() {
        assert!(!Error::Cancelled("x".into()).counts_as_circuit_failure());
        assert!(Error::Transport("x".into()).counts_as_circuit_failure());
    }

    #[test]
    fn user_facing_message_never_echoes_raw_text() {
        let e = Error::Auth("leaked-api-key-xyz".into());
        assert!(!e.user_facing_message().contains("leaked-api-key-xyz"));
    }
}
