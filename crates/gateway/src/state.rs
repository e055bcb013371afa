use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;

use orc_domain::config::Config;
use orc_memory::provider::SerialMemoryProvider;
use orc_providers::registry::ProviderRegistry;
use orc_sessions::{
    BranchStore, IdentityResolver, LifecycleManager, NoteStore, SessionStore, TranscriptWriter,
};

use crate::api::inbound::DedupeStore;
use crate::runtime::agent::AgentManager;
use crate::runtime::approval::ApprovalStore;
use crate::runtime::cancel::CancelMap;
use crate::runtime::hooks::HookRegistry;
use crate::runtime::middleware::MiddlewarePipeline;
use crate::runtime::quota::QuotaTracker;
use crate::runtime::runs::RunStore;
use crate::runtime::session_lock::SessionLockMap;

/// Cached user facts with a TTL.
#[derive(Clone)]
pub struct CachedUserFacts {
    pub content: String,
    pub fetched_at: Instant,
}

/// Shared application state passed to all API handlers.
///
/// Fields are grouped by concern:
/// - **Core services** — config, memory, LLM providers
/// - **Session management** — sessions, identity, lifecycle, transcripts
/// - **Runtime** — runs, agents, quota, cancellation
/// - **Dispatch** — tool hooks, approvals, middleware
/// - **Security & caching** — token hashes, user-fact cache
#[derive(Clone)]
pub struct AppState {
    // ── Core services ─────────────────────────────────────────────────
    pub config: Arc<Config>,
    pub memory: Arc<dyn SerialMemoryProvider>,
    pub llm: Arc<ProviderRegistry>,

    // ── Session management ────────────────────────────────────────────
    pub sessions: Arc<SessionStore>,
    pub identity: Arc<IdentityResolver>,
    pub lifecycle: Arc<LifecycleManager>,
    pub transcripts: Arc<TranscriptWriter>,
    pub session_locks: Arc<SessionLockMap>,
    /// Freeform key/value notes, separate from the transcript-backed session store.
    pub notes: Arc<NoteStore>,
    /// Named transcript snapshots a session can branch to and restore from.
    pub branches: Arc<BranchStore>,

    // ── Runtime ───────────────────────────────────────────────────────
    /// Run execution tracker.
    pub run_store: Arc<RunStore>,
    /// Sub-agent manager. `None` if no agents are configured.
    pub agents: Option<Arc<AgentManager>>,
    pub cancel_map: Arc<CancelMap>,
    /// Per-agent daily token/cost quota enforcement.
    pub quota_tracker: Arc<QuotaTracker>,

    // ── Tool dispatch ─────────────────────────────────────────────────
    /// `Before`/`After` interceptor chain run around every tool dispatch.
    pub hooks: HookRegistry,
    /// Pending tool approvals awaiting human decision.
    pub approval_store: Arc<ApprovalStore>,
    /// Turn admission pipeline (rate limit, token budget, audit).
    pub middleware: MiddlewarePipeline,

    // ── Inbound ───────────────────────────────────────────────────────
    /// Idempotency store for inbound event deduplication.
    pub dedupe: Arc<DedupeStore>,

    // ── Security (startup-computed) ───────────────────────────────────
    /// SHA-256 hash of the API bearer token (read once at startup).
    /// `None` = dev mode (no auth enforced).
    pub api_token_hash: Option<Vec<u8>>,
    /// SHA-256 hash of the admin bearer token (read once at startup).
    /// `None` = dev mode (admin endpoints accessible without auth).
    pub admin_token_hash: Option<Vec<u8>>,

    // ── Caches ────────────────────────────────────────────────────────
    /// Per-user TTL cache for user facts (avoids network calls every turn).
    pub user_facts_cache: Arc<RwLock<HashMap<String, CachedUserFacts>>>,
}
