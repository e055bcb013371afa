//! AppState construction and background-task spawning extracted from `main.rs`.
//!
//! This module exposes two public functions that CLI commands (`serve`, `run`,
//! `chat`) share so they can boot the full runtime without an HTTP listener.

use std::sync::Arc;

use anyhow::Context;
use sha2::{Digest, Sha256};

use orc_domain::config::{Config, ConfigSeverity};
use orc_memory::create_provider as create_memory_provider;
use orc_providers::registry::ProviderRegistry;
use orc_sessions::{
    BranchStore, IdentityResolver, LifecycleManager, NoteStore, SessionStore, TranscriptWriter,
};

use crate::runtime::hooks::{DenyPatternHook, HookRegistry};
use crate::runtime::middleware::MiddlewarePipeline;
use crate::state::AppState;

/// Validate config, initialize every subsystem and return a fully-wired
/// [`AppState`].  This is the shared "boot" path used by `serve`, `run` and
/// `chat`.
pub async fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── SerialMemory client ──────────────────────────────────────────
    let memory: Arc<dyn orc_memory::SerialMemoryProvider> =
        create_memory_provider(&config.serial_memory).context("creating SerialMemory client")?;
    tracing::info!(
        url = %config.serial_memory.base_url,
        transport = ?config.serial_memory.transport,
        "SerialMemory client ready"
    );

    // ── LLM providers ────────────────────────────────────────────────
    let llm =
        Arc::new(ProviderRegistry::from_config(&config.llm).context("initializing LLM providers")?);
    if llm.is_empty() {
        tracing::info!("no LLM providers initialized — configure API keys to enable LLM endpoints");
    } else {
        tracing::info!(providers = llm.len(), "LLM provider registry ready");
    }

    // ── Session management ───────────────────────────────────────────
    let sessions = Arc::new(
        SessionStore::new(&config.workspace.state_path).context("initializing session store")?,
    );
    let identity = Arc::new(IdentityResolver::from_config(&config.sessions.identity_links));
    let lifecycle = Arc::new(LifecycleManager::new(config.sessions.lifecycle.clone()));
    let transcript_dir = sessions.transcript_dir();
    let transcripts = Arc::new(TranscriptWriter::new(&transcript_dir));
    tracing::info!(
        agent_id = %config.sessions.agent_id,
        dm_scope = ?config.sessions.dm_scope,
        identity_links = identity.len(),
        "session management ready"
    );

    // ── Session locks (per-session concurrency) ──────────────────────
    let session_locks = Arc::new(crate::runtime::session_lock::SessionLockMap::new());
    tracing::info!("session lock map ready");

    // ── Notes and branches (filesystem-backed, separate from transcripts) ──
    let notes =
        Arc::new(NoteStore::new(&config.workspace.state_path).context("initializing note store")?);
    let branches = Arc::new(BranchStore::new(
        &config.workspace.state_path.join("sessions").join("branches"),
    ));
    tracing::info!("notes and branches ready");

    // ── Cancel map (per-session cancellation) ─────────────────────────
    let cancel_map = Arc::new(crate::runtime::cancel::CancelMap::new());
    tracing::info!("cancel map ready");

    // ── Quota tracker (per-agent daily limits) ──────────────────────
    let quota_tracker = Arc::new(crate::runtime::quota::QuotaTracker::new(config.quota.clone()));
    tracing::info!("quota tracker ready");

    // ── Dedupe store (inbound idempotency, 24h TTL) ────────────────
    let dedupe = Arc::new(crate::api::inbound::DedupeStore::new(
        std::time::Duration::from_secs(86_400),
    ));
    tracing::info!("dedupe store ready (24h TTL)");

    // ── Run store ────────────────────────────────────────────────────
    let run_store = Arc::new(crate::runtime::runs::RunStore::new(&config.workspace.state_path));
    tracing::info!("run store ready");

    // ── Tool hooks ────────────────────────────────────────────────────
    let mut hooks = HookRegistry::new();
    hooks.register(Arc::new(DenyPatternHook::from_config(&config.tools.exec_security)));
    tracing::info!(
        patterns = config.tools.exec_security.denied_patterns.len(),
        "tool hooks ready"
    );

    // ── Tool approvals ────────────────────────────────────────────────
    let approval_store = Arc::new(crate::runtime::approval::ApprovalStore::new(
        std::time::Duration::from_secs(config.tools.approval_timeout_sec),
    ));
    tracing::info!(
        approval_required_tools = config.tools.approval_required_tools.len(),
        "tool approval store ready"
    );

    // ── Middleware pipeline (rate limit, token budget, audit) ────────
    let middleware = MiddlewarePipeline::from_config(&config.middleware);
    tracing::info!("middleware pipeline ready");

    // ── API token (read once, hash for constant-time comparison) ────
    // Priority: config.server.api_token > env var (config.server.api_token_env)
    let api_token_hash = {
        let env_var = &config.server.api_token_env;
        let token = config
            .server
            .api_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .map(|t| ("config".to_string(), t.to_string()))
            .or_else(|| {
                std::env::var(env_var)
                    .ok()
                    .filter(|t| !t.is_empty())
                    .map(|t| (format!("env:{env_var}"), t))
            });
        match token {
            Some((source, t)) => {
                tracing::info!(source = %source, "API bearer-token auth enabled");
                Some(Sha256::digest(t.as_bytes()).to_vec())
            }
            None => {
                tracing::warn!(
                    "API bearer-token auth DISABLED — set server.api_token in config.toml or {env_var} env var"
                );
                None
            }
        }
    };

    // ── Admin token (read once, hash for constant-time comparison) ──
    // Priority: config.admin.token > env var (config.admin.token_env)
    let admin_token_hash = {
        let env_var = &config.admin.token_env;
        let token = config
            .admin
            .token
            .as_deref()
            .filter(|t| !t.is_empty())
            .map(|t| ("config".to_string(), t.to_string()))
            .or_else(|| {
                std::env::var(env_var)
                    .ok()
                    .filter(|t| !t.is_empty())
                    .map(|t| (format!("env:{env_var}"), t))
            });
        match token {
            Some((source, t)) => {
                tracing::info!(source = %source, "admin bearer-token auth enabled");
                Some(Sha256::digest(t.as_bytes()).to_vec())
            }
            None => {
                tracing::warn!(
                    "admin bearer-token auth DISABLED — set admin.token in config.toml or {env_var} env var"
                );
                None
            }
        }
    };

    // ── App state (without agents — needed for AgentManager init) ───
    let mut state = AppState {
        config: config.clone(),
        memory,
        llm,
        sessions,
        identity,
        lifecycle,
        transcripts,
        session_locks,
        notes,
        branches,
        cancel_map,
        quota_tracker,
        agents: None,
        hooks,
        approval_store,
        middleware,
        dedupe,
        run_store,
        user_facts_cache: Arc::new(parking_lot::RwLock::new(std::collections::HashMap::new())),
        api_token_hash,
        admin_token_hash,
    };

    // ── Agent manager (sub-agents) ──────────────────────────────────
    if !config.agents.is_empty() {
        let agent_mgr = crate::runtime::agent::AgentManager::from_config(&state);
        tracing::info!(agent_count = agent_mgr.len(), "agent manager ready");
        state.agents = Some(Arc::new(agent_mgr));
    }

    Ok(state)
}

/// Spawn the long-running background tokio tasks (session flush, session
/// lock pruning).
///
/// Call this **after** [`build_app_state`] when running the HTTP server.
/// CLI one-shot commands (`run`, `chat`) typically skip this.
pub fn spawn_background_tasks(state: &AppState) {
    // ── Periodic session flush ───────────────────────────────────────
    {
        let sessions = state.sessions.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(30));
            loop {
                interval.tick().await;
                if let Err(e) = sessions.flush().await {
                    tracing::warn!(error = %e, "session store flush failed");
                }
            }
        });
    }

    // ── Periodic session lock pruning ────────────────────────────────
    {
        let session_locks = state.session_locks.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
            loop {
                interval.tick().await;
                session_locks.prune_idle();
            }
        });
    }

    // ── Idle sweep ────────────────────────────────────────────────────
    // Demotes sessions whose `updated_at` is older than
    // `sessions.session_timeout_minutes` to `SessionState::Idle` and flushes
    // the store. `None` disables the sweep entirely (SPEC_FULL §4.1).
    if let Some(minutes) = state.config.sessions.session_timeout_minutes {
        let sessions = state.sessions.clone();
        let timeout = chrono::Duration::minutes(minutes as i64);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
            loop {
                interval.tick().await;
                let swept = sessions.sweep_idle(timeout);
                if !swept.is_empty() {
                    tracing::debug!(count = swept.len(), "idle sweep: sessions marked idle");
                    if let Err(e) = sessions.flush().await {
                        tracing::warn!(error = %e, "session store flush failed after idle sweep");
                    }
                }
            }
        });
    }

    tracing::info!("background tasks spawned");
}
