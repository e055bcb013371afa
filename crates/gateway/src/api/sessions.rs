//! Session management API endpoints.
//!
//! These endpoints expose the gateway-owned session store (OpenClaw model)
//! alongside the existing SerialMemory session proxy.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use orc_domain::config::InboundMetadata;
use orc_sessions::store::SessionOrigin;

use crate::state::AppState;

fn not_found(message: impl Into<String>) -> axum::response::Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": message.into() })),
    )
        .into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/sessions/resolve
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Request body for session resolution.
#[derive(Debug, Deserialize)]
pub struct ResolveSessionBody {
    /// Connector name: `"discord"`, `"telegram"`, etc.
    #[serde(default)]
    pub channel: Option<String>,
    /// Bot account ID.
    #[serde(default)]
    pub account_id: Option<String>,
    /// Raw peer ID of the sender.
    #[serde(default)]
    pub peer_id: Option<String>,
    /// Group/server ID (for non-DM messages).
    #[serde(default)]
    pub group_id: Option<String>,
    /// Channel within a group.
    #[serde(default)]
    pub channel_id: Option<String>,
    /// Thread or topic ID.
    #[serde(default)]
    pub thread_id: Option<String>,
    /// Whether this is a direct/private message.
    #[serde(default)]
    pub is_direct: bool,
}

/// Resolve (or create) a session from inbound metadata.
///
/// This is the main entry point for connectors: send the message metadata,
/// get back a stable session with key, ID, and origin.  Lifecycle resets
/// (daily, idle) are evaluated automatically.
pub async fn resolve_session(
    State(state): State<AppState>,
    Json(body): Json<ResolveSessionBody>,
) -> impl IntoResponse {
    // 1. Resolve peer identity.
    let resolved_peer = body
        .peer_id
        .as_deref()
        .map(|pid| state.identity.resolve(pid));

    // 2. Build inbound metadata with resolved identity.
    let meta = InboundMetadata {
        channel: body.channel.clone(),
        account_id: body.account_id.clone(),
        peer_id: resolved_peer.clone(),
        group_id: body.group_id.clone(),
        channel_id: body.channel_id.clone(),
        thread_id: body.thread_id.clone(),
        is_direct: body.is_direct,
    };

    // 3. Compute session key.
    let session_key = orc_sessions::compute_session_key(
        &state.config.sessions.agent_id,
        state.config.sessions.dm_scope,
        &meta,
    );

    // 4. Resolve or create the session.
    let origin = SessionOrigin {
        channel: body.channel.clone(),
        account: body.account_id.clone(),
        peer: resolved_peer,
        group: body.group_id.clone(),
    };
    let (mut entry, is_new) = state.sessions.resolve_or_create(&session_key, origin);

    // 5. Evaluate lifecycle reset if session is not new.
    if !is_new {
        if let Some(reason) = state.lifecycle.should_reset(&entry, &meta, chrono::Utc::now()) {
            let reason_str = reason.to_string();
            if let Some(reset_entry) = state.sessions.reset_session(&session_key, &reason_str) {
                entry = reset_entry;
            }
        } else {
            state.sessions.touch(&session_key);
        }
    }

    Json(serde_json::json!({
        "session_key": entry.session_key,
        "session_id": entry.session_id,
        "is_new": is_new,
        "created_at": entry.created_at.to_rfc3339(),
        "updated_at": entry.updated_at.to_rfc3339(),
        "origin": entry.origin,
        "sm_session_id": entry.sm_session_id,
        "tokens": {
            "input": entry.input_tokens,
            "output": entry.output_tokens,
            "total": entry.total_tokens,
            "context": entry.context_tokens,
        }
    }))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /v1/sessions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// List all active sessions.
pub async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    let sessions = state.sessions.list();
    Json(serde_json::json!({
        "sessions": sessions,
        "count": sessions.len(),
    }))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/sessions/reset
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct ResetSessionBody {
    pub session_key: String,
}

/// Manually reset a session (equivalent to `/new` or `/reset` commands).
pub async fn reset_session(
    State(state): State<AppState>,
    Json(body): Json<ResetSessionBody>,
) -> impl IntoResponse {
    match state.sessions.reset_session(&body.session_key, "manual reset") {
        Some(entry) => Json(serde_json::json!({
            "session_key": entry.session_key,
            "session_id": entry.session_id,
            "reset": true,
        }))
        .into_response(),
        None => (
            axum::http::StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "session not found" })),
        )
            .into_response(),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /v1/sessions/:key
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Fetch a single session's metadata by its session key.
pub async fn get_session(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> impl IntoResponse {
    match state.sessions.get(&key) {
        Some(entry) => Json(serde_json::json!({
            "session_key": entry.session_key,
            "session_id": entry.session_id,
            "created_at": entry.created_at.to_rfc3339(),
            "updated_at": entry.updated_at.to_rfc3339(),
            "model": entry.model,
            "origin": entry.origin,
            "sm_session_id": entry.sm_session_id,
            "tokens": {
                "input": entry.input_tokens,
                "output": entry.output_tokens,
                "total": entry.total_tokens,
                "context": entry.context_tokens,
            },
            "running": state.cancel_map.is_running(&key),
        }))
        .into_response(),
        None => not_found("session not found"),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /v1/sessions/:key/transcript
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Read back a session's transcript (for debugging / UI history views).
pub async fn get_transcript(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> impl IntoResponse {
    let Some(entry) = state.sessions.get(&key) else {
        return not_found("session not found");
    };

    match state.transcripts.read(&entry.session_id) {
        Ok(lines) => Json(serde_json::json!({
            "session_key": key,
            "lines": lines,
            "count": lines.len(),
        }))
        .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /v1/sessions/:key/export
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    /// `"json"` (default) or `"jsonl"` for the raw newline-delimited form.
    #[serde(default)]
    pub format: Option<String>,
}

/// Export a session's full transcript, either as a JSON array or as raw
/// JSONL (one object per line, matching the on-disk format).
pub async fn export_transcript(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<ExportQuery>,
) -> impl IntoResponse {
    let Some(entry) = state.sessions.get(&key) else {
        return not_found("session not found");
    };

    let lines = match state.transcripts.read(&entry.session_id) {
        Ok(lines) => lines,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    };

    if query.format.as_deref() == Some("jsonl") {
        let mut buf = String::new();
        for line in &lines {
            if let Ok(json) = serde_json::to_string(line) {
                buf.push_str(&json);
                buf.push('\n');
            }
        }
        (
            [(axum::http::header::CONTENT_TYPE, "application/x-ndjson")],
            buf,
        )
            .into_response()
    } else {
        Json(serde_json::json!({ "session_key": key, "lines": lines })).into_response()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/sessions/:key/reset
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Path-based equivalent of [`reset_session`] — reset by `:key` instead of
/// a request body.
pub async fn reset_session_by_key(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> impl IntoResponse {
    match state.sessions.reset_session(&key, "manual reset") {
        Some(entry) => Json(serde_json::json!({
            "session_key": entry.session_key,
            "session_id": entry.session_id,
            "reset": true,
        }))
        .into_response(),
        None => not_found("session not found"),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/sessions/:key/stop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Cancel a session's in-flight turn, if any. Cascades to any delegated
/// sub-agent turns registered in the session's cancel group.
pub async fn stop_session(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> impl IntoResponse {
    let stopped = state.cancel_map.cancel(&key);
    Json(serde_json::json!({ "session_key": key, "stopped": stopped }))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/sessions/:key/compact
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Manually trigger compaction of a session's transcript, regardless of the
/// configured auto-compaction threshold.
pub async fn compact_session(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> impl IntoResponse {
    let Some(entry) = state.sessions.get(&key) else {
        return not_found("session not found");
    };

    let Some(provider) = crate::runtime::compact::resolve_compaction_provider(&state) else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "error": "no LLM provider available for compaction" })),
        )
            .into_response();
    };

    let lines = match state.transcripts.read(&entry.session_id) {
        Ok(lines) => lines,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    };

    match crate::runtime::compact::run_compaction(
        provider.as_ref(),
        &state.transcripts,
        &entry.session_id,
        &lines,
        &state.config.compaction,
    )
    .await
    {
        Ok(summary) if summary.is_empty() => Json(serde_json::json!({
            "session_key": key,
            "compacted": false,
            "reason": "nothing to compact",
        }))
        .into_response(),
        Ok(summary) => Json(serde_json::json!({
            "session_key": key,
            "compacted": true,
            "summary": summary,
        }))
        .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Branches — named transcript snapshots
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct CreateBranchBody {
    pub name: String,
}

/// Snapshot a session's current transcript into a named branch.
pub async fn create_branch(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(body): Json<CreateBranchBody>,
) -> impl IntoResponse {
    let Some(entry) = state.sessions.get(&key) else {
        return not_found("session not found");
    };

    let lines = match state.transcripts.read(&entry.session_id) {
        Ok(lines) => lines,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    };

    match state.branches.branch(&entry.session_id, &body.name, &lines) {
        Ok(branch) => Json(serde_json::json!(branch)).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

/// List branches stored for a session.
pub async fn list_branches(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> impl IntoResponse {
    let Some(entry) = state.sessions.get(&key) else {
        return not_found("session not found");
    };

    let branches = state.branches.list(&entry.session_id);
    Json(serde_json::json!({ "branches": branches, "count": branches.len() })).into_response()
}

/// Restore a branch, overwriting the session's live transcript with the
/// branch's snapshot. The branch itself is left intact and can be restored
/// again later.
pub async fn restore_branch(
    State(state): State<AppState>,
    Path((key, name)): Path<(String, String)>,
) -> impl IntoResponse {
    let Some(entry) = state.sessions.get(&key) else {
        return not_found("session not found");
    };

    match state
        .branches
        .restore_into(&entry.session_id, &name, &state.transcripts)
    {
        Ok(line_count) => Json(serde_json::json!({
            "session_key": key,
            "branch": name,
            "restored_lines": line_count,
        }))
        .into_response(),
        Err(e) => not_found(e.to_string()),
    }
}

/// Delete a stored branch.
pub async fn delete_branch(
    State(state): State<AppState>,
    Path((key, name)): Path<(String, String)>,
) -> impl IntoResponse {
    let Some(entry) = state.sessions.get(&key) else {
        return not_found("session not found");
    };

    let existed = state.branches.delete(&entry.session_id, &name);
    if existed {
        Json(serde_json::json!({ "deleted": true })).into_response()
    } else {
        not_found("branch not found")
    }
}
