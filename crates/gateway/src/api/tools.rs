//! Tools API endpoints.
//!
//! - `POST /v1/tools/invoke`           — generic tool dispatch
//! - `GET  /v1/tools/approvals`        — list pending approvals
//! - `POST /v1/tools/approvals/:id/approve` — approve a pending tool call
//! - `POST /v1/tools/approvals/:id/deny`    — deny a pending tool call

use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Json};
use serde::Deserialize;
use uuid::Uuid;

use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/tools/invoke
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Request body for generic tool invocation.
#[derive(Debug, Deserialize)]
pub struct ToolInvokeRequest {
    /// Tool name (e.g. `"memory.search"`, `"delegate_agent"`).
    pub tool: String,
    /// Tool arguments.
    #[serde(default)]
    pub args: serde_json::Value,
    /// Optional session key for provenance / cancellation.
    #[serde(default)]
    pub session_key: Option<String>,
    /// Optional timeout in milliseconds (default 30_000, max 120_000).
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// Generic tool dispatch endpoint. Runs the same pipeline the agent
/// runtime uses: hooks → approval gate → execution → hooks.
///
/// Always returns 200 with `ok: true/false` in the body (tool errors are
/// not HTTP errors).
pub async fn invoke_tool(
    State(state): State<AppState>,
    Json(req): Json<ToolInvokeRequest>,
) -> impl IntoResponse {
    let start = std::time::Instant::now();
    let request_id = Uuid::new_v4().to_string();

    // Clamp timeout to this endpoint's own ceiling on top of the runtime's
    // per-tool timeout.
    let timeout = Duration::from_millis(req.timeout_ms.unwrap_or(30_000).min(120_000));

    let session_key = req.session_key.as_deref().unwrap_or("anonymous");
    let tool_ctx = crate::runtime::hooks::ToolCallContext {
        session_key,
        channel_id: None,
        sender_id: None,
        correlation_id: &request_id,
        is_streaming: false,
    };
    let dispatch = crate::runtime::tools::dispatch_tool(
        &state,
        &req.tool,
        &req.args,
        &tool_ctx,
        None, // no agent context for a direct API invoke
    );

    let (content, is_error) = match tokio::time::timeout(timeout, dispatch).await {
        Ok(result) => result,
        Err(_) => (
            format!("tool invoke timed out after {}ms", timeout.as_millis()),
            true,
        ),
    };

    let duration_ms = start.elapsed().as_millis() as u64;

    if is_error {
        Json(serde_json::json!({
            "request_id": request_id,
            "ok": false,
            "error": {
                "kind": "failed",
                "message": content,
            },
            "duration_ms": duration_ms,
        }))
        .into_response()
    } else {
        let result: serde_json::Value =
            serde_json::from_str(&content).unwrap_or(serde_json::Value::String(content));

        Json(serde_json::json!({
            "request_id": request_id,
            "ok": true,
            "result": result,
            "duration_ms": duration_ms,
        }))
        .into_response()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Approval queue endpoints
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn list_pending_approvals(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.approval_store.list_pending())
}

#[derive(Debug, Deserialize)]
pub struct DenyBody {
    #[serde(default)]
    pub reason: Option<String>,
}

pub async fn approve_tool_call(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    if state.approval_store.approve(&id) {
        Json(serde_json::json!({ "ok": true })).into_response()
    } else {
        (
            axum::http::StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "ok": false, "error": "no pending approval with that id" })),
        )
            .into_response()
    }
}

pub async fn deny_tool_call(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<DenyBody>>,
) -> impl IntoResponse {
    let reason = body.and_then(|b| b.0.reason);
    if state.approval_store.deny(&id, reason) {
        Json(serde_json::json!({ "ok": true })).into_response()
    } else {
        (
            axum::http::StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "ok": false, "error": "no pending approval with that id" })),
        )
            .into_response()
    }
}
