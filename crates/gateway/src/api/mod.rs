pub mod agents;
pub mod auth;
pub mod chat;
pub mod context;
pub mod inbound;
pub mod memory;
pub mod notes;
pub mod providers;
pub mod quota;
pub mod runs;
pub mod sessions;
pub mod tools;

use axum::extract::State;
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::Router;

use crate::state::AppState;

/// `GET /v1/health` — liveness probe. No auth required.
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
        "providers": state.llm.len(),
        "agents": state.agents.as_ref().map(|a| a.len()).unwrap_or(0),
    }))
}

/// Build the full API router.
///
/// Routes are split into **public** (no auth required) and **protected**
/// (gated behind the `SA_API_TOKEN` bearer-token middleware).
///
/// `state` is needed to wire up the auth middleware at build time.
pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new().route("/v1/health", get(health));

    let protected = Router::new()
        // Context introspection
        .route("/v1/context", get(context::get_context))
        .route("/v1/context/assembled", get(context::get_assembled))
        // Memory (proxy to SerialMemory)
        .route("/v1/memory/search", post(memory::search))
        .route("/v1/memory/ingest", post(memory::ingest))
        .route("/v1/memory/about", get(memory::about_user))
        .route("/v1/memory/health", get(memory::health))
        .route("/v1/memory/:id", axum::routing::put(memory::update_entry))
        .route("/v1/memory/:id", delete(memory::delete_entry))
        // Legacy session proxy (SerialMemory)
        .route("/v1/session/init", post(memory::init_session))
        .route("/v1/session/end", post(memory::end_session))
        // Session management (gateway-owned)
        .route("/v1/sessions", get(sessions::list_sessions))
        .route("/v1/sessions/resolve", post(sessions::resolve_session))
        .route("/v1/sessions/reset", post(sessions::reset_session))
        .route("/v1/sessions/:key", get(sessions::get_session))
        .route("/v1/sessions/:key/transcript", get(sessions::get_transcript))
        .route("/v1/sessions/:key/export", get(sessions::export_transcript))
        .route(
            "/v1/sessions/:key/reset",
            post(sessions::reset_session_by_key),
        )
        .route("/v1/sessions/:key/stop", post(sessions::stop_session))
        .route("/v1/sessions/:key/compact", post(sessions::compact_session))
        .route(
            "/v1/sessions/:key/branches",
            get(sessions::list_branches).post(sessions::create_branch),
        )
        .route(
            "/v1/sessions/:key/branches/:name",
            delete(sessions::delete_branch),
        )
        .route(
            "/v1/sessions/:key/branches/:name/restore",
            post(sessions::restore_branch),
        )
        // Notes (freeform key/value documents, independent of sessions)
        .route("/v1/notes", get(notes::list_notes))
        .route("/v1/notes/search", get(notes::search_notes))
        .route(
            "/v1/notes/item/*key",
            get(notes::load_note)
                .post(notes::save_note)
                .delete(notes::delete_note),
        )
        // Chat (core runtime)
        .route("/v1/chat", post(chat::chat))
        .route("/v1/chat/stream", post(chat::chat_stream))
        // Inbound (channel connector contract)
        .route("/v1/inbound", post(inbound::inbound))
        // Tools
        .route("/v1/tools/invoke", post(tools::invoke_tool))
        .route(
            "/v1/tools/approvals",
            get(tools::list_pending_approvals),
        )
        .route(
            "/v1/tools/approvals/:id/approve",
            post(tools::approve_tool_call),
        )
        .route(
            "/v1/tools/approvals/:id/deny",
            post(tools::deny_tool_call),
        )
        // Quotas (per-agent daily usage limits)
        .route("/v1/quotas", get(quota::get_quotas))
        // Runs (execution tracking)
        .route("/v1/runs", get(runs::list_runs))
        .route("/v1/runs/:id", get(runs::get_run))
        .route("/v1/runs/:id/nodes", get(runs::get_run_nodes))
        .route("/v1/runs/:id/events", get(runs::run_events_sse))
        // Agents (audit / introspection)
        .route("/v1/agents", get(agents::list_agents))
        // Providers / Models
        .route("/v1/models", get(providers::list_providers))
        .route("/v1/models/roles", get(providers::list_roles))
        // Apply API auth middleware to all protected routes.
        .route_layer(middleware::from_fn_with_state(
            state,
            auth::require_api_token,
        ));

    public
        .merge(protected)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
