use axum::extract::{Query, State};
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use orc_memory::UserFactsBuilder;
use sa_contextpack::builder::{ContextPackBuilder, SessionMode};

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ContextParams {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
}

pub async fn get_context(
    State(state): State<AppState>,
    Query(params): Query<ContextParams>,
) -> impl IntoResponse {
    let session_mode = parse_session_mode(params.mode.as_deref());

    let user_facts = build_user_facts(&state).await;
    let user_facts_opt = if user_facts.is_empty() {
        None
    } else {
        Some(user_facts.as_str())
    };

    let builder = ContextPackBuilder::new(
        state.config.context.bootstrap_max_chars,
        state.config.context.bootstrap_total_max_chars,
    );

    let (_assembled, report) = builder.build(&[], session_mode, false, None, user_facts_opt);

    Json(serde_json::json!({
        "session_id": params.session_id,
        "report": report,
    }))
}

pub async fn get_assembled(
    State(state): State<AppState>,
    Query(params): Query<ContextParams>,
) -> impl IntoResponse {
    let session_mode = parse_session_mode(params.mode.as_deref());

    let user_facts = build_user_facts(&state).await;
    let user_facts_opt = if user_facts.is_empty() {
        None
    } else {
        Some(user_facts.as_str())
    };

    let builder = ContextPackBuilder::new(
        state.config.context.bootstrap_max_chars,
        state.config.context.bootstrap_total_max_chars,
    );

    let (assembled, _report) = builder.build(&[], session_mode, false, None, user_facts_opt);

    axum::response::Response::builder()
        .header("Content-Type", "text/plain; charset=utf-8")
        .body(axum::body::Body::from(assembled))
        .unwrap()
        .into_response()
}

async fn build_user_facts(state: &AppState) -> String {
    let user_id = &state.config.serial_memory.default_user_id;
    let facts_builder = UserFactsBuilder::new(
        state.memory.as_ref(),
        user_id,
        state.config.context.user_facts_max_chars,
    );
    facts_builder.build().await
}

fn parse_session_mode(mode: Option<&str>) -> SessionMode {
    match mode {
        Some("heartbeat") => SessionMode::Heartbeat,
        Some("private") => SessionMode::Private,
        Some("bootstrap") => SessionMode::Bootstrap,
        _ => SessionMode::Normal,
    }
}
