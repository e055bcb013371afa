//! Notes API endpoints.
//!
//! Notes are freeform key/value documents, independent of any one session —
//! a place for facts, reminders, or scratch content that should survive a
//! session reset and be searchable across sessions.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SaveNoteBody {
    pub content: String,
}

/// `POST /v1/notes/item/*key` — create or overwrite a note.
pub async fn save_note(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(body): Json<SaveNoteBody>,
) -> impl IntoResponse {
    match state.notes.save_note(&key, &body.content) {
        Ok(note) => Json(serde_json::json!(note)).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

/// `GET /v1/notes/item/*key` — load a note by key.
pub async fn load_note(State(state): State<AppState>, Path(key): Path<String>) -> impl IntoResponse {
    match state.notes.load_note(&key) {
        Ok(Some(note)) => Json(serde_json::json!(note)).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "note not found" })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

/// `DELETE /v1/notes/item/*key` — delete a note.
pub async fn delete_note(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> impl IntoResponse {
    match state.notes.delete_note(&key) {
        Ok(true) => Json(serde_json::json!({ "deleted": true })).into_response(),
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "note not found" })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct ListNotesQuery {
    #[serde(default)]
    pub prefix: Option<String>,
}

/// `GET /v1/notes` — list note keys, optionally filtered by prefix.
pub async fn list_notes(
    State(state): State<AppState>,
    Query(query): Query<ListNotesQuery>,
) -> impl IntoResponse {
    let prefix = query.prefix.unwrap_or_default();
    match state.notes.list_notes_with_prefix(&prefix) {
        Ok(mut keys) => {
            keys.sort();
            Json(serde_json::json!({ "keys": keys, "count": keys.len() })).into_response()
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchNotesQuery {
    pub q: String,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    20
}

/// `GET /v1/notes/search` — full-text search over note content.
pub async fn search_notes(
    State(state): State<AppState>,
    Query(query): Query<SearchNotesQuery>,
) -> impl IntoResponse {
    let hits = state
        .notes
        .search_notes(&query.q, query.prefix.as_deref(), query.limit);
    Json(serde_json::json!({ "hits": hits, "count": hits.len() }))
}
