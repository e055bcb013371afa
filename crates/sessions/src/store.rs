//! Gateway-owned session store.
//!
//! Persists session state in `sessions.json` under the configured state path.
//! Each session key maps to a `SessionEntry` tracking the session ID, token
//! counters, origin metadata, and the SerialMemory session ID.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use orc_domain::config::InboundMetadata;
use orc_domain::error::{Error, Result};
use orc_domain::trace::TraceEvent;

use crate::search::TranscriptIndex;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session entry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A single session tracked by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEntry {
    pub session_key: String,
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// The model used for this session (e.g. `"openai/gpt-4o"`).
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
    #[serde(default)]
    pub context_tokens: u64,
    /// SerialMemory session ID (from `init_session`).
    #[serde(default)]
    pub sm_session_id: Option<String>,
    #[serde(default)]
    pub origin: SessionOrigin,
    /// Lifecycle state: `active | idle | compacting | closed`.
    #[serde(default)]
    pub state: SessionState,
}

/// Session lifecycle state (SPEC_FULL §4.1/§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Active,
    Idle,
    Compacting,
    Closed,
}

/// Origin metadata describing where the session came from.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SessionOrigin {
    pub channel: Option<String>,
    pub account: Option<String>,
    pub peer: Option<String>,
    pub group: Option<String>,
}

impl From<&InboundMetadata> for SessionOrigin {
    fn from(meta: &InboundMetadata) -> Self {
        Self {
            channel: meta.channel.clone(),
            account: meta.account_id.clone(),
            peer: meta.peer_id.clone(),
            group: meta.group_id.clone(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Gateway-owned session store backed by a JSON file.
pub struct SessionStore {
    sessions_path: PathBuf,
    transcripts_path: PathBuf,
    sessions: RwLock<HashMap<String, SessionEntry>>,
    search_index: Arc<TranscriptIndex>,
}

impl SessionStore {
    /// Load or create the session store at `state_path/sessions/sessions.json`.
    ///
    /// Also builds the full-text transcript search index from any `.jsonl`
    /// files already on disk under `state_path/sessions/transcripts`.
    pub fn new(state_path: &Path) -> Result<Self> {
        let dir = state_path.join("sessions");
        std::fs::create_dir_all(&dir)
            .map_err(Error::Io)?;

        let sessions_path = dir.join("sessions.json");
        let sessions = if sessions_path.exists() {
            let raw = std::fs::read_to_string(&sessions_path)
                .map_err(Error::Io)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            HashMap::new()
        };

        tracing::info!(
            sessions = sessions.len(),
            path = %sessions_path.display(),
            "session store loaded"
        );

        let transcripts_path = dir.join("transcripts");
        std::fs::create_dir_all(&transcripts_path).map_err(Error::Io)?;
        let search_index = Arc::new(TranscriptIndex::build_from_dir(&transcripts_path));

        Ok(Self {
            sessions_path,
            transcripts_path,
            sessions: RwLock::new(sessions),
            search_index,
        })
    }

    /// The live full-text transcript search index (see [`TranscriptIndex`]).
    pub fn search_index(&self) -> &Arc<TranscriptIndex> {
        &self.search_index
    }

    /// Look up a session by its key.
    pub fn get(&self, session_key: &str) -> Option<SessionEntry> {
        self.sessions.read().get(session_key).cloned()
    }

    /// Resolve or create a session for the given key.  Returns `(entry, is_new)`.
    ///
    /// Check-and-insert happens under a single write-lock acquisition so two
    /// concurrent callers for a brand-new key can never both observe a miss
    /// and insert distinct entries — the second caller's `or_insert_with`
    /// never runs because the first has already populated the slot.
    pub fn resolve_or_create(
        &self,
        session_key: &str,
        origin: SessionOrigin,
    ) -> (SessionEntry, bool) {
        let mut sessions = self.sessions.write();

        if let Some(entry) = sessions.get(session_key) {
            return (entry.clone(), false);
        }

        let now = Utc::now();
        let session_id = uuid::Uuid::new_v4().to_string();
        let entry = SessionEntry {
            session_key: session_key.to_owned(),
            session_id: session_id.clone(),
            created_at: now,
            updated_at: now,
            model: None,
            input_tokens: 0,
            output_tokens: 0,
            total_tokens: 0,
            context_tokens: 0,
            sm_session_id: None,
            origin,
            state: SessionState::Active,
        };

        sessions.insert(session_key.to_owned(), entry.clone());
        drop(sessions);

        TraceEvent::SessionResolved {
            session_key: session_key.to_owned(),
            session_id,
            is_new: true,
        }
        .emit();

        (entry, true)
    }

    /// Record a session reset: mint a new session ID for the same key.
    pub fn reset_session(
        &self,
        session_key: &str,
        reason: &str,
    ) -> Option<SessionEntry> {
        let mut sessions = self.sessions.write();
        let entry = sessions.get_mut(session_key)?;

        let old_id = entry.session_id.clone();
        let new_id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();

        entry.session_id = new_id.clone();
        entry.created_at = now;
        entry.updated_at = now;
        entry.input_tokens = 0;
        entry.output_tokens = 0;
        entry.total_tokens = 0;
        entry.context_tokens = 0;
        entry.sm_session_id = None;
        entry.state = SessionState::Active;

        TraceEvent::SessionReset {
            session_key: session_key.to_owned(),
            old_session_id: old_id,
            new_session_id: new_id,
            reason: reason.to_owned(),
        }
        .emit();

        Some(entry.clone())
    }

    /// Update token counters for a session.
    pub fn record_usage(
        &self,
        session_key: &str,
        input_tokens: u64,
        output_tokens: u64,
    ) {
        let mut sessions = self.sessions.write();
        if let Some(entry) = sessions.get_mut(session_key) {
            entry.input_tokens += input_tokens;
            entry.output_tokens += output_tokens;
            entry.total_tokens += input_tokens + output_tokens;
            entry.updated_at = Utc::now();
        }
    }

    /// Store the SerialMemory session ID for a session.
    pub fn set_sm_session_id(
        &self,
        session_key: &str,
        sm_session_id: String,
    ) {
        let mut sessions = self.sessions.write();
        if let Some(entry) = sessions.get_mut(session_key) {
            entry.sm_session_id = Some(sm_session_id);
        }
    }

    /// Touch the updated_at timestamp. New activity always brings a session
    /// back to `Active`, even if the idle sweep had marked it `Idle`.
    pub fn touch(&self, session_key: &str) {
        let mut sessions = self.sessions.write();
        if let Some(entry) = sessions.get_mut(session_key) {
            entry.updated_at = Utc::now();
            if entry.state == SessionState::Idle {
                entry.state = SessionState::Active;
            }
        }
    }

    /// Set a session's lifecycle state directly (e.g. `Compacting` while a
    /// compaction call is in flight, per SPEC_FULL §4.4).
    pub fn set_state(&self, session_key: &str, state: SessionState) {
        let mut sessions = self.sessions.write();
        if let Some(entry) = sessions.get_mut(session_key) {
            entry.state = state;
        }
    }

    /// List all session entries.
    pub fn list(&self) -> Vec<SessionEntry> {
        self.sessions.read().values().cloned().collect()
    }

    /// List sessions not in the `Closed` state (Session Manager `listActive`).
    pub fn list_active(&self) -> Vec<SessionEntry> {
        self.sessions
            .read()
            .values()
            .filter(|e| e.state != SessionState::Closed)
            .cloned()
            .collect()
    }

    /// Whether a session is tracked and not `Closed` (Session Manager `isActive`).
    pub fn is_active(&self, session_key: &str) -> bool {
        self.sessions
            .read()
            .get(session_key)
            .is_some_and(|e| e.state != SessionState::Closed)
    }

    /// Idle sweep: mark every `Active` session whose `updated_at` is older
    /// than `timeout` as `Idle` and flush the store. Returns the keys that
    /// transitioned this pass. Sessions already `Idle`/`Compacting`/`Closed`
    /// are left alone — this only demotes genuinely stale `Active` entries.
    pub fn sweep_idle(&self, timeout: chrono::Duration) -> Vec<String> {
        let cutoff = Utc::now() - timeout;
        let mut swept = Vec::new();
        let mut sessions = self.sessions.write();
        for entry in sessions.values_mut() {
            if entry.state == SessionState::Active && entry.updated_at < cutoff {
                entry.state = SessionState::Idle;
                swept.push(entry.session_key.clone());
            }
        }
        swept
    }

    /// Persist the current session state to disk.
    ///
    /// Writes to a temp file in the same directory and renames it into
    /// place, so a crash mid-write never leaves `sessions.json` truncated.
    fn flush_sync(&self) -> Result<()> {
        let json = {
            let sessions = self.sessions.read();
            serde_json::to_string_pretty(&*sessions)
                .map_err(|e| Error::Other(format!("serializing sessions: {e}")))?
        };
        crate::atomic::write(&self.sessions_path, json.as_bytes())
    }

    /// Async wrapper around [`Self::flush_sync`] for call sites inside the
    /// async runtime that must not block the executor on file IO.
    pub async fn flush(self: &Arc<Self>) -> Result<()> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.flush_sync())
            .await
            .map_err(|e| Error::Other(format!("session flush task panicked: {e}")))?
    }

    /// Return the directory where per-session transcript JSONL files live.
    pub fn transcript_dir(&self) -> PathBuf {
        self.transcripts_path.clone()
    }
}
