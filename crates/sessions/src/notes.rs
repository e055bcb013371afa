//! Notes — small, freeform key/value documents stored alongside sessions.
//!
//! Notes live under `notes/` in the same base directory as sessions and
//! branches, one file per key, written with the same atomic temp-file-then-
//! rename pattern and the same reversible key encoding used elsewhere in
//! this crate so a key can never escape the notes directory.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use orc_domain::error::{Error, Result};

use crate::search::{SearchHit, TranscriptIndex};

/// A single stored note.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub key: String,
    pub content: String,
    pub updated_at: DateTime<Utc>,
}

/// Filesystem-backed note store.
///
/// `searchNotes` is implemented on top of the same reverse-index structure
/// the transcript search uses, generalized from "session id" to "note key".
pub struct NoteStore {
    base_dir: PathBuf,
    index: TranscriptIndex,
}

impl NoteStore {
    /// Load the note store at `state_path/notes`, building its full-text
    /// search index from whatever notes already exist on disk.
    pub fn new(state_path: &Path) -> Result<Self> {
        let base_dir = state_path.join("notes");
        std::fs::create_dir_all(&base_dir).map_err(Error::Io)?;

        let index = TranscriptIndex::new();
        if let Ok(entries) = std::fs::read_dir(&base_dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                if let Ok(raw) = std::fs::read_to_string(&path) {
                    if let Ok(note) = serde_json::from_str::<Note>(&raw) {
                        index.index_content(&note.key, &note.content);
                    }
                }
            }
        }

        Ok(Self { base_dir, index })
    }

    fn note_path(&self, key: &str) -> PathBuf {
        crate::atomic::keyed_path(&self.base_dir, key, "json")
    }

    /// Load a note by key. Returns `None` if it doesn't exist.
    pub fn load_note(&self, key: &str) -> Result<Option<Note>> {
        let path = self.note_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path).map_err(Error::Io)?;
        let note = serde_json::from_str(&raw)
            .map_err(|e| Error::Other(format!("deserializing note '{key}': {e}")))?;
        Ok(Some(note))
    }

    /// Save (create or overwrite) a note, atomically.
    pub fn save_note(&self, key: &str, content: &str) -> Result<Note> {
        let note = Note {
            key: key.to_owned(),
            content: content.to_owned(),
            updated_at: Utc::now(),
        };
        let json = serde_json::to_string_pretty(&note)
            .map_err(|e| Error::Other(format!("serializing note '{key}': {e}")))?;
        crate::atomic::write(&self.note_path(key), json.as_bytes())?;
        self.index.index_content(key, content);
        Ok(note)
    }

    /// Delete a note. Returns `true` if it existed.
    pub fn delete_note(&self, key: &str) -> Result<bool> {
        let path = self.note_path(key);
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&path).map_err(Error::Io)?;
        Ok(true)
    }

    /// List all note keys whose key starts with `prefix`, in no particular order.
    pub fn list_notes_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let entries = match std::fs::read_dir(&self.base_dir) {
            Ok(e) => e,
            Err(e) => return Err(Error::Io(e)),
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let key = crate::atomic::decode_key(stem);
            if key.starts_with(prefix) {
                keys.push(key);
            }
        }
        Ok(keys)
    }

    /// Full-text search over note content (optional capability — degrades
    /// to an empty result set when a caller can't use the index directly,
    /// never by erroring).
    pub fn search_notes(&self, query: &str, prefix: Option<&str>, limit: usize) -> Vec<SearchHit> {
        let mut hits = self.index.search(query);
        if let Some(prefix) = prefix {
            hits.retain(|h| h.session_id.starts_with(prefix));
        }
        hits.truncate(limit);
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_load_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let store = NoteStore::new(tmp.path()).unwrap();

        store.save_note("todo/today", "buy milk").unwrap();
        let note = store.load_note("todo/today").unwrap().unwrap();
        assert_eq!(note.content, "buy milk");
    }

    #[test]
    fn load_missing_note_returns_none() {
        let tmp = tempfile::tempdir().unwrap();
        let store = NoteStore::new(tmp.path()).unwrap();
        assert!(store.load_note("nope").unwrap().is_none());
    }

    #[test]
    fn delete_removes_note() {
        let tmp = tempfile::tempdir().unwrap();
        let store = NoteStore::new(tmp.path()).unwrap();
        store.save_note("a", "x").unwrap();

        assert!(store.delete_note("a").unwrap());
        assert!(store.load_note("a").unwrap().is_none());
        assert!(!store.delete_note("a").unwrap());
    }

    #[test]
    fn list_with_prefix_filters_keys() {
        let tmp = tempfile::tempdir().unwrap();
        let store = NoteStore::new(tmp.path()).unwrap();
        store.save_note("todo/today", "a").unwrap();
        store.save_note("todo/tomorrow", "b").unwrap();
        store.save_note("journal/2026", "c").unwrap();

        let mut keys = store.list_notes_with_prefix("todo/").unwrap();
        keys.sort();
        assert_eq!(keys, vec!["todo/today", "todo/tomorrow"]);
    }

    #[test]
    fn path_traversal_key_stays_inside_base_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let store = NoteStore::new(tmp.path()).unwrap();

        store.save_note("../../etc/passwd", "pwned").unwrap();

        let mut entries = std::fs::read_dir(tmp.path()).unwrap();
        assert!(entries.next().is_some());
        assert!(!tmp.path().parent().unwrap().join("etc/passwd").exists());
    }

    #[test]
    fn search_notes_finds_saved_content() {
        let tmp = tempfile::tempdir().unwrap();
        let store = NoteStore::new(tmp.path()).unwrap();
        store.save_note("a", "the rust compiler is fast").unwrap();
        store.save_note("b", "python is slow").unwrap();

        let hits = store.search_notes("rust", None, 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].session_id, "a");
    }

    #[test]
    fn search_notes_respects_prefix_filter() {
        let tmp = tempfile::tempdir().unwrap();
        let store = NoteStore::new(tmp.path()).unwrap();
        store.save_note("todo/a", "rust task").unwrap();
        store.save_note("journal/a", "rust entry").unwrap();

        let hits = store.search_notes("rust", Some("todo/"), 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].session_id, "todo/a");
    }

    #[test]
    fn save_note_overwrites_existing() {
        let tmp = tempfile::tempdir().unwrap();
        let store = NoteStore::new(tmp.path()).unwrap();
        store.save_note("a", "first").unwrap();
        store.save_note("a", "second").unwrap();

        let note = store.load_note("a").unwrap().unwrap();
        assert_eq!(note.content, "second");
    }
}
