//! Session branches — named snapshots of a session's transcript that can be
//! restored later without losing the main line of conversation.
//!
//! A branch is a point-in-time copy of a session's transcript lines, stored
//! as its own JSONL file under `sessions/branches/<session_id>/<branch>.jsonl`.
//! Restoring a branch does not delete it — it overwrites the live transcript
//! with the branch's lines, so the same branch can be restored repeatedly.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use orc_domain::error::{Error, Result};
use orc_domain::trace::TraceEvent;

use crate::transcript::{TranscriptLine, TranscriptWriter};

/// Metadata describing a stored branch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionBranch {
    pub session_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub line_count: usize,
}

/// Filesystem-backed branch store, keyed by session ID.
pub struct BranchStore {
    base_dir: PathBuf,
    /// In-memory index of branch metadata, rebuilt lazily per session on
    /// first access to avoid a startup scan of every session's branches.
    index: RwLock<std::collections::HashMap<String, Vec<SessionBranch>>>,
}

impl BranchStore {
    pub fn new(base_dir: &Path) -> Self {
        Self {
            base_dir: base_dir.to_path_buf(),
            index: RwLock::new(std::collections::HashMap::new()),
        }
    }

    fn branch_dir(&self, session_id: &str) -> PathBuf {
        self.base_dir.join(crate::atomic::encode_key(session_id))
    }

    fn branch_path(&self, session_id: &str, name: &str) -> PathBuf {
        crate::atomic::keyed_path(&self.branch_dir(session_id), name, "jsonl")
    }

    /// Create a branch from the given transcript lines (a snapshot).
    pub fn branch(
        &self,
        session_id: &str,
        name: &str,
        lines: &[TranscriptLine],
    ) -> Result<SessionBranch> {
        let dir = self.branch_dir(session_id);
        std::fs::create_dir_all(&dir).map_err(Error::Io)?;

        let mut buf = String::new();
        for line in lines {
            let json = serde_json::to_string(line)
                .map_err(|e| Error::Other(format!("serializing branch line: {e}")))?;
            buf.push_str(&json);
            buf.push('\n');
        }

        let final_path = self.branch_path(session_id, name);
        crate::atomic::write(&final_path, buf.as_bytes())?;

        let branch = SessionBranch {
            session_id: session_id.to_owned(),
            name: name.to_owned(),
            created_at: Utc::now(),
            line_count: lines.len(),
        };

        let mut index = self.index.write();
        let entries = index.entry(session_id.to_owned()).or_default();
        entries.retain(|b| b.name != name);
        entries.push(branch.clone());

        TraceEvent::SessionBranchCreated {
            session_key: session_id.to_owned(),
            branch: name.to_owned(),
        }
        .emit();

        Ok(branch)
    }

    /// Read back the transcript lines stored in a branch.
    pub fn restore(&self, session_id: &str, name: &str) -> Result<Vec<TranscriptLine>> {
        let path = self.branch_path(session_id, name);
        if !path.exists() {
            return Err(Error::Storage(format!(
                "branch '{name}' not found for session '{session_id}'"
            )));
        }

        let raw = std::fs::read_to_string(&path).map_err(Error::Io)?;
        let mut lines = Vec::new();
        for line in raw.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<TranscriptLine>(line) {
                Ok(tl) => lines.push(tl),
                Err(e) => {
                    tracing::warn!(session_id, branch = name, error = %e, "skipping malformed branch line");
                }
            }
        }
        Ok(lines)
    }

    /// Overwrite a session's live transcript with a previously stored branch.
    pub fn restore_into(
        &self,
        session_id: &str,
        name: &str,
        transcripts: &TranscriptWriter,
    ) -> Result<usize> {
        let lines = self.restore(session_id, name)?;
        transcripts.replace(session_id, &lines)?;
        Ok(lines.len())
    }

    /// List all branches for a session, from the in-memory index if
    /// already populated, otherwise by scanning disk.
    pub fn list(&self, session_id: &str) -> Vec<SessionBranch> {
        {
            let index = self.index.read();
            if let Some(entries) = index.get(session_id) {
                return entries.clone();
            }
        }

        let dir = self.branch_dir(session_id);
        let mut entries = Vec::new();
        if let Ok(read_dir) = std::fs::read_dir(&dir) {
            for entry in read_dir.flatten() {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                    continue;
                }
                let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                let name = crate::atomic::decode_key(stem);
                let line_count = std::fs::read_to_string(&path)
                    .map(|raw| raw.lines().filter(|l| !l.trim().is_empty()).count())
                    .unwrap_or(0);
                let created_at = entry
                    .metadata()
                    .and_then(|m| m.created())
                    .map(DateTime::<Utc>::from)
                    .unwrap_or_else(Utc::now);
                entries.push(SessionBranch {
                    session_id: session_id.to_owned(),
                    name,
                    created_at,
                    line_count,
                });
            }
        }

        self.index
            .write()
            .insert(session_id.to_owned(), entries.clone());
        entries
    }

    /// Delete a branch. Returns `true` if it existed.
    pub fn delete(&self, session_id: &str, name: &str) -> bool {
        let path = self.branch_path(session_id, name);
        let existed = path.exists();
        if existed {
            let _ = std::fs::remove_file(&path);
        }
        if let Some(entries) = self.index.write().get_mut(session_id) {
            entries.retain(|b| b.name != name);
        }
        existed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(role: &str, content: &str) -> TranscriptLine {
        TranscriptWriter::line(role, content)
    }

    #[test]
    fn branch_then_restore_round_trips_lines() {
        let tmp = tempfile::tempdir().unwrap();
        let store = BranchStore::new(tmp.path());
        let lines = vec![line("user", "hi"), line("assistant", "hello")];

        store.branch("s1", "before-refactor", &lines).unwrap();
        let restored = store.restore("s1", "before-refactor").unwrap();

        assert_eq!(restored.len(), 2);
        assert_eq!(restored[0].content, "hi");
        assert_eq!(restored[1].content, "hello");
    }

    #[test]
    fn restore_missing_branch_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let store = BranchStore::new(tmp.path());
        assert!(store.restore("s1", "nope").is_err());
    }

    #[test]
    fn list_reflects_created_branches() {
        let tmp = tempfile::tempdir().unwrap();
        let store = BranchStore::new(tmp.path());
        store.branch("s1", "a", &[line("user", "x")]).unwrap();
        store.branch("s1", "b", &[line("user", "y")]).unwrap();

        let branches = store.list("s1");
        let names: Vec<_> = branches.iter().map(|b| b.name.as_str()).collect();
        assert!(names.contains(&"a"));
        assert!(names.contains(&"b"));
    }

    #[test]
    fn branching_same_name_twice_replaces_it() {
        let tmp = tempfile::tempdir().unwrap();
        let store = BranchStore::new(tmp.path());
        store.branch("s1", "a", &[line("user", "x")]).unwrap();
        store
            .branch("s1", "a", &[line("user", "x"), line("user", "y")])
            .unwrap();

        let branches = store.list("s1");
        assert_eq!(branches.iter().filter(|b| b.name == "a").count(), 1);
        let restored = store.restore("s1", "a").unwrap();
        assert_eq!(restored.len(), 2);
    }

    #[test]
    fn delete_removes_branch() {
        let tmp = tempfile::tempdir().unwrap();
        let store = BranchStore::new(tmp.path());
        store.branch("s1", "a", &[line("user", "x")]).unwrap();

        assert!(store.delete("s1", "a"));
        assert!(store.restore("s1", "a").is_err());
        assert!(!store.delete("s1", "a"));
    }
}
