//! Persisted sync state: the cursor recording how far the index has caught up.
//!
//! The state is a small JSON document in the repository root. Only the
//! synchronizer writes the cursor. Keys this version does not know about are
//! carried through `load → save` untouched.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    /// Last commit fully reflected in the vector store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_indexed_commit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_indexed_at: Option<DateTime<Utc>>,
    /// Vault root override; defaults to the repository root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vault_path: Option<PathBuf>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Load/save access to [`SyncState`].
pub trait StateStore {
    fn load(&self) -> Result<SyncState>;
    fn save(&self, state: &SyncState) -> Result<()>;

    fn last_indexed_commit(&self) -> Result<Option<String>> {
        Ok(self.load()?.last_indexed_commit)
    }

    /// Record `commit` as the new cursor, stamping the current time.
    fn set_last_indexed_commit(&self, commit: &str) -> Result<()> {
        let mut state = self.load()?;
        state.last_indexed_commit = Some(commit.to_string());
        state.last_indexed_at = Some(Utc::now());
        self.save(&state)
    }

    /// The vault root: the state's `vault_path` if set, else `repo_root`.
    /// A relative `vault_path` is resolved against `repo_root`.
    fn vault_path(&self, repo_root: &Path) -> Result<PathBuf> {
        Ok(match self.load()?.vault_path {
            Some(p) if p.is_absolute() => p,
            Some(p) => repo_root.join(p),
            None => repo_root.to_path_buf(),
        })
    }
}

/// State kept as pretty-printed JSON on disk. A missing file is empty state.
#[derive(Debug, Clone)]
pub struct JsonStateFile {
    path: PathBuf,
}

impl JsonStateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for JsonStateFile {
    fn load(&self) -> Result<SyncState> {
        if !self.path.exists() {
            return Ok(SyncState::default());
        }
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read state file: {}", self.path.display()))?;
        if raw.trim().is_empty() {
            return Ok(SyncState::default());
        }
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse state file: {}", self.path.display()))
    }

    fn save(&self, state: &SyncState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(state)?;
        std::fs::write(&self.path, json + "\n")
            .with_context(|| format!("Failed to write state file: {}", self.path.display()))
    }
}

/// Process-local state, for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryState {
    inner: Mutex<SyncState>,
}

impl MemoryState {
    pub fn new(state: SyncState) -> Self {
        Self {
            inner: Mutex::new(state),
        }
    }

    pub fn with_cursor(commit: &str) -> Self {
        Self::new(SyncState {
            last_indexed_commit: Some(commit.to_string()),
            ..SyncState::default()
        })
    }
}

impl StateStore for MemoryState {
    fn load(&self) -> Result<SyncState> {
        self.inner
            .lock()
            .map(|s| s.clone())
            .map_err(|_| anyhow!("state lock poisoned"))
    }

    fn save(&self, state: &SyncState) -> Result<()> {
        let mut guard = self.inner.lock().map_err(|_| anyhow!("state lock poisoned"))?;
        *guard = state.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_empty_state() {
        let tmp = TempDir::new().unwrap();
        let store = JsonStateFile::new(tmp.path().join(".vault-rag.json"));
        assert_eq!(store.load().unwrap(), SyncState::default());
        assert_eq!(store.last_indexed_commit().unwrap(), None);
    }

    #[test]
    fn test_set_cursor_round_trips_through_disk() {
        let tmp = TempDir::new().unwrap();
        let store = JsonStateFile::new(tmp.path().join(".vault-rag.json"));
        store.set_last_indexed_commit("abc123").unwrap();

        let reopened = JsonStateFile::new(store.path().to_path_buf());
        let state = reopened.load().unwrap();
        assert_eq!(state.last_indexed_commit.as_deref(), Some("abc123"));
        assert!(state.last_indexed_at.is_some());
    }

    #[test]
    fn test_unknown_keys_survive_save() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("state.json");
        std::fs::write(&path, r#"{"last_indexed_commit":"old","theme":"dark"}"#).unwrap();

        let store = JsonStateFile::new(&path);
        store.set_last_indexed_commit("new").unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["theme"], "dark");
        assert_eq!(raw["last_indexed_commit"], "new");
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("state.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(JsonStateFile::new(&path).load().is_err());
    }

    #[test]
    fn test_vault_path_defaults_to_repo_root() {
        let repo = Path::new("/repo");
        let state = MemoryState::default();
        assert_eq!(state.vault_path(repo).unwrap(), PathBuf::from("/repo"));

        let state = MemoryState::new(SyncState {
            vault_path: Some(PathBuf::from("vault")),
            ..SyncState::default()
        });
        assert_eq!(state.vault_path(repo).unwrap(), PathBuf::from("/repo/vault"));
    }

    #[test]
    fn test_memory_state_cursor() {
        let state = MemoryState::with_cursor("c1");
        assert_eq!(state.last_indexed_commit().unwrap().as_deref(), Some("c1"));
        state.set_last_indexed_commit("c2").unwrap();
        assert_eq!(state.last_indexed_commit().unwrap().as_deref(), Some("c2"));
    }
}
