//! Index synchronization.
//!
//! Brings the vector store into agreement with the vault's working tree and
//! records the commit it now reflects. Two entry points:
//!
//! - [`Synchronizer::full_sync`]: clear the store, chunk and add every
//!   tracked file, record the current commit.
//! - [`Synchronizer::incremental_sync`]: resolve the change set since the
//!   recorded commit, drop deleted files, replace the chunk set of every
//!   added or modified file, record the current commit. Falls back to a full
//!   sync when there is no usable cursor.
//!
//! Files are processed strictly one after another. A failure on one file is
//! recorded in the report's `errors` and never stops the run or the cursor
//! update.

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

use vault_rag_core::changes::{resolve_changes, PathFilter, Resolution, Vcs};
use vault_rag_core::chunk::{chunk_markdown, ChunkingParams};
use vault_rag_core::models::{ChangeSet, Chunk};
use vault_rag_core::store::VectorStore;

use crate::state::StateStore;

pub const NO_CURSOR_MESSAGE: &str = "No previous index found, performing full index";
pub const STALE_CURSOR_MESSAGE: &str =
    "Last indexed commit is not in history, performing full index";

/// A per-file failure recorded during a sync run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileError {
    pub file: String,
    pub error: String,
}

impl FileError {
    fn new(file: &str, error: anyhow::Error) -> Self {
        warn!(file, error = %format!("{:#}", error), "file failed during sync");
        Self {
            file: file.to_string(),
            error: format!("{:#}", error),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FullSyncReport {
    pub action: &'static str,
    pub files_indexed: usize,
    pub chunks_created: usize,
    pub chunks_cleared: usize,
    pub last_commit: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FileError>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IncrementalSyncReport {
    pub action: &'static str,
    pub files_added: usize,
    pub files_modified: usize,
    pub files_deleted: usize,
    pub chunks_added: usize,
    pub chunks_deleted: usize,
    pub previous_commit: Option<String>,
    pub current_commit: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FileError>,
}

/// What an incremental request actually ran.
#[derive(Debug, Clone)]
pub enum SyncOutcome {
    /// Delegated to a full sync; `reason` says why.
    Full {
        reason: &'static str,
        report: FullSyncReport,
    },
    Incremental(IncrementalSyncReport),
}

/// `full-index --dry-run` output.
#[derive(Debug, Clone, Serialize)]
pub struct FullIndexPlan {
    pub action: &'static str,
    pub dry_run: bool,
    pub files: Vec<String>,
    pub total_files: usize,
    pub estimated_chunks: usize,
}

/// `incremental-update --dry-run` output.
#[derive(Debug, Clone, Serialize)]
pub struct IncrementalPlan {
    pub action: &'static str,
    pub dry_run: bool,
    pub previous_commit: String,
    #[serde(flatten)]
    pub changes: ChangeSet,
}

#[derive(Debug, Clone)]
pub enum PlanOutcome {
    Full {
        reason: &'static str,
        plan: FullIndexPlan,
    },
    Incremental(IncrementalPlan),
}

/// Inputs that do not change during a run.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Directory that repo-relative paths are read from.
    pub vault_root: PathBuf,
    pub pattern: String,
    pub params: ChunkingParams,
    pub filter: PathFilter,
}

impl SyncSettings {
    fn resolve<V: Vcs + ?Sized>(&self, vcs: &V, since: Option<&str>) -> Result<Resolution> {
        resolve_changes(vcs, since, &self.pattern, &self.filter)
            .context("Failed to resolve changed files")
    }

    /// Read and chunk one file. `Ok(None)` if it no longer exists.
    fn chunk_file(&self, file: &str) -> Result<Option<Vec<Chunk>>> {
        let path = self.vault_root.join(file);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(file, "file vanished before it could be read, skipping");
                return Ok(None);
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()));
            }
        };
        Ok(Some(chunk_markdown(file, &raw, self.params)))
    }
}

/// Files a full sync would index, with an estimated chunk count.
pub fn plan_full<V: Vcs + ?Sized>(vcs: &V, settings: &SyncSettings) -> Result<FullIndexPlan> {
    let files = settings.resolve(vcs, None)?.changes.added;
    let estimated_chunks = files
        .iter()
        .filter_map(|f| settings.chunk_file(f).ok().flatten())
        .map(|chunks| chunks.len())
        .sum();
    Ok(FullIndexPlan {
        action: "full-index",
        dry_run: true,
        total_files: files.len(),
        files,
        estimated_chunks,
    })
}

/// The change set an incremental sync would apply. Touches neither the
/// store nor the cursor.
pub fn plan_incremental<V, T>(vcs: &V, state: &T, settings: &SyncSettings) -> Result<PlanOutcome>
where
    V: Vcs + ?Sized,
    T: StateStore + ?Sized,
{
    let Some(previous) = state.last_indexed_commit()? else {
        return Ok(PlanOutcome::Full {
            reason: NO_CURSOR_MESSAGE,
            plan: plan_full(vcs, settings)?,
        });
    };

    let resolution = settings.resolve(vcs, Some(&previous))?;
    if resolution.widened {
        return Ok(PlanOutcome::Full {
            reason: STALE_CURSOR_MESSAGE,
            plan: plan_full(vcs, settings)?,
        });
    }
    Ok(PlanOutcome::Incremental(IncrementalPlan {
        action: "incremental-update",
        dry_run: true,
        previous_commit: previous,
        changes: resolution.changes,
    }))
}

pub struct Synchronizer<'a, S: ?Sized, V: ?Sized, T: ?Sized> {
    store: &'a S,
    vcs: &'a V,
    state: &'a T,
    settings: SyncSettings,
}

impl<'a, S, V, T> Synchronizer<'a, S, V, T>
where
    S: VectorStore + ?Sized,
    V: Vcs + ?Sized,
    T: StateStore + ?Sized,
{
    pub fn new(store: &'a S, vcs: &'a V, state: &'a T, settings: SyncSettings) -> Self {
        Self {
            store,
            vcs,
            state,
            settings,
        }
    }

    pub async fn full_sync(&self) -> Result<FullSyncReport> {
        let chunks_cleared = self
            .store
            .clear()
            .await
            .context("Failed to clear vector store")?;
        let files = self.settings.resolve(self.vcs, None)?.changes.added;
        info!(files = files.len(), chunks_cleared, "starting full index");

        let mut report = FullSyncReport {
            action: "full-index",
            files_indexed: 0,
            chunks_created: 0,
            chunks_cleared,
            last_commit: None,
            errors: Vec::new(),
        };

        for file in &files {
            let chunks = match self.settings.chunk_file(file) {
                Ok(Some(chunks)) => chunks,
                Ok(None) => continue,
                Err(e) => {
                    report.errors.push(FileError::new(file, e));
                    continue;
                }
            };
            if chunks.is_empty() {
                debug!(file = %file, "no chunks");
                continue;
            }
            match self.store.add(&chunks).await {
                Ok(added) => {
                    report.files_indexed += 1;
                    report.chunks_created += added;
                }
                Err(e) => report.errors.push(FileError::new(file, e)),
            }
        }

        match self.store.prune().await {
            Ok(pruned) => debug!(pruned, "pruned unreferenced cached data"),
            Err(e) => warn!(error = %format!("{:#}", e), "could not prune vector store"),
        }

        report.last_commit = self.record_cursor();
        Ok(report)
    }

    pub async fn incremental_sync(&self) -> Result<SyncOutcome> {
        let Some(previous) = self.state.last_indexed_commit()? else {
            info!("{}", NO_CURSOR_MESSAGE);
            return Ok(SyncOutcome::Full {
                reason: NO_CURSOR_MESSAGE,
                report: self.full_sync().await?,
            });
        };

        let resolution = self.settings.resolve(self.vcs, Some(&previous))?;
        if resolution.widened {
            return Ok(SyncOutcome::Full {
                reason: STALE_CURSOR_MESSAGE,
                report: self.full_sync().await?,
            });
        }
        let changes = resolution.changes;
        info!(
            since = %previous,
            added = changes.added.len(),
            modified = changes.modified.len(),
            deleted = changes.deleted.len(),
            "starting incremental update"
        );

        let mut report = IncrementalSyncReport {
            action: "incremental-update",
            files_added: 0,
            files_modified: 0,
            files_deleted: 0,
            chunks_added: 0,
            chunks_deleted: 0,
            previous_commit: Some(previous),
            current_commit: None,
            errors: Vec::new(),
        };

        for file in &changes.deleted {
            match self.store.delete_by_file(file).await {
                Ok(deleted) => {
                    report.files_deleted += 1;
                    report.chunks_deleted += deleted;
                }
                Err(e) => report.errors.push(FileError::new(file, e)),
            }
        }

        let mut seen = HashSet::new();
        let updates = changes
            .added
            .iter()
            .map(|f| (f, true))
            .chain(changes.modified.iter().map(|f| (f, false)));

        for (file, is_new) in updates {
            if !seen.insert(file.as_str()) {
                continue;
            }
            match self.update_file(file).await {
                Ok((deleted, Some(added))) => {
                    report.chunks_deleted += deleted;
                    report.chunks_added += added;
                    if is_new {
                        report.files_added += 1;
                    } else {
                        report.files_modified += 1;
                    }
                }
                Ok((deleted, None)) => report.chunks_deleted += deleted,
                Err(e) => report.errors.push(FileError::new(file, e)),
            }
        }

        report.current_commit = self.record_cursor();
        Ok(SyncOutcome::Incremental(report))
    }

    /// Re-chunk `file` and replace its chunk set, returning
    /// `(deleted, Some(added))`. A file that vanished only has its old
    /// chunks dropped: `(deleted, None)`.
    async fn update_file(&self, file: &str) -> Result<(usize, Option<usize>)> {
        match self.settings.chunk_file(file)? {
            Some(chunks) => {
                let (deleted, added) = self.store.replace_file(file, &chunks).await?;
                Ok((deleted, Some(added)))
            }
            None => Ok((self.store.delete_by_file(file).await?, None)),
        }
    }

    /// Persist the current head as the cursor. Failures leave the cursor
    /// unchanged and yield `None`, so the next run retries.
    fn record_cursor(&self) -> Option<String> {
        let head = match self.vcs.current_reference() {
            Ok(head) => head,
            Err(e) => {
                warn!(error = %e, "could not determine current commit, cursor not updated");
                return None;
            }
        };
        match self.state.set_last_indexed_commit(&head) {
            Ok(()) => Some(head),
            Err(e) => {
                warn!(error = %format!("{:#}", e), "could not save sync state, cursor not updated");
                None
            }
        }
    }
}
