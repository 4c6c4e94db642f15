//! Change-set resolution against version-control history.
//!
//! [`resolve`] turns a history reference into a [`ChangeSet`] over the
//! tracked file pattern. With no reference, every tracked file is listed as
//! added. With a reference, the VCS diff is classified per path and renames
//! are split into a deletion plus an addition. A reference the VCS cannot
//! resolve silently widens to the full listing, which forces a full reindex.
//!
//! Hidden paths (any dot-prefixed segment) and anything inside the index
//! storage directory are never part of a change set.

use std::path::Path;

use thiserror::Error;
use tracing::warn;

use crate::models::ChangeSet;

/// Errors raised by a [`Vcs`] implementation.
#[derive(Debug, Error)]
pub enum VcsError {
    #[error("not inside a git repository: {0}")]
    NotARepository(String),

    #[error("`{command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("failed to run git: {0}")]
    Io(#[from] std::io::Error),

    #[error("unexpected git output: {0}")]
    InvalidOutput(String),
}

/// Per-path status reported by a history diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathChange {
    Added(String),
    Modified(String),
    Deleted(String),
    Renamed { from: String, to: String },
}

/// The version-control operations the resolver and synchronizer consume.
pub trait Vcs {
    /// Whether `path` lies inside a repository.
    fn is_repository(&self, path: &Path) -> bool;

    /// Identifier of the current head (a commit SHA for git).
    fn current_reference(&self) -> Result<String, VcsError>;

    /// Path-level diff between `since` and head, restricted to `pattern`.
    ///
    /// Fails if `since` does not name anything in history.
    fn diff(&self, since: &str, pattern: &str) -> Result<Vec<PathChange>, VcsError>;

    /// Every file currently present in the tree that matches `pattern`,
    /// as repo-relative `/`-separated paths.
    fn list_files(&self, pattern: &str) -> Result<Vec<String>, VcsError>;
}

/// Excludes hidden paths and the index storage directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathFilter {
    index_dir: String,
}

impl PathFilter {
    pub fn new(index_dir: impl Into<String>) -> Self {
        Self {
            index_dir: index_dir.into(),
        }
    }

    pub fn index_dir(&self) -> &str {
        &self.index_dir
    }

    /// `true` if `path` may be indexed.
    pub fn accepts(&self, path: &str) -> bool {
        !path
            .split(['/', '\\'])
            .filter(|segment| !segment.is_empty())
            .any(|segment| segment.starts_with('.') || segment == self.index_dir)
    }
}

/// Outcome of [`resolve_changes`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub changes: ChangeSet,
    /// `true` when a reference was given but could not be diffed, so
    /// `changes` is the full listing instead.
    pub widened: bool,
}

/// Resolve the change set since `since` (or the full listing for `None`).
pub fn resolve<V: Vcs + ?Sized>(
    vcs: &V,
    since: Option<&str>,
    pattern: &str,
    filter: &PathFilter,
) -> Result<ChangeSet, VcsError> {
    resolve_changes(vcs, since, pattern, filter).map(|r| r.changes)
}

/// Like [`resolve`], but also reports whether an unresolvable reference
/// widened the result to the full listing.
pub fn resolve_changes<V: Vcs + ?Sized>(
    vcs: &V,
    since: Option<&str>,
    pattern: &str,
    filter: &PathFilter,
) -> Result<Resolution, VcsError> {
    let Some(since) = since else {
        return Ok(Resolution {
            changes: full_listing(vcs, pattern, filter)?,
            widened: false,
        });
    };

    let diff = match vcs.diff(since, pattern) {
        Ok(diff) => diff,
        Err(e) => {
            warn!(since, error = %e, "cannot diff against reference, falling back to full listing");
            return Ok(Resolution {
                changes: full_listing(vcs, pattern, filter)?,
                widened: true,
            });
        }
    };

    let mut set = ChangeSet::default();
    for change in diff {
        match change {
            PathChange::Added(path) => push_if(&mut set.added, path, filter),
            PathChange::Modified(path) => push_if(&mut set.modified, path, filter),
            PathChange::Deleted(path) => push_if(&mut set.deleted, path, filter),
            PathChange::Renamed { from, to } => {
                push_if(&mut set.deleted, from, filter);
                push_if(&mut set.added, to, filter);
            }
        }
    }
    Ok(Resolution {
        changes: set,
        widened: false,
    })
}

fn full_listing<V: Vcs + ?Sized>(
    vcs: &V,
    pattern: &str,
    filter: &PathFilter,
) -> Result<ChangeSet, VcsError> {
    let added = vcs
        .list_files(pattern)?
        .into_iter()
        .filter(|path| filter.accepts(path))
        .collect();
    Ok(ChangeSet {
        added,
        ..ChangeSet::default()
    })
}

fn push_if(bucket: &mut Vec<String>, path: String, filter: &PathFilter) {
    if filter.accepts(&path) {
        bucket.push(path);
    }
}
