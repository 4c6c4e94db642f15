//! Git adapter for the change-set resolver.
//!
//! Shells out to the `git` binary. History queries (`rev-parse`, `diff`)
//! go through git; the full listing walks the working tree with `walkdir`
//! and matches the vault pattern with `globset`, so a fresh index also picks
//! up notes that are not committed yet.
//!
//! All paths are relative to the adapter's root, which may be a subdirectory
//! of the work tree (`--relative` keeps diff output consistent with the walk).

use std::path::{Path, PathBuf};
use std::process::Command;

use globset::{Glob, GlobMatcher};
use tracing::debug;
use walkdir::WalkDir;

use vault_rag_core::changes::{PathChange, PathFilter, Vcs, VcsError};

/// Top-level directory of the repository enclosing `start`, via
/// `git rev-parse --show-toplevel`.
pub fn find_repo_root(start: &Path) -> Result<PathBuf, VcsError> {
    let output = Command::new("git")
        .args(["rev-parse", "--show-toplevel"])
        .current_dir(start)
        .output()?;

    if !output.status.success() {
        return Err(VcsError::NotARepository(start.display().to_string()));
    }

    let top = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if top.is_empty() {
        return Err(VcsError::InvalidOutput(
            "git rev-parse --show-toplevel printed nothing".to_string(),
        ));
    }
    Ok(PathBuf::from(top))
}

/// [`Vcs`] backed by the git command-line client.
#[derive(Debug, Clone)]
pub struct GitCli {
    root: PathBuf,
    filter: PathFilter,
}

impl GitCli {
    /// Use `root` as the work tree without checking it.
    pub fn open(root: impl Into<PathBuf>, filter: PathFilter) -> Self {
        Self {
            root: root.into(),
            filter,
        }
    }

    /// Paths staged in the index (added, copied, deleted, modified or
    /// renamed) that match `pattern`, hidden and index paths excluded.
    pub fn staged_files(&self, pattern: &str) -> Result<Vec<String>, VcsError> {
        let stdout = self.git(&[
            "diff",
            "--cached",
            "--name-only",
            "--relative",
            "-z",
            "--diff-filter=ACDMR",
            "--",
            pattern,
        ])?;
        Ok(stdout
            .split('\0')
            .filter(|p| !p.is_empty())
            .filter(|p| self.filter.accepts(p))
            .map(String::from)
            .collect())
    }

    fn git(&self, args: &[&str]) -> Result<String, VcsError> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .output()?;

        if !output.status.success() {
            return Err(VcsError::CommandFailed {
                command: format!("git {}", args.join(" ")),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        String::from_utf8(output.stdout)
            .map_err(|e| VcsError::InvalidOutput(format!("non-UTF-8 output from git: {e}")))
    }
}

impl Vcs for GitCli {
    fn is_repository(&self, path: &Path) -> bool {
        Command::new("git")
            .args(["rev-parse", "--git-dir"])
            .current_dir(path)
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn current_reference(&self) -> Result<String, VcsError> {
        let sha = self.git(&["rev-parse", "HEAD"])?.trim().to_string();
        if sha.is_empty() {
            return Err(VcsError::InvalidOutput(
                "git rev-parse HEAD printed nothing".to_string(),
            ));
        }
        Ok(sha)
    }

    fn diff(&self, since: &str, pattern: &str) -> Result<Vec<PathChange>, VcsError> {
        let stdout = self.git(&[
            "diff",
            "--name-status",
            "--relative",
            "-z",
            "--find-renames",
            since,
            "HEAD",
            "--",
            pattern,
        ])?;
        parse_name_status(&stdout)
    }

    fn list_files(&self, pattern: &str) -> Result<Vec<String>, VcsError> {
        let matcher = build_matcher(pattern)?;
        let index_dir = self.filter.index_dir().to_string();

        let walker = WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0 || {
                    let name = e.file_name().to_string_lossy();
                    !name.starts_with('.') && name != index_dir.as_str()
                }
            });

        let mut files = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|e| VcsError::Io(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let rel = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if matcher.is_match(&rel) {
                files.push(rel);
            }
        }
        Ok(files)
    }
}

fn build_matcher(pattern: &str) -> Result<GlobMatcher, VcsError> {
    Glob::new(pattern)
        .map(|g| g.compile_matcher())
        .map_err(|e| VcsError::InvalidOutput(format!("invalid file pattern '{pattern}': {e}")))
}

/// Parse `git diff --name-status -z` output.
///
/// Records are NUL separated: a status token followed by one path, or two
/// paths for renames and copies (`R100`, `C75`). Copies count as additions
/// of the destination; type changes (`T`) count as modifications.
pub fn parse_name_status(output: &str) -> Result<Vec<PathChange>, VcsError> {
    let mut tokens = output.split('\0').filter(|t| !t.is_empty());
    let mut changes = Vec::new();

    while let Some(status) = tokens.next() {
        let mut next_path = || {
            tokens
                .next()
                .map(String::from)
                .ok_or_else(|| VcsError::InvalidOutput(format!("missing path after status '{status}'")))
        };

        match status.chars().next() {
            Some('A') => changes.push(PathChange::Added(next_path()?)),
            Some('M') | Some('T') => changes.push(PathChange::Modified(next_path()?)),
            Some('D') => changes.push(PathChange::Deleted(next_path()?)),
            Some('R') => {
                let from = next_path()?;
                let to = next_path()?;
                changes.push(PathChange::Renamed { from, to });
            }
            Some('C') => {
                let _source = next_path()?;
                changes.push(PathChange::Added(next_path()?));
            }
            _ => {
                let path = next_path()?;
                debug!(status, path = %path, "ignoring unsupported diff status");
            }
        }
    }

    Ok(changes)
}
