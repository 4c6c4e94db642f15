//! # vault-rag
//!
//! Keeps a semantic index of a git-tracked markdown vault in step with the
//! vault's history.
//!
//! Notes are split into heading-scoped chunks, embedded, and stored in a
//! local SQLite database. Git tells the indexer what changed since the last
//! run, so routine updates only touch the files that moved.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌───────────┐
//! │  git (Vcs)  │──▶│ Synchronizer │──▶│  SQLite   │
//! │ diff / walk │   │ Chunk+Embed  │   │  vectors  │
//! └─────────────┘   └──────┬───────┘   └─────┬─────┘
//!                          │                 │
//!                          ▼                 ▼
//!                   ┌────────────┐     ┌──────────┐
//!                   │ state JSON │     │   CLI    │
//!                   │  (cursor)  │     │vault-rag │
//!                   └────────────┘     └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! vault-rag full-index                  # index every note
//! vault-rag incremental-update          # catch up with new commits
//! vault-rag search -q "deployment" -k 5
//! vault-rag stats
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`state`] | Sync-state file holding the last indexed commit |
//! | [`connector_git`] | Git adapter for change-set resolution |
//! | [`ingest`] | Full and incremental synchronization |
//! | [`embedding`] | Embedder selection and the HTTP embedder |
//! | [`sqlite_store`] | SQLite-backed vector store |
//! | [`search`] | The `search` command |
//! | [`stats`] | The `stats` command |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod config;
pub mod connector_git;
pub mod db;
pub mod embedding;
pub mod ingest;
pub mod migrate;
pub mod search;
pub mod sqlite_store;
pub mod state;
pub mod stats;
