//! # vault-rag CLI
//!
//! Keeps a vector index of a git-tracked markdown vault in step with its
//! history, and queries it.
//!
//! ## Usage
//!
//! ```bash
//! vault-rag [--config <toml>] [--repo <dir>] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `vault-rag full-index` | Clear the index and chunk every note |
//! | `vault-rag incremental-update` | Apply the changes since the last indexed commit |
//! | `vault-rag search -q "<query>"` | Ranked chunks most similar to the query |
//! | `vault-rag stats` | Chunk count, store identity and last indexed commit |
//! | `vault-rag staged` | Notes currently staged in the git index |
//!
//! Every command prints a single JSON document on stdout. Logs go to stderr
//! and are controlled by `RUST_LOG`.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use vault_rag::config::{self, Config};
use vault_rag::connector_git::{find_repo_root, GitCli};
use vault_rag::embedding::create_embedder;
use vault_rag::ingest::{
    plan_full, plan_incremental, PlanOutcome, SyncOutcome, SyncSettings, Synchronizer,
};
use vault_rag::search::run_search;
use vault_rag::sqlite_store::SqliteStore;
use vault_rag::state::{JsonStateFile, StateStore};
use vault_rag::stats::run_stats;
use vault_rag_core::changes::{PathFilter, Vcs};

/// Semantic index for a git-tracked markdown vault.
#[derive(Parser)]
#[command(
    name = "vault-rag",
    about = "Semantic index for a git-tracked markdown vault",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `.vault-rag.toml` in the repository root; a missing
    /// default file means built-in defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory inside the vault repository. Defaults to the working
    /// directory.
    #[arg(long, global = true)]
    repo: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clear the index and chunk every tracked note.
    FullIndex {
        /// Show the files and chunk estimate without touching the index.
        #[arg(long)]
        dry_run: bool,
    },

    /// Re-index only the notes changed since the last indexed commit.
    ///
    /// Runs a full index instead when there is no usable last commit.
    IncrementalUpdate {
        /// Show the change set without touching the index.
        #[arg(long)]
        dry_run: bool,
    },

    /// Search the index.
    Search {
        /// Query text.
        #[arg(short, long)]
        query: String,

        /// Maximum number of results. Defaults to `[search] top_k`.
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Only return chunks whose file path contains this string.
        #[arg(short, long)]
        file_filter: Option<String>,
    },

    /// Show index statistics.
    Stats,

    /// List notes staged in the git index.
    Staged,
}

/// Everything a command needs once the repository is known.
struct Workspace {
    config: Config,
    git: GitCli,
    state: JsonStateFile,
    repo_root: PathBuf,
    vault_root: PathBuf,
}

impl Workspace {
    fn open(cli: &Cli, repo_root: PathBuf) -> Result<Self> {
        let config = config::load_config(cli.config.as_deref(), &repo_root)?;
        let state = JsonStateFile::new(repo_root.join(&config.state.file));
        let vault_root = state.vault_path(&repo_root)?;
        let git = GitCli::open(vault_root.clone(), PathFilter::new(config.store.dir_name()));

        if !git.is_repository(&vault_root) {
            anyhow::bail!("Vault path is not inside a git repository: {}", vault_root.display());
        }

        Ok(Self {
            config,
            git,
            state,
            repo_root,
            vault_root,
        })
    }

    fn settings(&self) -> SyncSettings {
        SyncSettings {
            vault_root: self.vault_root.clone(),
            pattern: self.config.vault.pattern.clone(),
            params: self.config.chunking.params(),
            filter: PathFilter::new(self.config.store.dir_name()),
        }
    }

    async fn open_store(&self) -> Result<SqliteStore> {
        let embedder = create_embedder(&self.config.embedding)?;
        SqliteStore::open(
            &self.config.store.db_path(&self.repo_root),
            &self.config.store.collection,
            embedder,
            self.config.embedding.batch_size,
        )
        .await
        .context("Failed to open vector store")
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let start = match &cli.repo {
        Some(dir) => dir.clone(),
        None => PathBuf::from("."),
    };
    let repo_root = match find_repo_root(&start) {
        Ok(root) => root,
        Err(e) => {
            tracing::debug!(error = %e, "repository discovery failed");
            print_json(&json!({ "error": "Not in a git repository" }));
            return ExitCode::FAILURE;
        }
    };

    match run(&cli, repo_root).await {
        Ok(code) => code,
        Err(e) => {
            print_json(&json!({ "error": format!("{:#}", e) }));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli, repo_root: PathBuf) -> Result<ExitCode> {
    let ws = Workspace::open(cli, repo_root)?;

    match &cli.command {
        Commands::FullIndex { dry_run: true } => {
            print_json(&plan_full(&ws.git, &ws.settings())?);
        }
        Commands::FullIndex { dry_run: false } => {
            let store = ws.open_store().await?;
            let report = Synchronizer::new(&store, &ws.git, &ws.state, ws.settings())
                .full_sync()
                .await?;
            store.close().await;
            print_json(&report);
        }
        Commands::IncrementalUpdate { dry_run: true } => {
            match plan_incremental(&ws.git, &ws.state, &ws.settings())? {
                PlanOutcome::Full { reason, plan } => {
                    print_delegation(reason);
                    print_json(&plan);
                }
                PlanOutcome::Incremental(plan) => print_json(&plan),
            }
        }
        Commands::IncrementalUpdate { dry_run: false } => {
            let store = ws.open_store().await?;
            let outcome = Synchronizer::new(&store, &ws.git, &ws.state, ws.settings())
                .incremental_sync()
                .await?;
            store.close().await;
            match outcome {
                SyncOutcome::Full { reason, report } => {
                    print_delegation(reason);
                    print_json(&report);
                }
                SyncOutcome::Incremental(report) => print_json(&report),
            }
        }
        Commands::Search {
            query,
            top_k,
            file_filter,
        } => {
            let store = ws.open_store().await?;
            let top_k = top_k.unwrap_or(ws.config.search.top_k);
            let outcome = run_search(&store, query, top_k, file_filter.as_deref()).await?;
            store.close().await;
            print_json(&outcome);
            if outcome.is_error() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Stats => {
            let store = ws.open_store().await?;
            let report = run_stats(&store, &ws.state).await?;
            store.close().await;
            print_json(&report);
        }
        Commands::Staged => {
            let files = ws.git.staged_files(&ws.config.vault.pattern)?;
            print_json(&json!({ "total": files.len(), "files": files }));
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn print_delegation(reason: &str) {
    print_json(&json!({ "message": reason, "action": "full-index" }));
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{}", s),
        Err(e) => eprintln!("Failed to serialize output: {}", e),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

