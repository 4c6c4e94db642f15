//! TOML configuration for `vault-rag`.
//!
//! Every section and key is optional. The file is looked up at
//! `<repo_root>/.vault-rag.toml` unless `--config` names one explicitly.
//!
//! ```toml
//! [vault]
//! pattern = "*.md"
//!
//! [chunking]
//! min_chars = 100
//! max_chars = 2000
//!
//! [store]
//! dir = "rag_db"
//! collection = "obsidian_vault"
//!
//! [embedding]
//! provider = "hash"        # or "openai"
//!
//! [search]
//! top_k = 5
//!
//! [state]
//! file = ".vault-rag.json"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use vault_rag_core::chunk::{ChunkingParams, DEFAULT_MAX_CHARS, DEFAULT_MIN_CHARS};
use vault_rag_core::embedding::DEFAULT_HASH_DIMS;

/// File name looked up in the repository root when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = ".vault-rag.toml";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub vault: VaultConfig,
    pub chunking: ChunkingConfig,
    pub store: StoreConfig,
    pub embedding: EmbeddingConfig,
    pub search: SearchConfig,
    pub state: StateConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct VaultConfig {
    /// Tracked file pattern; `*` matches across directories.
    pub pattern: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            pattern: "*.md".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChunkingConfig {
    pub min_chars: usize,
    pub max_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            min_chars: DEFAULT_MIN_CHARS,
            max_chars: DEFAULT_MAX_CHARS,
        }
    }
}

impl ChunkingConfig {
    pub fn params(&self) -> ChunkingParams {
        ChunkingParams {
            min_chars: self.min_chars,
            max_chars: self.max_chars,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StoreConfig {
    /// Index directory, relative to the repository root.
    pub dir: PathBuf,
    pub collection: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("rag_db"),
            collection: "obsidian_vault".to_string(),
        }
    }
}

impl StoreConfig {
    /// Final path component of `dir`; paths containing it are never indexed.
    pub fn dir_name(&self) -> String {
        self.dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.dir.to_string_lossy().into_owned())
    }

    pub fn db_path(&self, repo_root: &Path) -> PathBuf {
        repo_root.join(&self.dir).join("index.sqlite")
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `"hash"` (offline, deterministic) or `"openai"`.
    pub provider: String,
    pub model: Option<String>,
    pub dims: Option<usize>,
    pub batch_size: usize,
    pub max_retries: u32,
    pub timeout_secs: u64,
    /// Override for OpenAI-compatible endpoints.
    pub base_url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "hash".to_string(),
            model: None,
            dims: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
            base_url: None,
        }
    }
}

impl EmbeddingConfig {
    pub fn hash_dims(&self) -> usize {
        self.dims.unwrap_or(DEFAULT_HASH_DIMS)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SearchConfig {
    pub top_k: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { top_k: 5 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StateConfig {
    /// Sync-state file, relative to the repository root.
    pub file: PathBuf,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            file: PathBuf::from(".vault-rag.json"),
        }
    }
}

/// Load configuration for the repository at `repo_root`.
///
/// An explicit `path` must exist. Without one, a missing
/// `<repo_root>/.vault-rag.toml` yields the defaults.
pub fn load_config(explicit: Option<&Path>, repo_root: &Path) -> Result<Config> {
    let config = match explicit {
        Some(path) => parse_file(path)?,
        None => {
            let path = repo_root.join(DEFAULT_CONFIG_FILE);
            if path.exists() {
                parse_file(&path)?
            } else {
                Config::default()
            }
        }
    };
    validate(&config)?;
    Ok(config)
}

fn parse_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.max_chars == 0 {
        bail!("chunking.max_chars must be > 0");
    }
    if config.chunking.min_chars > config.chunking.max_chars {
        bail!(
            "chunking.min_chars ({}) must not exceed chunking.max_chars ({})",
            config.chunking.min_chars,
            config.chunking.max_chars
        );
    }
    if config.search.top_k == 0 {
        bail!("search.top_k must be >= 1");
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be >= 1");
    }
    if config.store.dir.as_os_str().is_empty() {
        bail!("store.dir must not be empty");
    }

    match config.embedding.provider.as_str() {
        "hash" => {
            if config.embedding.dims == Some(0) {
                bail!("embedding.dims must be > 0");
            }
        }
        "openai" => {
            if config.embedding.model.is_none() {
                bail!("embedding.model must be specified when provider is 'openai'");
            }
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                bail!("embedding.dims must be > 0 when provider is 'openai'");
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be hash or openai.",
            other
        ),
    }

    Ok(())
}
