//! # vault-rag core
//!
//! Pure logic for keeping a vector index in step with a git-tracked vault
//! of markdown notes: frontmatter/link/tag parsing, embedding-oriented
//! content cleaning, header-based chunking, change-set resolution against
//! version-control history, and the vector store abstraction.
//!
//! This crate spawns no processes and opens no databases. Git access and
//! persistent storage live behind the [`changes::Vcs`] and
//! [`store::VectorStore`] traits, implemented by the `vault-rag` app crate.

pub mod changes;
pub mod chunk;
pub mod clean;
pub mod embedding;
pub mod models;
pub mod parser;
pub mod search;
pub mod store;
