//! # saveforge-core
//!
//! Core library for saveforge - branch-per-save versioning for game saves.
//!
//! This crate provides the versioning engine: the shared save repository,
//! the branch & checkpoint service, hash-based change detection, and the
//! metadata store interface.

pub mod cache;
pub mod checkpoint;
pub mod detector;
pub mod error;
pub mod hash;
pub mod metadata;
pub mod models;
pub mod repository;

pub use cache::HashCache;
pub use checkpoint::{derive_branch_name, CheckpointService};
pub use detector::ChangeDetector;
pub use error::{Error, Result};
pub use metadata::{MetadataStore, SqliteMetadataStore};
pub use models::{
    Branch, ChangeEvent, CommitRecord, Confidence, Fingerprint, GameEntry, SaveFileState,
    SaveHistory,
};
pub use repository::{LockMode, RepositoryManager};
