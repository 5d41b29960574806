pub mod branch;
pub mod checkpoint;
pub mod enable;
pub mod history;
pub mod restore;
pub mod start;
pub mod switch;

use saveforge_core::checkpoint::CheckpointService;
use saveforge_core::metadata::{MetadataStore, SqliteMetadataStore};
use saveforge_core::repository::RepositoryManager;
use std::path::PathBuf;
use std::sync::Arc;

pub fn get_data_dir(custom_path: Option<PathBuf>) -> PathBuf {
    custom_path.unwrap_or_else(|| {
        std::env::current_dir()
            .expect("cannot resolve current directory")
            .join(".saveforge")
    })
}

pub fn repo_path(data_dir: &PathBuf) -> PathBuf {
    data_dir.join("repo")
}

pub fn db_path(data_dir: &PathBuf) -> PathBuf {
    data_dir.join("saveforge.db")
}

/// Open the engine locally against the data directory, initializing it on
/// first use.
pub fn open_service(data_dir: &PathBuf) -> anyhow::Result<CheckpointService> {
    std::fs::create_dir_all(data_dir)?;
    let repo = Arc::new(RepositoryManager::open_or_create(repo_path(data_dir))?);
    let meta: Arc<dyn MetadataStore> = Arc::new(SqliteMetadataStore::new(db_path(data_dir))?);
    Ok(CheckpointService::new(repo, meta))
}

pub fn open_metadata(data_dir: &PathBuf) -> anyhow::Result<SqliteMetadataStore> {
    std::fs::create_dir_all(data_dir)?;
    Ok(SqliteMetadataStore::new(db_path(data_dir))?)
}
