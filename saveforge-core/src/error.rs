use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Repository initialization failed: {0}")]
    RepositoryInit(String),

    #[error("Repository is busy with another operation")]
    RepositoryBusy,

    #[error("Operation timed out after {0:?}")]
    OperationTimedOut(std::time::Duration),

    #[error("Branch not found: {0}")]
    BranchNotFound(String),

    #[error("Commit not found: {0}")]
    CommitNotFound(String),

    #[error("Game not found: {0}")]
    GameNotFound(i64),

    #[error("Working tree has uncommitted changes")]
    DirtyWorkingTree,

    #[error("Restore requires explicit confirmation")]
    ConfirmationRequired,

    #[error("Hash computation failed for {path}: {source}")]
    HashComputationFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Watch setup failed: {0}")]
    WatchSetupFailed(String),

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

impl Error {
    /// Transient errors are retried internally; structural errors go back
    /// to the caller verbatim.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::RepositoryBusy
                | Error::OperationTimedOut(_)
                | Error::HashComputationFailed { .. }
                | Error::Io(_)
        )
    }
}
