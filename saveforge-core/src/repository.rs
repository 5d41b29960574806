//! Lifecycle-managed owner of the shared on-disk save repository.
//!
//! One repository per installation. Every mutating operation goes through
//! the exclusive lock here; branches for all games share one physical
//! working tree, so mutual exclusion is global.

use crate::error::{Error, Result};
use git2::{Repository, Signature, StatusOptions};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, TryLockError};
use std::time::{Duration, Instant};
use tracing::info;

/// Save payload extensions registered as opaque blobs at init; never
/// diffed or merged by the store.
const BLOB_EXTENSIONS: &[&str] = &["sav", "save", "dat", "bak", "zst"];

const LOCK_POLL: Duration = Duration::from_millis(10);

/// How a caller wants to wait for the repository lock.
#[derive(Debug, Clone, Copy)]
pub enum LockMode {
    /// Block until the lock is free.
    Block,
    /// Fail fast with `RepositoryBusy`.
    Fail,
    /// Wait up to the deadline, then `OperationTimedOut`. The mutation
    /// never starts after the deadline fires, so a timed-out call leaves
    /// the store untouched.
    Deadline(Duration),
}

pub struct RepositoryManager {
    root: PathBuf,
    repo: Mutex<Repository>,
}

impl RepositoryManager {
    /// Open the repository at `root`, initializing it on first run.
    /// Idempotent: an already-initialized root is reopened without side
    /// effects.
    pub fn open_or_create(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        let repo = if root.join(".git").exists() {
            Repository::open(&root)
                .map_err(|e| Error::RepositoryInit(format!("{}: {}", root.display(), e)))?
        } else {
            std::fs::create_dir_all(&root)
                .map_err(|e| Error::RepositoryInit(format!("{}: {}", root.display(), e)))?;
            let repo = Repository::init(&root)
                .map_err(|e| Error::RepositoryInit(format!("{}: {}", root.display(), e)))?;
            write_attributes(&root)?;
            create_initial_commit(&repo)?;
            info!("Initialized save repository at {:?}", root);
            repo
        };

        Ok(Self {
            root,
            repo: Mutex::new(repo),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Run `f` under the exclusive repository lock.
    pub fn with_repo<T>(
        &self,
        mode: LockMode,
        f: impl FnOnce(&Repository) -> Result<T>,
    ) -> Result<T> {
        let guard = self.acquire(mode)?;
        f(&guard)
    }

    fn acquire(&self, mode: LockMode) -> Result<MutexGuard<'_, Repository>> {
        match mode {
            LockMode::Block => Ok(self
                .repo
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())),
            LockMode::Fail => match self.repo.try_lock() {
                Ok(guard) => Ok(guard),
                Err(TryLockError::Poisoned(poisoned)) => Ok(poisoned.into_inner()),
                Err(TryLockError::WouldBlock) => Err(Error::RepositoryBusy),
            },
            LockMode::Deadline(limit) => {
                let started = Instant::now();
                loop {
                    match self.repo.try_lock() {
                        Ok(guard) => return Ok(guard),
                        Err(TryLockError::Poisoned(poisoned)) => return Ok(poisoned.into_inner()),
                        Err(TryLockError::WouldBlock) => {
                            if started.elapsed() >= limit {
                                return Err(Error::OperationTimedOut(limit));
                            }
                            std::thread::sleep(LOCK_POLL);
                        }
                    }
                }
            }
        }
    }
}

/// True when the working tree holds changes a checkout would discard.
pub fn is_dirty(repo: &Repository) -> Result<bool> {
    let mut opts = StatusOptions::new();
    opts.include_untracked(true).include_ignored(false);
    let statuses = repo.statuses(Some(&mut opts))?;
    Ok(!statuses.is_empty())
}

/// Name of the currently checked-out branch.
pub fn head_branch(repo: &Repository) -> Result<String> {
    let head = repo.head()?;
    Ok(head.shorthand().unwrap_or("detached").to_string())
}

pub fn signature(repo: &Repository) -> Result<Signature<'static>> {
    let config = repo.config()?;
    let name = config
        .get_string("user.name")
        .unwrap_or_else(|_| "saveforge".to_string());
    let email = config
        .get_string("user.email")
        .unwrap_or_else(|_| "saveforge@local".to_string());
    Ok(Signature::now(&name, &email)?)
}

fn write_attributes(root: &Path) -> Result<()> {
    let attributes = BLOB_EXTENSIONS
        .iter()
        .map(|ext| format!("*.{} binary -diff -merge\n", ext))
        .collect::<String>();
    std::fs::write(root.join(".gitattributes"), attributes)
        .map_err(|e| Error::RepositoryInit(format!("failed to write .gitattributes: {}", e)))?;
    Ok(())
}

fn create_initial_commit(repo: &Repository) -> Result<()> {
    let sig = signature(repo)?;
    let tree_id = {
        let mut index = repo.index()?;
        index.add_path(Path::new(".gitattributes"))?;
        index.write()?;
        index.write_tree()?
    };
    let tree = repo.find_tree(tree_id)?;
    repo.commit(
        Some("refs/heads/main"),
        &sig,
        &sig,
        "Initialize save repository",
        &tree,
        &[],
    )?;
    repo.set_head("refs/heads/main")?;
    Ok(())
}
