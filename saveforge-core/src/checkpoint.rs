//! Branch-per-save checkpointing on top of the shared repository.
//!
//! Each (game, save name) pair maps to one branch. Checkpointing stages
//! the game's current save files into the working tree and commits them on
//! that branch, creating or switching as needed. This is the only
//! component that mutates branches or commits, always through the
//! repository manager's lock.

use crate::error::{Error, Result};
use crate::metadata::MetadataStore;
use crate::models::{Branch, CommitRecord, GameEntry, SaveHistory};
use crate::repository::{self, LockMode, RepositoryManager};
use chrono::Utc;
use git2::{build::CheckoutBuilder, BranchType, IndexAddOption, Repository, ResetType};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Store-imposed ceiling on derived branch names.
pub const MAX_BRANCH_NAME_LEN: usize = 100;

/// Save name used for automatic checkpoints when no branch is active yet.
pub const DEFAULT_SAVE_NAME: &str = "autosave";

const DEFAULT_OP_DEADLINE: Duration = Duration::from_secs(30);

/// Reduce a raw name to the allowed character set (alphanumeric, dash,
/// underscore). Runs of rejected characters collapse into a single dash.
pub fn sanitize_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            out.push(c);
        } else if !out.is_empty() && !out.ends_with('-') {
            out.push('-');
        }
    }
    let out = out.trim_end_matches('-').to_string();
    if out.is_empty() {
        "unnamed".to_string()
    } else {
        out
    }
}

/// Deterministic branch name for a (game, save name) pair.
/// Pure: same inputs always produce the same name.
pub fn derive_branch_name(game_name: &str, save_name: &str) -> String {
    let mut name = format!(
        "{}-{}",
        sanitize_component(game_name),
        sanitize_component(save_name)
    );
    if name.len() > MAX_BRANCH_NAME_LEN {
        name.truncate(MAX_BRANCH_NAME_LEN);
        name = name.trim_end_matches('-').to_string();
    }
    name
}

pub struct CheckpointService {
    repo: Arc<RepositoryManager>,
    meta: Arc<dyn MetadataStore>,
    op_deadline: Duration,
}

impl CheckpointService {
    pub fn new(repo: Arc<RepositoryManager>, meta: Arc<dyn MetadataStore>) -> Self {
        Self {
            repo,
            meta,
            op_deadline: DEFAULT_OP_DEADLINE,
        }
    }

    /// Bound the wait for the repository lock on mutating operations.
    pub fn with_op_deadline(mut self, deadline: Duration) -> Self {
        self.op_deadline = deadline;
        self
    }

    pub fn repository(&self) -> &Arc<RepositoryManager> {
        &self.repo
    }

    /// Commit the game's current save files as a checkpoint on the branch
    /// derived from `save_name`. An existing branch is switched to, not an
    /// error: checkpointing is idempotent-by-switch.
    pub fn create_checkpoint(
        &self,
        game_id: i64,
        save_name: &str,
        message: &str,
    ) -> Result<CommitRecord> {
        let game = self.meta.get_game(game_id)?;
        let branch_name = derive_branch_name(&game.name, save_name);
        self.checkpoint_on_branch(&game, &branch_name, message)
    }

    /// Checkpoint onto the game's active branch, falling back to the
    /// default autosave branch when none is active. Used by the automatic
    /// trigger path.
    pub fn checkpoint_active(&self, game_id: i64, message: &str) -> Result<CommitRecord> {
        let game = self.meta.get_game(game_id)?;
        let branch_name = match self.meta.get_active_branch(game_id)? {
            Some(branch) => branch.name,
            None => derive_branch_name(&game.name, DEFAULT_SAVE_NAME),
        };
        self.checkpoint_on_branch(&game, &branch_name, message)
    }

    fn checkpoint_on_branch(
        &self,
        game: &GameEntry,
        branch_name: &str,
        message: &str,
    ) -> Result<CommitRecord> {
        let mode = LockMode::Deadline(self.op_deadline);
        let root = self.repo.root().to_path_buf();

        let (existed, commit_ref) = self.repo.with_repo(mode, |repo| {
            let existed = repo.find_branch(branch_name, BranchType::Local).is_ok();

            if existed {
                debug!("Branch '{}' exists, switching to it", branch_name);
                let target = repo
                    .find_branch(branch_name, BranchType::Local)?
                    .get()
                    .peel_to_commit()?;
                // Move the ref and index only; the working tree is about to
                // receive the new save state.
                repo.set_head(&format!("refs/heads/{}", branch_name))?;
                repo.reset(target.as_object(), ResetType::Mixed, None)?;
            } else {
                let head = repo.head()?.peel_to_commit()?;
                debug!(
                    "Creating branch '{}' from commit {}",
                    branch_name,
                    head.id()
                );
                repo.branch(branch_name, &head, false)?;
                repo.set_head(&format!("refs/heads/{}", branch_name))?;
            }

            sync_into_worktree(&root, game)?;
            let oid = commit_game_tree(repo, game.game_id, message)?;
            Ok((existed, oid.to_string()))
        })?;

        self.meta
            .upsert_branch(game.game_id, branch_name, None, true)?;
        let timestamp = Utc::now();
        self.meta
            .record_commit(branch_name, &commit_ref, message, timestamp)?;

        info!(
            "Checkpoint {} on {} branch '{}' for game {}",
            &commit_ref[..commit_ref.len().min(8)],
            if existed { "existing" } else { "new" },
            branch_name,
            game.game_id
        );

        Ok(CommitRecord {
            commit_ref,
            branch_name: branch_name.to_string(),
            message: message.to_string(),
            timestamp,
        })
    }

    /// Create a named branch for the game: a checkpoint under the given
    /// save name plus a description in the metadata store.
    pub fn create_branch(
        &self,
        game_id: i64,
        save_name: &str,
        description: Option<&str>,
    ) -> Result<Branch> {
        let record = self.create_checkpoint(
            game_id,
            save_name,
            &format!("Create save branch '{}'", save_name),
        )?;
        self.meta
            .upsert_branch(game_id, &record.branch_name, description, true)?;
        self.meta
            .get_active_branch(game_id)?
            .ok_or_else(|| Error::BranchNotFound(record.branch_name))
    }

    /// Check out an existing branch. Refuses to discard uncommitted
    /// working-tree changes.
    pub fn switch_branch(&self, game_id: i64, branch_name: &str) -> Result<()> {
        let mode = LockMode::Deadline(self.op_deadline);

        self.repo.with_repo(mode, |repo| {
            let branch = repo
                .find_branch(branch_name, BranchType::Local)
                .map_err(|_| Error::BranchNotFound(branch_name.to_string()))?;

            if repository::is_dirty(repo)? {
                return Err(Error::DirtyWorkingTree);
            }

            let commit = branch.get().peel_to_commit()?;
            let mut checkout = CheckoutBuilder::new();
            checkout.force();
            repo.checkout_tree(commit.as_object(), Some(&mut checkout))?;
            repo.set_head(&format!("refs/heads/{}", branch_name))?;
            Ok(())
        })?;

        self.meta.upsert_branch(game_id, branch_name, None, true)?;
        info!("Switched to branch '{}' for game {}", branch_name, game_id);
        Ok(())
    }

    /// Destructively restore the working tree (and the game's external
    /// save paths) to a recorded commit. Requires `confirmed`; a restore
    /// cannot be undone except by restoring a different commit, which is
    /// why the target commit is first parked on its own restore branch.
    pub fn restore_to_commit(
        &self,
        game_id: i64,
        commit_ref: &str,
        confirmed: bool,
    ) -> Result<String> {
        if !confirmed {
            return Err(Error::ConfirmationRequired);
        }

        let game = self.meta.get_game(game_id)?;
        let mode = LockMode::Deadline(self.op_deadline);
        let root = self.repo.root().to_path_buf();

        let restore_branch = self.repo.with_repo(mode, |repo| {
            let oid = git2::Oid::from_str(commit_ref)
                .map_err(|_| Error::CommitNotFound(commit_ref.to_string()))?;
            let commit = repo
                .find_commit(oid)
                .map_err(|_| Error::CommitNotFound(commit_ref.to_string()))?;

            let short: String = commit_ref.chars().take(8).collect();
            let restore_branch =
                format!("restore-{}-{}", Utc::now().format("%Y%m%d-%H%M%S"), short);

            repo.branch(&restore_branch, &commit, false)?;

            let mut checkout = CheckoutBuilder::new();
            checkout.force();
            repo.checkout_tree(commit.as_object(), Some(&mut checkout))?;
            repo.set_head(&format!("refs/heads/{}", restore_branch))?;

            sync_back_to_saves(&root, &game)?;
            Ok(restore_branch)
        })?;

        self.meta
            .upsert_branch(game_id, &restore_branch, Some("restore point"), true)?;
        info!(
            "Restored game {} to commit {} on branch '{}'",
            game_id, commit_ref, restore_branch
        );
        Ok(restore_branch)
    }

    /// Read-only history view: all recorded commits for the game, newest
    /// first, plus branch metadata. Served from the metadata store, so it
    /// never contends for the repository lock.
    pub fn get_history(&self, game_id: i64) -> Result<SaveHistory> {
        Ok(SaveHistory {
            commits: self.meta.commits_for_game(game_id)?,
            branches: self.meta.branches_for_game(game_id)?,
            active_branch: self.meta.get_active_branch(game_id)?.map(|b| b.name),
        })
    }
}

/// Working-tree directory holding a game's staged save files.
pub fn game_worktree_dir(repo_root: &Path, game_id: i64) -> PathBuf {
    repo_root.join("games").join(game_id.to_string())
}

/// Mirror the game's external save paths into the working tree. Each
/// monitored path gets a stable slot keyed by its index, so deletions
/// show up as deletions in the next commit.
fn sync_into_worktree(repo_root: &Path, game: &GameEntry) -> Result<()> {
    let game_dir = game_worktree_dir(repo_root, game.game_id);

    for (slot, source) in game.save_paths.iter().enumerate() {
        let dest = game_dir.join(slot.to_string());
        if dest.exists() {
            std::fs::remove_dir_all(&dest)?;
        }
        if source.is_dir() {
            copy_dir_recursive(source, &dest)?;
        } else if source.is_file() {
            std::fs::create_dir_all(&dest)?;
            let file_name = source
                .file_name()
                .ok_or_else(|| Error::InvalidOperation(format!("bad save path {:?}", source)))?;
            std::fs::copy(source, dest.join(file_name))?;
        }
        // A missing source is not an error: the save may not exist yet.
    }

    Ok(())
}

/// Copy restored slots from the working tree back over the game's
/// external save paths.
fn sync_back_to_saves(repo_root: &Path, game: &GameEntry) -> Result<()> {
    let game_dir = game_worktree_dir(repo_root, game.game_id);

    for (slot, target) in game.save_paths.iter().enumerate() {
        let source = game_dir.join(slot.to_string());
        if !source.exists() {
            continue;
        }
        if target.extension().is_some() && !target.is_dir() {
            // Single-file save path: the slot holds exactly that file.
            if let Some(file_name) = target.file_name() {
                let staged = source.join(file_name);
                if staged.is_file() {
                    if let Some(parent) = target.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::copy(&staged, target)?;
                }
            }
        } else {
            copy_dir_recursive(&source, target)?;
        }
    }

    Ok(())
}

fn copy_dir_recursive(source: &Path, dest: &Path) -> Result<()> {
    std::fs::create_dir_all(dest)?;
    for entry in std::fs::read_dir(source)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Stage the game's subtree and commit it on the current branch.
fn commit_game_tree(repo: &Repository, game_id: i64, message: &str) -> Result<git2::Oid> {
    let pathspec = format!("games/{}", game_id);
    let mut index = repo.index()?;
    index.add_all([pathspec.as_str()], IndexAddOption::DEFAULT, None)?;
    index.update_all([pathspec.as_str()], None)?;
    index.write()?;

    let tree_id = index.write_tree()?;
    let tree = repo.find_tree(tree_id)?;
    let sig = repository::signature(repo)?;
    let parent = repo.head()?.peel_to_commit()?;

    let oid = repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &[&parent])?;
    Ok(oid)
}
