//! # saveforge-sdk
//!
//! Client SDK for the saveforge daemon's command API, for UI and
//! automation layers.
//!
//! ## Example
//!
//! ```no_run
//! use saveforge_sdk::SaveforgeClient;
//!
//! let client = SaveforgeClient::new("http://localhost:4030");
//!
//! client
//!     .enable_versioning(1, "Skyrim", &["/home/me/.local/share/skyrim/saves"])
//!     .unwrap();
//!
//! let record = client
//!     .create_checkpoint(1, Some("Main Quest"), Some("before the fight"))
//!     .unwrap();
//! println!("checkpoint {}", record.commit_ref);
//! ```

use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Clone)]
pub struct SaveforgeClient {
    base_url: String,
    client: reqwest::blocking::Client,
}

#[derive(Serialize)]
struct EnableVersioningRequest<'a> {
    name: &'a str,
    save_paths: Vec<&'a str>,
}

#[derive(Serialize)]
struct CreateCheckpointRequest<'a> {
    save_name: Option<&'a str>,
    message: Option<&'a str>,
}

#[derive(Serialize)]
struct CreateBranchRequest<'a> {
    branch_name: &'a str,
    description: Option<&'a str>,
}

#[derive(Serialize)]
struct RestoreRequest<'a> {
    commit: &'a str,
    confirmed: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommitRecord {
    pub commit_ref: String,
    pub branch_name: String,
    pub message: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Branch {
    pub name: String,
    pub game_id: i64,
    pub description: Option<String>,
    pub is_active: bool,
    pub last_commit: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SaveHistory {
    pub commits: Vec<CommitRecord>,
    pub branches: Vec<Branch>,
    pub active_branch: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RestoreOutcome {
    pub restore_branch: String,
}

impl SaveforgeClient {
    /// Create a new client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of the saveforge daemon (e.g.
    ///   "http://localhost:4030")
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::blocking::Client::new(),
        }
    }

    /// Register a game and start monitoring its save paths.
    pub fn enable_versioning(&self, game_id: i64, name: &str, save_paths: &[&str]) -> Result<()> {
        let request = EnableVersioningRequest {
            name,
            save_paths: save_paths.to_vec(),
        };
        self.client
            .post(format!("{}/games/{}/versioning", self.base_url, game_id))
            .json(&request)
            .send()?
            .error_for_status()?;
        Ok(())
    }

    /// Stop monitoring a game.
    pub fn disable_versioning(&self, game_id: i64) -> Result<()> {
        self.client
            .post(format!(
                "{}/games/{}/versioning/disable",
                self.base_url, game_id
            ))
            .send()?
            .error_for_status()?;
        Ok(())
    }

    /// Create a checkpoint. Without a save name it lands on the game's
    /// active branch.
    pub fn create_checkpoint(
        &self,
        game_id: i64,
        save_name: Option<&str>,
        message: Option<&str>,
    ) -> Result<CommitRecord> {
        let request = CreateCheckpointRequest { save_name, message };
        let response = self
            .client
            .post(format!("{}/games/{}/checkpoints", self.base_url, game_id))
            .json(&request)
            .send()?
            .error_for_status()?;
        Ok(response.json()?)
    }

    /// Create a named save branch with an optional description.
    pub fn create_branch(
        &self,
        game_id: i64,
        branch_name: &str,
        description: Option<&str>,
    ) -> Result<Branch> {
        let request = CreateBranchRequest {
            branch_name,
            description,
        };
        let response = self
            .client
            .post(format!("{}/games/{}/branches", self.base_url, game_id))
            .json(&request)
            .send()?
            .error_for_status()?;
        Ok(response.json()?)
    }

    /// Switch the game to another save branch.
    pub fn switch_branch(&self, game_id: i64, branch_name: &str) -> Result<()> {
        self.client
            .post(format!(
                "{}/games/{}/branches/{}/switch",
                self.base_url, game_id, branch_name
            ))
            .send()?
            .error_for_status()?;
        Ok(())
    }

    /// Restore save files to a recorded commit. The daemon rejects the
    /// call unless `confirmed` is true.
    pub fn restore_to_commit(
        &self,
        game_id: i64,
        commit: &str,
        confirmed: bool,
    ) -> Result<RestoreOutcome> {
        let request = RestoreRequest { commit, confirmed };
        let response = self
            .client
            .post(format!("{}/games/{}/restore", self.base_url, game_id))
            .json(&request)
            .send()?
            .error_for_status()?;
        Ok(response.json()?)
    }

    /// Fetch checkpoint history for a game.
    pub fn get_history(&self, game_id: i64) -> Result<SaveHistory> {
        let response = self
            .client
            .get(format!("{}/games/{}/history", self.base_url, game_id))
            .send()?
            .error_for_status()?;
        Ok(response.json()?)
    }

    /// Check daemon health.
    pub fn health_check(&self) -> Result<bool> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()?;
        Ok(response.status().is_success())
    }
}
