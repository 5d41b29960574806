use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::SystemTime;

/// Content fingerprint of a save file, hex-encoded.
///
/// The value is strategy-independent: direct, streamed and parallel hashing
/// of the same bytes all produce the same fingerprint (see `hash`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(pub String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// How many independent signals (fingerprint, size, mtime) agree that a
/// detected change is real.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// A significant change to a monitored save path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ChangeEvent {
    Created {
        path: PathBuf,
        fingerprint: Fingerprint,
        size: u64,
        confidence: Confidence,
    },
    Modified {
        path: PathBuf,
        old_fingerprint: Fingerprint,
        new_fingerprint: Fingerprint,
        size: u64,
        confidence: Confidence,
    },
    Deleted {
        path: PathBuf,
        old_fingerprint: Fingerprint,
        confidence: Confidence,
    },
    Restructured {
        old_path: PathBuf,
        new_path: PathBuf,
        fingerprint: Option<Fingerprint>,
        confidence: Confidence,
    },
}

impl ChangeEvent {
    pub fn path(&self) -> &PathBuf {
        match self {
            ChangeEvent::Created { path, .. } => path,
            ChangeEvent::Modified { path, .. } => path,
            ChangeEvent::Deleted { path, .. } => path,
            ChangeEvent::Restructured { new_path, .. } => new_path,
        }
    }

    pub fn confidence(&self) -> Confidence {
        match self {
            ChangeEvent::Created { confidence, .. } => *confidence,
            ChangeEvent::Modified { confidence, .. } => *confidence,
            ChangeEvent::Deleted { confidence, .. } => *confidence,
            ChangeEvent::Restructured { confidence, .. } => *confidence,
        }
    }

    /// Byte size involved in the change, where known.
    pub fn size(&self) -> u64 {
        match self {
            ChangeEvent::Created { size, .. } => *size,
            ChangeEvent::Modified { size, .. } => *size,
            _ => 0,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ChangeEvent::Created { .. } => "created",
            ChangeEvent::Modified { .. } => "modified",
            ChangeEvent::Deleted { .. } => "deleted",
            ChangeEvent::Restructured { .. } => "restructured",
        }
    }
}

/// Cached per-path file state. Valid only while size and mtime still match
/// the filesystem.
#[derive(Debug, Clone)]
pub struct SaveFileState {
    pub path: PathBuf,
    pub fingerprint: Fingerprint,
    pub size: u64,
    pub modified: SystemTime,
    pub cached_at: SystemTime,
}

impl SaveFileState {
    pub fn matches(&self, size: u64, modified: SystemTime) -> bool {
        self.size == size && self.modified == modified
    }
}

/// A branch in the shared save repository. One branch per (game, save name).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Branch {
    pub name: String,
    pub game_id: i64,
    pub description: Option<String>,
    pub is_active: bool,
    pub last_commit: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A checkpoint commit recorded in the metadata store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitRecord {
    pub commit_ref: String,
    pub branch_name: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Read-only history view for one game.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveHistory {
    pub commits: Vec<CommitRecord>,
    pub branches: Vec<Branch>,
    pub active_branch: Option<String>,
}

/// A game registered for versioning, with the save paths to monitor.
/// Paths come from an external detection subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameEntry {
    pub game_id: i64,
    pub name: String,
    pub save_paths: Vec<PathBuf>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_ordering() {
        assert!(Confidence::High > Confidence::Medium);
        assert!(Confidence::Medium > Confidence::Low);
    }

    #[test]
    fn test_change_event_accessors() {
        let event = ChangeEvent::Created {
            path: PathBuf::from("slot1.sav"),
            fingerprint: Fingerprint("abc123".into()),
            size: 42,
            confidence: Confidence::High,
        };

        assert_eq!(event.path(), &PathBuf::from("slot1.sav"));
        assert_eq!(event.confidence(), Confidence::High);
        assert_eq!(event.size(), 42);
        assert_eq!(event.kind(), "created");
    }

    #[test]
    fn test_cache_entry_validity() {
        let now = SystemTime::now();
        let state = SaveFileState {
            path: PathBuf::from("slot1.sav"),
            fingerprint: Fingerprint("abc".into()),
            size: 100,
            modified: now,
            cached_at: now,
        };

        assert!(state.matches(100, now));
        assert!(!state.matches(101, now));
        assert!(!state.matches(100, now + std::time::Duration::from_secs(1)));
    }
}
