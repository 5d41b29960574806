//! Daemon policy configuration, loadable from a TOML file.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Quiet period before a burst of changes becomes one trigger.
    pub debounce_window_secs: u64,
    /// Per-game floor between automatic checkpoints.
    pub min_checkpoint_interval_secs: u64,
    /// Batches smaller than this (in bytes) do not trigger, unless they
    /// contain deletions or renames.
    pub min_change_bytes: u64,
    /// Drop changes where only the fingerprint moved.
    pub suppress_low_confidence: bool,
    /// Substrings that mark temporary or lock files.
    pub exclusion_patterns: Vec<String>,
    /// Automatic checkpoint attempts before giving up.
    pub checkpoint_retries: u32,
    /// Base delay of the retry backoff, doubled per attempt.
    pub retry_base_ms: u64,
    /// Deadline for repository mutations.
    pub op_deadline_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            debounce_window_secs: 5,
            min_checkpoint_interval_secs: 30,
            min_change_bytes: 1,
            suppress_low_confidence: true,
            exclusion_patterns: vec![
                ".tmp".to_string(),
                ".lock".to_string(),
                ".swp".to_string(),
                ".part".to_string(),
                ".crdownload".to_string(),
                ".DS_Store".to_string(),
                "~".to_string(),
            ],
            checkpoint_retries: 3,
            retry_base_ms: 500,
            op_deadline_secs: 30,
        }
    }
}

impl DaemonConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_secs(self.debounce_window_secs)
    }

    pub fn min_checkpoint_interval(&self) -> Duration {
        Duration::from_secs(self.min_checkpoint_interval_secs)
    }

    pub fn retry_base(&self) -> Duration {
        Duration::from_millis(self.retry_base_ms)
    }

    pub fn op_deadline(&self) -> Duration {
        Duration::from_secs(self.op_deadline_secs)
    }

    /// Temporary and lock files never trigger checkpoints.
    pub fn is_excluded(&self, path: &Path) -> bool {
        let name = match path.file_name() {
            Some(name) => name.to_string_lossy(),
            None => return false,
        };
        self.exclusion_patterns
            .iter()
            .any(|pattern| name.contains(pattern.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_defaults_are_sane() {
        let config = DaemonConfig::default();
        assert_eq!(config.debounce_window(), Duration::from_secs(5));
        assert!(config.checkpoint_retries > 0);
    }

    #[test]
    fn test_exclusion_patterns() {
        let config = DaemonConfig::default();
        assert!(config.is_excluded(&PathBuf::from("/saves/slot1.sav.tmp")));
        assert!(config.is_excluded(&PathBuf::from("/saves/.slot1.sav.swp")));
        assert!(config.is_excluded(&PathBuf::from("/saves/steam.lock")));
        assert!(config.is_excluded(&PathBuf::from("/saves/backup~")));
        assert!(!config.is_excluded(&PathBuf::from("/saves/slot1.sav")));
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let parsed: DaemonConfig = toml::from_str("debounce_window_secs = 9").unwrap();
        assert_eq!(parsed.debounce_window_secs, 9);
        assert_eq!(
            parsed.min_checkpoint_interval_secs,
            DaemonConfig::default().min_checkpoint_interval_secs
        );
    }
}
