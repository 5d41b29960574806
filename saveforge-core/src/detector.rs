//! Hash-based change detection.
//!
//! Given a monitored path, decides whether its contents meaningfully
//! changed and classifies the change. Owns the hash cache; callers only
//! see `ChangeEvent`s.

use crate::cache::HashCache;
use crate::error::Result;
use crate::hash;
use crate::models::{ChangeEvent, Confidence, Fingerprint};
use std::path::Path;
use std::time::SystemTime;

pub struct ChangeDetector {
    cache: HashCache,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self {
            cache: HashCache::new(),
        }
    }

    /// Inspect a path and emit zero or one change event.
    ///
    /// Runs blocking I/O (metadata probe plus hashing on a cache miss);
    /// call from a worker thread, not the event loop.
    pub fn detect(&self, path: &Path) -> Result<Option<ChangeEvent>> {
        let metadata = match std::fs::metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(self.detect_removed(path));
            }
            Err(e) => return Err(e.into()),
        };

        if !metadata.is_file() {
            return Ok(None);
        }

        let size = metadata.len();
        let modified = metadata.modified()?;

        // Valid cache entry means nothing changed; skip hashing entirely.
        if self.cache.get_valid(path, size, modified).is_some() {
            return Ok(None);
        }

        let fingerprint = hash::fingerprint_file(path)?;
        let prior = self.cache.get(path);

        // Refresh unconditionally, whatever the classification below says.
        self.cache.insert(path, fingerprint.clone(), size, modified);

        let event = match prior {
            None => Some(ChangeEvent::Created {
                path: path.to_path_buf(),
                fingerprint,
                size,
                confidence: Confidence::High,
            }),
            Some(prior) if prior.fingerprint == fingerprint => {
                // Metadata-only touch; contents are identical.
                None
            }
            Some(prior) => {
                let confidence = classify_confidence(&prior.fingerprint, &fingerprint, prior.size, size, prior.modified, modified);
                Some(ChangeEvent::Modified {
                    path: path.to_path_buf(),
                    old_fingerprint: prior.fingerprint,
                    new_fingerprint: fingerprint,
                    size,
                    confidence,
                })
            }
        };

        Ok(event)
    }

    /// Report a rename observed by the watcher. The cache entry moves with
    /// the file so the new path does not re-report as `Created`.
    pub fn detect_renamed(&self, old_path: &Path, new_path: &Path) -> Option<ChangeEvent> {
        let prior = self.cache.remove(old_path);
        if let Some(state) = &prior {
            self.cache
                .insert(new_path, state.fingerprint.clone(), state.size, state.modified);
        }
        Some(ChangeEvent::Restructured {
            old_path: old_path.to_path_buf(),
            new_path: new_path.to_path_buf(),
            fingerprint: prior.map(|s| s.fingerprint),
            confidence: Confidence::High,
        })
    }

    fn detect_removed(&self, path: &Path) -> Option<ChangeEvent> {
        let prior = self.cache.remove(path)?;
        Some(ChangeEvent::Deleted {
            path: path.to_path_buf(),
            old_fingerprint: prior.fingerprint,
            confidence: Confidence::High,
        })
    }

    /// Seed the cache from a known state, e.g. right after a restore.
    pub fn prime(&self, path: &Path) -> Result<Fingerprint> {
        let metadata = std::fs::metadata(path)?;
        let fingerprint = hash::fingerprint_file(path)?;
        self.cache
            .insert(path, fingerprint.clone(), metadata.len(), metadata.modified()?);
        Ok(fingerprint)
    }

    #[cfg(test)]
    pub(crate) fn cache(&self) -> &HashCache {
        &self.cache
    }
}

impl Default for ChangeDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// High when fingerprint, size and mtime all disagree with the prior
/// record; Medium when the fingerprint plus one other signal disagree; Low
/// when only the fingerprint moved (possible clock manipulation).
fn classify_confidence(
    old_fp: &Fingerprint,
    new_fp: &Fingerprint,
    old_size: u64,
    new_size: u64,
    old_mtime: SystemTime,
    new_mtime: SystemTime,
) -> Confidence {
    debug_assert_ne!(old_fp, new_fp);
    let size_changed = old_size != new_size;
    let mtime_changed = old_mtime != new_mtime;
    match (size_changed, mtime_changed) {
        (true, true) => Confidence::High,
        (true, false) | (false, true) => Confidence::Medium,
        (false, false) => Confidence::Low,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn touch(dir: &TempDir, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, data).unwrap();
        path
    }

    #[test]
    fn test_first_sighting_is_created() {
        let dir = TempDir::new().unwrap();
        let detector = ChangeDetector::new();
        let path = touch(&dir, "slot1.sav", b"level 1");

        let event = detector.detect(&path).unwrap().unwrap();
        assert!(matches!(event, ChangeEvent::Created { .. }));
        assert_eq!(event.confidence(), Confidence::High);
    }

    #[test]
    fn test_unchanged_file_emits_nothing() {
        let dir = TempDir::new().unwrap();
        let detector = ChangeDetector::new();
        let path = touch(&dir, "slot1.sav", b"level 1");

        detector.detect(&path).unwrap();
        assert!(detector.detect(&path).unwrap().is_none());
        assert!(detector.detect(&path).unwrap().is_none());
    }

    #[test]
    fn test_modified_file_classifies() {
        let dir = TempDir::new().unwrap();
        let detector = ChangeDetector::new();
        let path = touch(&dir, "slot1.sav", b"level 1");
        detector.detect(&path).unwrap();

        fs::write(&path, b"level 2 with more progress").unwrap();
        let event = detector.detect(&path).unwrap().unwrap();

        match event {
            ChangeEvent::Modified {
                old_fingerprint,
                new_fingerprint,
                confidence,
                ..
            } => {
                assert_ne!(old_fingerprint, new_fingerprint);
                // Size changed and mtime almost certainly moved.
                assert!(confidence >= Confidence::Medium);
            }
            other => panic!("expected Modified, got {:?}", other),
        }
    }

    #[test]
    fn test_deleted_file_reports_once() {
        let dir = TempDir::new().unwrap();
        let detector = ChangeDetector::new();
        let path = touch(&dir, "slot1.sav", b"level 1");
        detector.detect(&path).unwrap();

        fs::remove_file(&path).unwrap();
        let event = detector.detect(&path).unwrap().unwrap();
        assert!(matches!(event, ChangeEvent::Deleted { .. }));

        // No prior record left, so no second report.
        assert!(detector.detect(&path).unwrap().is_none());
    }

    #[test]
    fn test_rename_moves_cache_entry() {
        let dir = TempDir::new().unwrap();
        let detector = ChangeDetector::new();
        let old = touch(&dir, "slot1.sav", b"level 1");
        detector.detect(&old).unwrap();

        let new = dir.path().join("slot1-renamed.sav");
        fs::rename(&old, &new).unwrap();

        let event = detector.detect_renamed(&old, &new).unwrap();
        assert!(matches!(event, ChangeEvent::Restructured { .. }));

        // The moved entry is still valid, so the new path is quiet.
        assert!(detector.detect(&new).unwrap().is_none());
    }

    #[test]
    fn test_cache_refreshes_even_without_event() {
        let dir = TempDir::new().unwrap();
        let detector = ChangeDetector::new();
        let path = touch(&dir, "slot1.sav", b"level 1");
        detector.detect(&path).unwrap();

        // Same contents rewritten: mtime moves, fingerprint does not.
        fs::write(&path, b"level 1").unwrap();
        assert!(detector.detect(&path).unwrap().is_none());

        // Entry was refreshed to the new mtime, so the next probe is a
        // pure cache hit.
        let meta = fs::metadata(&path).unwrap();
        assert!(detector
            .cache()
            .get_valid(&path, meta.len(), meta.modified().unwrap())
            .is_some());
    }

    #[test]
    fn test_confidence_tiers() {
        let now = SystemTime::now();
        let later = now + std::time::Duration::from_secs(10);
        let a = Fingerprint("a".into());
        let b = Fingerprint("b".into());

        assert_eq!(classify_confidence(&a, &b, 1, 2, now, later), Confidence::High);
        assert_eq!(classify_confidence(&a, &b, 1, 1, now, later), Confidence::Medium);
        assert_eq!(classify_confidence(&a, &b, 1, 2, now, now), Confidence::Medium);
        assert_eq!(classify_confidence(&a, &b, 1, 1, now, now), Confidence::Low);
    }
}
