//! Platform file-watcher backends behind one capability interface.
//!
//! Callers never branch on platform: `spawn_watcher` picks the kernel
//! notification backend and degrades to filesystem polling when watch
//! setup fails. Both backends deliver events for a single path in the
//! order the filesystem applied them.

use notify::event::{EventKind, ModifyKind};
use notify::{PollWatcher, RecommendedWatcher, RecursiveMode, Watcher};
use notify_debouncer_full::{
    new_debouncer, new_debouncer_opt, DebounceEventResult, Debouncer, FileIdMap,
};
use saveforge_core::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, warn};

/// Raw coalescing window applied inside the backend, below the
/// orchestrator's own debounce.
const COALESCE_WINDOW: Duration = Duration::from_millis(500);

/// Poll interval for the degraded backend.
const POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawFsEventKind {
    Created,
    Modified,
    Removed,
    Renamed,
}

/// A filesystem notification as reported by a backend. `paths` holds one
/// entry, or two (old, new) for renames.
#[derive(Debug, Clone)]
pub struct RawFsEvent {
    pub kind: RawFsEventKind,
    pub paths: Vec<PathBuf>,
}

/// Capability interface over platform watch backends.
pub trait SaveWatcher: Send {
    fn watch(&mut self, dir: &Path) -> Result<()>;
    fn unwatch(&mut self, dir: &Path) -> Result<()>;
    /// Which backend is in use, for logs and health reporting.
    fn backend_name(&self) -> &'static str;
}

/// Build a watcher delivering events into `tx`. Tries the kernel backend
/// first; a setup failure degrades to polling rather than failing
/// monitoring entirely.
pub fn spawn_watcher(tx: mpsc::Sender<RawFsEvent>) -> Result<Box<dyn SaveWatcher>> {
    match KernelWatcher::new(tx.clone()) {
        Ok(watcher) => Ok(Box::new(watcher)),
        Err(e) => {
            warn!(
                "Kernel watch backend unavailable ({}), degrading to polling",
                e
            );
            let fallback = PollingWatcher::new(tx)
                .map_err(|e| Error::WatchSetupFailed(e.to_string()))?;
            Ok(Box::new(fallback))
        }
    }
}

fn forward_events(tx: &mpsc::Sender<RawFsEvent>, result: DebounceEventResult) {
    match result {
        Ok(events) => {
            for debounced in events {
                if let Some(raw) = convert_event(&debounced.event) {
                    if let Err(e) = tx.blocking_send(raw) {
                        error!("Failed to forward watch event: {}", e);
                    }
                }
            }
        }
        Err(errors) => {
            for error in errors {
                error!("Watch error: {:?}", error);
            }
        }
    }
}

fn convert_event(event: &notify::Event) -> Option<RawFsEvent> {
    let kind = match event.kind {
        EventKind::Create(_) => RawFsEventKind::Created,
        EventKind::Modify(ModifyKind::Name(_)) => RawFsEventKind::Renamed,
        EventKind::Modify(_) => RawFsEventKind::Modified,
        EventKind::Remove(_) => RawFsEventKind::Removed,
        _ => return None,
    };
    if event.paths.is_empty() {
        return None;
    }
    Some(RawFsEvent {
        kind,
        paths: event.paths.clone(),
    })
}

/// Kernel notification backend (inotify/FSEvents/ReadDirectoryChangesW,
/// chosen by the platform).
pub struct KernelWatcher {
    debouncer: Debouncer<RecommendedWatcher, FileIdMap>,
}

impl KernelWatcher {
    pub fn new(tx: mpsc::Sender<RawFsEvent>) -> Result<Self> {
        let debouncer = new_debouncer(COALESCE_WINDOW, None, move |result| {
            forward_events(&tx, result)
        })
        .map_err(|e| Error::WatchSetupFailed(e.to_string()))?;
        Ok(Self { debouncer })
    }
}

impl SaveWatcher for KernelWatcher {
    fn watch(&mut self, dir: &Path) -> Result<()> {
        self.debouncer
            .watcher()
            .watch(dir, RecursiveMode::Recursive)
            .map_err(|e| Error::WatchSetupFailed(e.to_string()))
    }

    fn unwatch(&mut self, dir: &Path) -> Result<()> {
        self.debouncer
            .watcher()
            .unwatch(dir)
            .map_err(|e| Error::WatchSetupFailed(e.to_string()))
    }

    fn backend_name(&self) -> &'static str {
        "kernel"
    }
}

/// Polling fallback used when kernel watch setup fails.
pub struct PollingWatcher {
    debouncer: Debouncer<PollWatcher, FileIdMap>,
}

impl PollingWatcher {
    pub fn new(tx: mpsc::Sender<RawFsEvent>) -> Result<Self> {
        let config = notify::Config::default().with_poll_interval(POLL_INTERVAL);
        let debouncer = new_debouncer_opt(
            COALESCE_WINDOW,
            None,
            move |result| forward_events(&tx, result),
            FileIdMap::new(),
            config,
        )
        .map_err(|e| Error::WatchSetupFailed(e.to_string()))?;
        Ok(Self { debouncer })
    }
}

impl SaveWatcher for PollingWatcher {
    fn watch(&mut self, dir: &Path) -> Result<()> {
        self.debouncer
            .watcher()
            .watch(dir, RecursiveMode::Recursive)
            .map_err(|e| Error::WatchSetupFailed(e.to_string()))
    }

    fn unwatch(&mut self, dir: &Path) -> Result<()> {
        self.debouncer
            .watcher()
            .unwatch(dir)
            .map_err(|e| Error::WatchSetupFailed(e.to_string()))
    }

    fn backend_name(&self) -> &'static str {
        "polling"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, RemoveKind, RenameMode};

    #[test]
    fn test_event_conversion() {
        let event = notify::Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/saves/slot1.sav"));
        let raw = convert_event(&event).unwrap();
        assert_eq!(raw.kind, RawFsEventKind::Created);
        assert_eq!(raw.paths.len(), 1);

        let event = notify::Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(PathBuf::from("/saves/a.sav"))
            .add_path(PathBuf::from("/saves/b.sav"));
        assert_eq!(convert_event(&event).unwrap().kind, RawFsEventKind::Renamed);

        let event = notify::Event::new(EventKind::Remove(RemoveKind::File));
        assert!(convert_event(&event).is_none());
    }

    #[tokio::test]
    async fn test_kernel_watcher_creation() {
        let (tx, _rx) = mpsc::channel(16);
        let watcher = KernelWatcher::new(tx);
        assert!(watcher.is_ok());
    }

    #[tokio::test]
    async fn test_polling_watcher_creation() {
        let (tx, _rx) = mpsc::channel(16);
        let watcher = PollingWatcher::new(tx);
        assert!(watcher.is_ok());
        assert_eq!(watcher.unwrap().backend_name(), "polling");
    }
}
