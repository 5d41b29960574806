//! Per-game watch registration over the watcher backend.
//!
//! Tracks which directories belong to which game, answers reverse lookups
//! for incoming events, and re-arms watches when a watched root is
//! deleted and recreated (no re-registration required from callers).

use crate::watcher::SaveWatcher;
use saveforge_core::error::Result;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tracing::{info, warn};

const RESUBSCRIBE_PROBE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
enum WatchState {
    Armed,
    /// Root vanished; waiting for it to reappear.
    Lost,
}

struct WatchedRoot {
    game_id: i64,
    state: WatchState,
}

pub struct SaveMonitor {
    watcher: Mutex<Box<dyn SaveWatcher>>,
    roots: RwLock<HashMap<PathBuf, WatchedRoot>>,
}

impl SaveMonitor {
    pub fn new(watcher: Box<dyn SaveWatcher>) -> Self {
        Self {
            watcher: Mutex::new(watcher),
            roots: RwLock::new(HashMap::new()),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.watcher.lock().unwrap().backend_name()
    }

    /// Start watching a game's save directories. A save path that is a
    /// file registers its parent directory.
    pub fn start_monitoring_game(&self, game_id: i64, save_paths: &[PathBuf]) -> Result<()> {
        for path in save_paths {
            let root = watch_root(path);
            let state = match self.watcher.lock().unwrap().watch(&root) {
                Ok(()) => WatchState::Armed,
                Err(e) => {
                    // The directory may simply not exist yet; the probe
                    // task arms it once it appears.
                    warn!("Watch on {:?} not armed yet: {}", root, e);
                    WatchState::Lost
                }
            };
            self.roots
                .write()
                .unwrap()
                .insert(root.clone(), WatchedRoot { game_id, state });
            info!("Monitoring {:?} for game {}", root, game_id);
        }
        Ok(())
    }

    /// Stop watching everything registered for a game. Events already in
    /// flight are fenced out by the reverse lookup returning `None`.
    pub fn stop_monitoring_game(&self, game_id: i64) {
        let mut roots = self.roots.write().unwrap();
        let removed: Vec<PathBuf> = roots
            .iter()
            .filter(|(_, w)| w.game_id == game_id)
            .map(|(p, _)| p.clone())
            .collect();

        let mut watcher = self.watcher.lock().unwrap();
        for root in removed {
            if let Some(w) = roots.remove(&root) {
                if w.state == WatchState::Armed {
                    if let Err(e) = watcher.unwatch(&root) {
                        warn!("Failed to unwatch {:?}: {}", root, e);
                    }
                }
            }
        }
        info!("Stopped monitoring game {}", game_id);
    }

    /// Which game owns this event path, if any.
    pub fn game_for_path(&self, path: &Path) -> Option<i64> {
        let roots = self.roots.read().unwrap();
        roots
            .iter()
            .filter(|(root, _)| path.starts_with(root))
            .max_by_key(|(root, _)| root.components().count())
            .map(|(_, w)| w.game_id)
    }

    pub fn is_monitored(&self, game_id: i64) -> bool {
        self.roots
            .read()
            .unwrap()
            .values()
            .any(|w| w.game_id == game_id)
    }

    /// One pass of the watch-health probe: drop watches whose root
    /// vanished, re-arm ones whose root came back.
    pub fn probe_roots(&self) {
        let snapshot: Vec<(PathBuf, WatchState)> = {
            let roots = self.roots.read().unwrap();
            roots
                .iter()
                .map(|(p, w)| (p.clone(), w.state.clone()))
                .collect()
        };

        for (root, state) in snapshot {
            match state {
                WatchState::Armed if !root.exists() => {
                    warn!("Watched root {:?} vanished, waiting for recreation", root);
                    let _ = self.watcher.lock().unwrap().unwatch(&root);
                    self.set_state(&root, WatchState::Lost);
                }
                WatchState::Lost if root.exists() => {
                    let rearmed = self.watcher.lock().unwrap().watch(&root);
                    match rearmed {
                        Ok(()) => {
                            info!("Re-armed watch on recreated root {:?}", root);
                            self.set_state(&root, WatchState::Armed);
                        }
                        Err(e) => warn!("Re-arm of {:?} failed: {}", root, e),
                    }
                }
                _ => {}
            }
        }
    }

    fn set_state(&self, root: &Path, state: WatchState) {
        if let Some(w) = self.roots.write().unwrap().get_mut(root) {
            w.state = state;
        }
    }
}

/// Directory to register with the backend for a save path.
fn watch_root(path: &Path) -> PathBuf {
    if path.is_file() {
        path.parent().map(Path::to_path_buf).unwrap_or_else(|| path.to_path_buf())
    } else {
        path.to_path_buf()
    }
}

/// Background task keeping watches alive across root deletion and
/// recreation. Cancelled by dropping the monitor's last reference.
pub async fn run_watch_probe(monitor: Arc<SaveMonitor>) {
    let mut interval = tokio::time::interval(RESUBSCRIBE_PROBE);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        interval.tick().await;
        if Arc::strong_count(&monitor) == 1 {
            return;
        }
        monitor.probe_roots();
    }
}
