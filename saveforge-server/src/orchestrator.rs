//! Turns raw watch events into checkpoint triggers.
//!
//! Events run through the change detector, collapse in the debounce
//! table, and pass the trigger policy before a checkpoint is requested.
//! Checkpoint failures retry with bounded exponential backoff, then
//! surface on the engine event bus.

use crate::config::DaemonConfig;
use crate::debounce::{Clock, DebounceQueue, SystemClock};
use crate::monitor::SaveMonitor;
use crate::watcher::{RawFsEvent, RawFsEventKind};
use saveforge_core::checkpoint::CheckpointService;
use saveforge_core::detector::ChangeDetector;
use saveforge_core::models::{ChangeEvent, Confidence};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

/// Engine notifications consumed by the user-facing layer.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    MonitoringStarted { game_id: i64 },
    MonitoringStopped { game_id: i64 },
    CheckpointCreated {
        game_id: i64,
        branch: String,
        commit_ref: String,
    },
    CheckpointFailed { game_id: i64, error: String },
}

pub struct EventOrchestrator {
    service: Arc<CheckpointService>,
    detector: Arc<ChangeDetector>,
    monitor: Arc<SaveMonitor>,
    config: DaemonConfig,
    clock: Arc<dyn Clock>,
    queue: Mutex<DebounceQueue>,
    last_trigger: Mutex<HashMap<i64, Instant>>,
    events: broadcast::Sender<EngineEvent>,
}

impl EventOrchestrator {
    pub fn new(
        service: Arc<CheckpointService>,
        detector: Arc<ChangeDetector>,
        monitor: Arc<SaveMonitor>,
        config: DaemonConfig,
    ) -> Arc<Self> {
        Self::with_clock(service, detector, monitor, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        service: Arc<CheckpointService>,
        detector: Arc<ChangeDetector>,
        monitor: Arc<SaveMonitor>,
        config: DaemonConfig,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(128);
        let queue = Mutex::new(DebounceQueue::new(config.debounce_window(), clock.clone()));
        Arc::new(Self {
            service,
            detector,
            monitor,
            config,
            clock,
            queue,
            last_trigger: Mutex::new(HashMap::new()),
            events,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn emit(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }

    /// Fence a game out after it leaves monitoring: queued changes and
    /// rate-limit state are dropped, and later flushes skip it.
    pub fn forget_game(&self, game_id: i64) {
        self.queue.lock().unwrap().forget_game(game_id);
        self.last_trigger.lock().unwrap().remove(&game_id);
    }

    /// Main event loop. Detection and checkpointing run on blocking
    /// workers; the loop itself never blocks on I/O.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<RawFsEvent>) {
        let mut tick = tokio::time::interval(std::time::Duration::from_secs(1));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                maybe = rx.recv() => match maybe {
                    Some(raw) => self.handle_raw(raw).await,
                    None => break,
                },
                _ = tick.tick() => Arc::clone(&self).flush(),
            }
        }
        info!("Orchestrator event loop stopped");
    }

    async fn handle_raw(&self, raw: RawFsEvent) {
        if raw.kind == RawFsEventKind::Renamed && raw.paths.len() == 2 {
            let old = raw.paths[0].clone();
            let new = raw.paths[1].clone();
            if self.config.is_excluded(&new) {
                return;
            }
            let Some(game_id) = self.monitor.game_for_path(&new) else {
                return;
            };
            if let Some(event) = self.detector.detect_renamed(&old, &new) {
                self.queue.lock().unwrap().record(game_id, event);
            }
            return;
        }

        for path in raw.paths {
            if self.config.is_excluded(&path) {
                continue;
            }
            let Some(game_id) = self.monitor.game_for_path(&path) else {
                continue;
            };

            let detector = self.detector.clone();
            let probe = path.clone();
            let detected =
                tokio::task::spawn_blocking(move || detector.detect(&probe)).await;

            match detected {
                Ok(Ok(Some(event))) => {
                    debug!(
                        "Significant change ({}, {:?}) for game {}",
                        event.kind(),
                        event.confidence(),
                        game_id
                    );
                    self.queue.lock().unwrap().record(game_id, event);
                }
                Ok(Ok(None)) => {}
                Ok(Err(e)) => warn!("Change detection failed for {:?}: {}", path, e),
                Err(e) => error!("Detection task panicked: {}", e),
            }
        }
    }

    fn flush(self: Arc<Self>) {
        let batches = self.queue.lock().unwrap().drain_ready();
        let now = self.clock.now();

        for (game_id, events) in batches {
            if !self.monitor.is_monitored(game_id) {
                debug!("Dropping batch for unmonitored game {}", game_id);
                continue;
            }

            let last = self.last_trigger.lock().unwrap().get(&game_id).copied();
            let Some(accepted) = batch_accepted(&self.config, &events, last, now) else {
                continue;
            };

            self.last_trigger.lock().unwrap().insert(game_id, now);

            let message = checkpoint_message(&accepted);
            let orchestrator = Arc::clone(&self);
            tokio::spawn(async move {
                orchestrator.trigger_checkpoint(game_id, message).await;
            });
        }
    }

    async fn trigger_checkpoint(self: Arc<Self>, game_id: i64, message: String) {
        let mut delay = self.config.retry_base();

        for attempt in 1..=self.config.checkpoint_retries {
            let service = self.service.clone();
            let msg = message.clone();
            let result =
                tokio::task::spawn_blocking(move || service.checkpoint_active(game_id, &msg))
                    .await;

            match result {
                Ok(Ok(record)) => {
                    info!(
                        "Auto checkpoint {} on '{}' for game {}",
                        record.commit_ref, record.branch_name, game_id
                    );
                    self.emit(EngineEvent::CheckpointCreated {
                        game_id,
                        branch: record.branch_name,
                        commit_ref: record.commit_ref,
                    });
                    return;
                }
                Ok(Err(e)) if e.is_transient() && attempt < self.config.checkpoint_retries => {
                    warn!(
                        "Checkpoint attempt {}/{} for game {} failed: {}; retrying in {:?}",
                        attempt, self.config.checkpoint_retries, game_id, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Ok(Err(e)) => {
                    error!("Checkpoint for game {} failed: {}", game_id, e);
                    if is_fatal(&e) {
                        // Repository-level failures suspend the game's
                        // monitoring until it is manually re-enabled.
                        warn!("Suspending monitoring for game {} after fatal error", game_id);
                        self.monitor.stop_monitoring_game(game_id);
                        self.forget_game(game_id);
                        self.emit(EngineEvent::MonitoringStopped { game_id });
                    }
                    self.emit(EngineEvent::CheckpointFailed {
                        game_id,
                        error: e.to_string(),
                    });
                    return;
                }
                Err(e) => {
                    error!("Checkpoint task for game {} panicked: {}", game_id, e);
                    self.emit(EngineEvent::CheckpointFailed {
                        game_id,
                        error: e.to_string(),
                    });
                    return;
                }
            }
        }
    }
}

fn is_fatal(error: &saveforge_core::Error) -> bool {
    matches!(
        error,
        saveforge_core::Error::Git(_) | saveforge_core::Error::RepositoryInit(_)
    )
}

/// Apply the trigger policy to a drained batch. Returns the events that
/// survive filtering when the batch should trigger a checkpoint.
fn batch_accepted(
    config: &DaemonConfig,
    events: &[ChangeEvent],
    last_trigger: Option<Instant>,
    now: Instant,
) -> Option<Vec<ChangeEvent>> {
    let significant: Vec<ChangeEvent> = events
        .iter()
        .filter(|e| !(config.suppress_low_confidence && e.confidence() == Confidence::Low))
        .cloned()
        .collect();

    if significant.is_empty() {
        return None;
    }

    let structural = significant.iter().any(|e| {
        matches!(
            e,
            ChangeEvent::Deleted { .. } | ChangeEvent::Restructured { .. }
        )
    });
    let bytes: u64 = significant.iter().map(ChangeEvent::size).sum();
    if !structural && bytes < config.min_change_bytes {
        return None;
    }

    if let Some(last) = last_trigger {
        if now.duration_since(last) < config.min_checkpoint_interval() {
            return None;
        }
    }

    Some(significant)
}

fn checkpoint_message(events: &[ChangeEvent]) -> String {
    let files: Vec<&str> = events
        .iter()
        .filter_map(|e| e.path().file_name().and_then(|n| n.to_str()))
        .take(3)
        .collect();
    if events.len() == 1 {
        format!("Auto checkpoint: {} {}", files.join(", "), events[0].kind())
    } else {
        format!("Auto checkpoint: {} files changed ({})", events.len(), files.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use saveforge_core::models::Fingerprint;
    use std::path::PathBuf;
    use std::time::Duration;

    fn event(confidence: Confidence, size: u64) -> ChangeEvent {
        ChangeEvent::Modified {
            path: PathBuf::from("slot1.sav"),
            old_fingerprint: Fingerprint("old".into()),
            new_fingerprint: Fingerprint("new".into()),
            size,
            confidence,
        }
    }

    #[test]
    fn test_low_confidence_batch_is_suppressed() {
        let config = DaemonConfig::default();
        let now = Instant::now();
        let events = vec![event(Confidence::Low, 1024)];

        assert!(batch_accepted(&config, &events, None, now).is_none());

        let mut lenient = DaemonConfig::default();
        lenient.suppress_low_confidence = false;
        assert!(batch_accepted(&lenient, &events, None, now).is_some());
    }

    #[test]
    fn test_small_batches_below_threshold_skip() {
        let mut config = DaemonConfig::default();
        config.min_change_bytes = 4096;
        let now = Instant::now();

        let small = vec![event(Confidence::High, 100)];
        assert!(batch_accepted(&config, &small, None, now).is_none());

        let big = vec![event(Confidence::High, 8192)];
        assert!(batch_accepted(&config, &big, None, now).is_some());
    }

    #[test]
    fn test_deletions_bypass_size_threshold() {
        let mut config = DaemonConfig::default();
        config.min_change_bytes = 4096;
        let now = Instant::now();

        let events = vec![ChangeEvent::Deleted {
            path: PathBuf::from("slot1.sav"),
            old_fingerprint: Fingerprint("old".into()),
            confidence: Confidence::High,
        }];
        assert!(batch_accepted(&config, &events, None, now).is_some());
    }

    #[test]
    fn test_rate_limit_enforced_per_game() {
        let config = DaemonConfig::default();
        let now = Instant::now();
        let events = vec![event(Confidence::High, 1024)];

        let recent = now - Duration::from_secs(5);
        assert!(batch_accepted(&config, &events, Some(recent), now).is_none());

        let long_ago = now - config.min_checkpoint_interval() - Duration::from_secs(1);
        assert!(batch_accepted(&config, &events, Some(long_ago), now).is_some());
    }

    #[test]
    fn test_checkpoint_message_names_files() {
        let single = vec![event(Confidence::High, 10)];
        assert_eq!(checkpoint_message(&single), "Auto checkpoint: slot1.sav modified");

        let many = vec![
            event(Confidence::High, 10),
            ChangeEvent::Created {
                path: PathBuf::from("slot2.sav"),
                fingerprint: Fingerprint("f".into()),
                size: 20,
                confidence: Confidence::High,
            },
        ];
        let message = checkpoint_message(&many);
        assert!(message.contains("2 files changed"));
        assert!(message.contains("slot2.sav"));
    }
}
