//! Per-path burst collapsing with an injectable clock.
//!
//! A burst of events for the same (game, path) within the window collapses
//! into the single latest event. The table is driven by `Clock` so tests
//! advance time manually instead of sleeping.

use saveforge_core::models::ChangeEvent;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

struct Pending {
    event: ChangeEvent,
    last_seen: Instant,
}

pub struct DebounceQueue {
    window: Duration,
    clock: Arc<dyn Clock>,
    pending: HashMap<(i64, PathBuf), Pending>,
}

impl DebounceQueue {
    pub fn new(window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            window,
            clock,
            pending: HashMap::new(),
        }
    }

    /// Record an event, replacing any earlier event for the same path and
    /// restarting its quiet period.
    pub fn record(&mut self, game_id: i64, event: ChangeEvent) {
        let key = (game_id, event.path().clone());
        self.pending.insert(
            key,
            Pending {
                event,
                last_seen: self.clock.now(),
            },
        );
    }

    /// Remove and return the events whose quiet period has elapsed,
    /// grouped by game.
    pub fn drain_ready(&mut self) -> Vec<(i64, Vec<ChangeEvent>)> {
        let now = self.clock.now();
        let window = self.window;

        let ready: Vec<(i64, PathBuf)> = self
            .pending
            .iter()
            .filter(|(_, p)| now.duration_since(p.last_seen) >= window)
            .map(|(k, _)| k.clone())
            .collect();

        let mut by_game: HashMap<i64, Vec<ChangeEvent>> = HashMap::new();
        for key in ready {
            if let Some(pending) = self.pending.remove(&key) {
                by_game.entry(key.0).or_default().push(pending.event);
            }
        }

        let mut batches: Vec<(i64, Vec<ChangeEvent>)> = by_game.into_iter().collect();
        batches.sort_by_key(|(game_id, _)| *game_id);
        batches
    }

    /// Drop everything queued for a game, fencing it after removal from
    /// monitoring.
    pub fn forget_game(&mut self, game_id: i64) {
        self.pending.retain(|(game, _), _| *game != game_id);
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }
}
