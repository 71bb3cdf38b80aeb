//! Quality rollback tracker (§8 scenario 6): watches a trailing window of
//! answer-quality measurements and, once their average drops below the
//! floor, disables predictive precomputation for a cooldown window and
//! signals the cache facade to purge low-quality entries.
//!
//! Grounded on the teacher's `patterns/effectiveness/history.rs` rolling
//! success-rate tracker, retargeted from pattern effectiveness to answer
//! quality and given a single hard disable-on-breach gate instead of a
//! continuous score.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

const WINDOW: usize = 5;
const QUALITY_FLOOR: f32 = 0.70;
const COOLDOWN_SECS: i64 = 3600;

struct State {
    recent: VecDeque<f32>,
    disabled_until: Option<DateTime<Utc>>,
}

/// Tracks the last [`WINDOW`] answer-quality scores; once their average
/// falls under [`QUALITY_FLOOR`], predictive precomputation is reported
/// disabled for one hour from the breach.
pub struct QualityRollback {
    state: RwLock<State>,
}

impl Default for QualityRollback {
    fn default() -> Self {
        Self::new()
    }
}

impl QualityRollback {
    #[must_use]
    pub fn new() -> Self {
        Self { state: RwLock::new(State { recent: VecDeque::with_capacity(WINDOW), disabled_until: None }) }
    }

    /// Record one quality measurement and re-evaluate the rollback gate.
    /// Returns `true` if this measurement just tripped the rollback.
    pub fn record(&self, quality: f32, now: DateTime<Utc>) -> bool {
        let mut state = self.state.write();
        if state.recent.len() == WINDOW {
            state.recent.pop_front();
        }
        state.recent.push_back(quality);

        if state.recent.len() < WINDOW {
            return false;
        }
        let average = state.recent.iter().sum::<f32>() / WINDOW as f32;
        if average < QUALITY_FLOOR {
            state.disabled_until = Some(now + Duration::seconds(COOLDOWN_SECS));
            true
        } else {
            false
        }
    }

    /// `true` if predictive precomputation is currently allowed to run.
    #[must_use]
    pub fn predictive_enabled(&self, now: DateTime<Utc>) -> bool {
        match self.state.read().disabled_until {
            Some(until) => now >= until,
            None => true,
        }
    }

    /// The floor below which cached entries are purged once a rollback
    /// trips (§8 scenario 6: "ML-cache entries with quality < 0.70 are
    /// purged").
    #[must_use]
    pub fn purge_floor() -> f32 {
        QUALITY_FLOOR
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stays_enabled_under_five_measurements() {
        let tracker = QualityRollback::new();
        let now = Utc::now();
        tracker.record(0.1, now);
        tracker.record(0.1, now);
        assert!(tracker.predictive_enabled(now));
    }

    #[test]
    fn five_low_measurements_trip_rollback() {
        let tracker = QualityRollback::new();
        let now = Utc::now();
        let mut tripped = false;
        for _ in 0..5 {
            tripped = tracker.record(0.5, now);
        }
        assert!(tripped);
        assert!(!tracker.predictive_enabled(now));
    }

    #[test]
    fn good_measurements_keep_rollback_from_tripping() {
        let tracker = QualityRollback::new();
        let now = Utc::now();
        for _ in 0..5 {
            tracker.record(0.95, now);
        }
        assert!(tracker.predictive_enabled(now));
    }

    #[test]
    fn rollback_clears_after_cooldown() {
        let tracker = QualityRollback::new();
        let now = Utc::now();
        for _ in 0..5 {
            tracker.record(0.1, now);
        }
        assert!(!tracker.predictive_enabled(now));
        assert!(tracker.predictive_enabled(now + Duration::seconds(COOLDOWN_SECS + 1)));
    }

    #[test]
    fn sliding_window_drops_old_measurements() {
        let tracker = QualityRollback::new();
        let now = Utc::now();
        for _ in 0..5 {
            tracker.record(0.95, now);
        }
        for _ in 0..5 {
            tracker.record(0.1, now);
        }
        assert!(!tracker.predictive_enabled(now));
    }
}
