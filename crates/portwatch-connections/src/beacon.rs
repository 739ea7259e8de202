//! Beacon Tracker
//!
//! Flags a `(pid, destination)` pair as beaconing when its connection
//! attempts arrive at suspiciously regular intervals -- the signature of a
//! C2 check-in loop rather than human- or bursty application traffic.
//!
//! Each observation timestamp is kept in a capped deque per key; on each
//! `observe` call the trailing 60 seconds of hits are extracted, their
//! inter-arrival gaps computed, and the sample standard deviation of those
//! gaps compared against a tight threshold. Low variance plus enough
//! samples is the beacon signal.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

const MAX_HISTORY: usize = 200;
const WINDOW: Duration = Duration::from_secs(60);
const MIN_HITS: usize = 4;
const STDDEV_THRESHOLD: f64 = 2.0;

#[derive(Default)]
struct History {
    hits: VecDeque<Instant>,
}

/// Per-`(pid, destination)` beaconing detector, shared across ticks.
#[derive(Default)]
pub struct BeaconTracker {
    histories: HashMap<(u32, String), History>,
}

impl BeaconTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one observation of `pid` talking to `destination` at `now`,
    /// and return whether that pair now looks like a beacon.
    pub fn observe(&mut self, pid: u32, destination: &str, now: Instant) -> bool {
        let history = self
            .histories
            .entry((pid, destination.to_string()))
            .or_default();

        history.hits.push_back(now);
        while history.hits.len() > MAX_HISTORY {
            history.hits.pop_front();
        }

        let recent: Vec<Instant> = history
            .hits
            .iter()
            .copied()
            .filter(|t| now.duration_since(*t) <= WINDOW)
            .collect();

        if recent.len() < MIN_HITS {
            return false;
        }

        is_regular(&recent)
    }

    /// Drop tracked pairs that have not observed a hit within `WINDOW`, so
    /// the map does not grow unboundedly across long uptimes.
    pub fn sweep(&mut self, now: Instant) {
        self.histories.retain(|_, history| {
            history
                .hits
                .back()
                .map(|t| now.duration_since(*t) <= WINDOW * 10)
                .unwrap_or(false)
        });
    }

    pub fn unique_destinations(&self, pid: u32) -> u32 {
        self.histories
            .keys()
            .filter(|(p, _)| *p == pid)
            .count() as u32
    }
}

fn is_regular(hits: &[Instant]) -> bool {
    let mut sorted: Vec<Instant> = hits.to_vec();
    sorted.sort();

    let gaps: Vec<f64> = sorted
        .windows(2)
        .map(|w| w[1].duration_since(w[0]).as_secs_f64())
        .collect();

    if gaps.len() < MIN_HITS - 1 {
        return false;
    }

    let mean = gaps.iter().sum::<f64>() / gaps.len() as f64;
    let variance = gaps.iter().map(|g| (g - mean).powi(2)).sum::<f64>() / gaps.len() as f64;
    variance.sqrt() < STDDEV_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn regular_interval_connections_are_flagged_as_beacon() {
        let mut tracker = BeaconTracker::new();
        let start = Instant::now();
        let mut flagged = false;
        for i in 0..6 {
            let now = start + Duration::from_secs(i * 10);
            flagged = tracker.observe(42, "1.2.3.4", now);
        }
        assert!(flagged);
    }

    #[test]
    fn irregular_intervals_are_not_flagged() {
        let mut tracker = BeaconTracker::new();
        let start = Instant::now();
        let offsets = [0u64, 3, 47, 8, 52, 1];
        let mut flagged = false;
        for off in offsets {
            let now = start + Duration::from_secs(off);
            flagged = tracker.observe(7, "5.6.7.8", now);
        }
        assert!(!flagged);
    }

    #[test]
    fn too_few_hits_are_never_flagged() {
        let mut tracker = BeaconTracker::new();
        let start = Instant::now();
        let flagged = tracker.observe(1, "9.9.9.9", start);
        assert!(!flagged);
    }

    #[test]
    fn history_deque_is_capped() {
        let mut tracker = BeaconTracker::new();
        let start = Instant::now();
        for i in 0..(MAX_HISTORY as u64 + 50) {
            tracker.observe(1, "1.1.1.1", start + Duration::from_secs(i));
        }
        let history = tracker.histories.get(&(1, "1.1.1.1".to_string())).unwrap();
        assert_eq!(history.hits.len(), MAX_HISTORY);
    }
}
