//! Per-beacon-id peer failure monitor (§7): tracks broadcast/dial
//! failures in a rolling window and raises an operator-facing signal
//! without ever halting beacon production itself.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Rolling-window tracker of per-peer send failures for one beacon id.
pub struct ThresholdFailureMonitor {
    beacon_id: String,
    window: Duration,
    threshold: usize,
    failures: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl ThresholdFailureMonitor {
    pub fn new(beacon_id: impl Into<String>, window: Duration, threshold: usize) -> Self {
        Self {
            beacon_id: beacon_id.into(),
            window,
            threshold,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Records one send/dial failure against `peer` and logs an
    /// operator alert if the count of currently-failing peers has
    /// crossed `threshold` or `threshold/2`.
    pub fn record_failure(&self, peer: &str) {
        let now = Instant::now();
        let mut failures = self.failures.lock().expect("threshold monitor lock poisoned");
        let entry = failures.entry(peer.to_string()).or_default();
        entry.push_back(now);
        self.prune(entry, now);

        let failing_peers = failures
            .iter()
            .filter(|(_, window)| !window.is_empty())
            .count();

        if failing_peers >= self.threshold {
            tracing::error!(
                beacon_id = %self.beacon_id,
                failing_peers,
                threshold = self.threshold,
                "peer failure threshold exceeded"
            );
        } else if failing_peers >= self.threshold / 2 {
            tracing::warn!(
                beacon_id = %self.beacon_id,
                failing_peers,
                threshold = self.threshold,
                "peer failure count approaching threshold"
            );
        }
    }

    /// Clears a peer's failure history once it succeeds again.
    pub fn record_success(&self, peer: &str) {
        self.failures
            .lock()
            .expect("threshold monitor lock poisoned")
            .remove(peer);
    }

    pub fn failing_peer_count(&self) -> usize {
        let now = Instant::now();
        let mut failures = self.failures.lock().expect("threshold monitor lock poisoned");
        for window in failures.values_mut() {
            self.prune(window, now);
        }
        failures.values().filter(|w| !w.is_empty()).count()
    }

    fn prune(&self, window: &mut VecDeque<Instant>, now: Instant) {
        while let Some(oldest) = window.front() {
            if now.duration_since(*oldest) > self.window {
                window.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failing_peer_count_reflects_recent_failures_only() {
        let monitor = ThresholdFailureMonitor::new("default", Duration::from_secs(60), 3);
        monitor.record_failure("peer-a");
        monitor.record_failure("peer-b");
        assert_eq!(monitor.failing_peer_count(), 2);
    }

    #[test]
    fn success_clears_a_peers_failure_history() {
        let monitor = ThresholdFailureMonitor::new("default", Duration::from_secs(60), 3);
        monitor.record_failure("peer-a");
        monitor.record_success("peer-a");
        assert_eq!(monitor.failing_peer_count(), 0);
    }
}
