// src/stats.rs
//! Counters for a scan run

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct Counters {
    processed: AtomicU64,
    recorded: AtomicU64,
    matched: AtomicU64,
    archived: AtomicU64,
}

/// Run totals shared by the classifier and the scanner; clones share state
#[derive(Debug, Clone)]
pub struct StatsCollector {
    counters: Arc<Counters>,
    started: Instant,
}

/// Totals at a point in time
#[derive(Debug, Clone, PartialEq)]
pub struct StatsSnapshot {
    pub entries_processed: u64,
    pub certificates_recorded: u64,
    pub matches_found: u64,
    pub certificates_archived: u64,
    pub elapsed: Duration,
}

impl StatsSnapshot {
    /// Entries per second over the whole run
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.entries_processed as f64 / secs
        } else {
            0.0
        }
    }
}

impl StatsCollector {
    pub fn new() -> Self {
        Self {
            counters: Arc::new(Counters::default()),
            started: Instant::now(),
        }
    }

    /// An entry went through classification, whatever the outcome
    pub fn increment_processed(&self) {
        self.counters.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_recorded(&self) {
        self.counters.recorded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_matches(&self) {
        self.counters.matched.fetch_add(1, Ordering::Relaxed);
    }

    /// An unparsable certificate was written out as an artifact
    pub fn increment_archived(&self) {
        self.counters.archived.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            entries_processed: self.counters.processed.load(Ordering::Relaxed),
            certificates_recorded: self.counters.recorded.load(Ordering::Relaxed),
            matches_found: self.counters.matched.load(Ordering::Relaxed),
            certificates_archived: self.counters.archived.load(Ordering::Relaxed),
            elapsed: self.started.elapsed(),
        }
    }

    /// One-line summary for the end of a run
    pub fn format_stats(&self) -> String {
        let snapshot = self.snapshot();
        format!(
            "{} entries, {} recorded, {} matched, {} archived in {} ({:.1} entries/s)",
            snapshot.entries_processed,
            snapshot.certificates_recorded,
            snapshot.matches_found,
            snapshot.certificates_archived,
            format_elapsed(snapshot.elapsed),
            snapshot.rate()
        )
    }
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// `3661s` -> `1h01m01s`
fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    match (secs / 3600, (secs % 3600) / 60, secs % 60) {
        (0, 0, s) => format!("{}s", s),
        (0, m, s) => format!("{}m{:02}s", m, s),
        (h, m, s) => format!("{}h{:02}m{:02}s", h, m, s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_are_independent() {
        let stats = StatsCollector::new();

        for _ in 0..3 {
            stats.increment_processed();
        }
        stats.increment_recorded();
        stats.increment_recorded();
        stats.increment_matches();
        stats.increment_archived();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.entries_processed, 3);
        assert_eq!(snapshot.certificates_recorded, 2);
        assert_eq!(snapshot.matches_found, 1);
        assert_eq!(snapshot.certificates_archived, 1);
    }

    #[test]
    fn test_clone_shares_counters() {
        let stats = StatsCollector::new();
        let handle = stats.clone();

        stats.increment_matches();
        handle.increment_matches();

        assert_eq!(stats.snapshot().matches_found, 2);
    }

    #[test]
    fn test_rate() {
        let snapshot = StatsSnapshot {
            entries_processed: 300,
            certificates_recorded: 0,
            matches_found: 0,
            certificates_archived: 0,
            elapsed: Duration::from_secs(60),
        };
        assert_eq!(snapshot.rate(), 5.0);

        let idle = StatsSnapshot {
            elapsed: Duration::ZERO,
            ..snapshot
        };
        assert_eq!(idle.rate(), 0.0);
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_secs(30)), "30s");
        assert_eq!(format_elapsed(Duration::from_secs(90)), "1m30s");
        assert_eq!(format_elapsed(Duration::from_secs(3661)), "1h01m01s");
    }

    #[test]
    fn test_format_stats() {
        let stats = StatsCollector::new();
        stats.increment_processed();
        assert!(stats
            .format_stats()
            .starts_with("1 entries, 0 recorded, 0 matched, 0 archived in "));
    }
}
