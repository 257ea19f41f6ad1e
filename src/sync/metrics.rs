//! # Drain Metrics
//!
//! Counters over completed drains, exposed to the UI and to logs.

use chrono::{DateTime, Utc};
use std::time::Duration;

use super::coordinator::DrainReport;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncMetrics {
    pub total_drains: u64,
    pub entries_succeeded: u64,
    pub entries_failed: u64,
    pub average_drain_duration: Duration,
    pub last_drain_duration: Option<Duration>,
    pub last_drain_at: Option<DateTime<Utc>>,
    /// Last drain in which every attempted entry went through
    pub last_clean_drain_at: Option<DateTime<Utc>>,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_drain(&mut self, report: &DrainReport, duration: Duration, finished_at: DateTime<Utc>) {
        self.total_drains += 1;
        self.entries_succeeded += report.succeeded as u64;
        self.entries_failed += report.failed as u64;
        self.last_drain_duration = Some(duration);
        self.last_drain_at = Some(finished_at);
        if report.failed == 0 {
            self.last_clean_drain_at = Some(finished_at);
        }

        // Rolling average, in nanoseconds
        let drains = u128::from(self.total_drains);
        let previous = self.average_drain_duration.as_nanos() * (drains - 1);
        let average = (previous + duration.as_nanos()) / drains;
        self.average_drain_duration = Duration::from_nanos(u64::try_from(average).unwrap_or(u64::MAX));
    }

    pub fn success_rate(&self) -> f64 {
        let attempted = self.entries_succeeded + self.entries_failed;
        if attempted == 0 {
            0.0
        } else {
            self.entries_succeeded as f64 / attempted as f64
        }
    }
}
