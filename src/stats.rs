//! Post-run aggregation of client session counters.
//!
//! Only ever fed after every loop thread has been joined, so it reads
//! session state without any synchronization.

use std::fmt;
use std::time::Duration;

use crate::constants::MIB;
use crate::session::{Counters, Session};

#[derive(Debug, Clone, PartialEq)]
pub struct Stats {
    duration: Duration,
    pub total_error_count: u64,
    pub total_count_written: u64,
    pub total_count_read: u64,
    pub total_bytes_written: u64,
    pub total_bytes_read: u64,
}

impl Stats {
    /// `duration` is the configured run length, not the measured one.
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            total_error_count: 0,
            total_count_written: 0,
            total_count_read: 0,
            total_bytes_written: 0,
            total_bytes_read: 0,
        }
    }

    pub fn from_sessions<'a>(
        duration: Duration,
        sessions: impl IntoIterator<Item = &'a Session>,
    ) -> Self {
        let mut stats = Self::new(duration);
        for session in sessions {
            stats.add(session.error(), session.counters());
        }
        stats
    }

    pub fn add(&mut self, error: bool, counters: Counters) {
        self.total_error_count += u64::from(error);
        self.total_count_written += counters.count_written;
        self.total_count_read += counters.count_read;
        self.total_bytes_written += counters.bytes_written;
        self.total_bytes_read += counters.bytes_read;
    }

    /// MiB/s read, normalized to the configured duration.
    pub fn read_throughput(&self) -> f64 {
        self.per_second(self.total_bytes_read)
    }

    /// MiB/s written, normalized to the configured duration.
    pub fn write_throughput(&self) -> f64 {
        self.per_second(self.total_bytes_written)
    }

    fn per_second(&self, bytes: u64) -> f64 {
        bytes as f64 / (self.duration.as_secs_f64() * MIB)
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} total count error", self.total_error_count)?;
        writeln!(f, "{} total count written", self.total_count_written)?;
        writeln!(f, "{} total count read", self.total_count_read)?;
        writeln!(f, "{} total bytes written", self.total_bytes_written)?;
        writeln!(f, "{} total bytes read", self.total_bytes_read)?;
        writeln!(f, "{} MiB/s read throughput", self.read_throughput())?;
        write!(f, "{} MiB/s write throughput", self.write_throughput())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counters(blocks: u64, block: u64) -> Counters {
        Counters {
            bytes_written: blocks * block,
            bytes_read: blocks * block,
            count_written: blocks,
            count_read: blocks,
        }
    }

    #[test]
    fn sums_counters_and_counts_errored_sessions() {
        let mut stats = Stats::new(Duration::from_secs(2));
        stats.add(false, counters(10, 64));
        stats.add(true, counters(3, 64));
        stats.add(true, Counters::default());

        assert_eq!(stats.total_error_count, 2);
        assert_eq!(stats.total_count_written, 13);
        assert_eq!(stats.total_count_read, 13);
        assert_eq!(stats.total_bytes_written, 13 * 64);
        assert_eq!(stats.total_bytes_read, 13 * 64);
    }

    #[test]
    fn throughput_is_bytes_over_configured_duration() {
        let mut stats = Stats::new(Duration::from_secs(4));
        stats.total_bytes_read = 12 * 1024 * 1024;
        stats.total_bytes_written = 2 * 1024 * 1024;
        assert_eq!(stats.read_throughput(), 3.0);
        assert_eq!(stats.write_throughput(), 0.5);
    }

    #[test]
    fn empty_run_reports_zero() {
        let stats = Stats::from_sessions(Duration::from_secs(1), []);
        assert_eq!(stats.read_throughput(), 0.0);
        assert_eq!(stats.total_error_count, 0);
    }

    #[test]
    fn unconnected_sessions_contribute_nothing() {
        let sessions = vec![Session::initiator(64, false), Session::initiator(64, false)];
        let stats = Stats::from_sessions(Duration::from_secs(1), &sessions);
        assert_eq!(stats, Stats::new(Duration::from_secs(1)));
    }

    #[test]
    fn report_lists_every_quantity() {
        let mut stats = Stats::new(Duration::from_secs(1));
        stats.add(false, counters(1, 1024 * 1024));
        let report = stats.to_string();
        let lines: Vec<&str> = report.lines().collect();
        assert_eq!(lines.len(), 7);
        assert_eq!(lines[0], "0 total count error");
        assert_eq!(lines[3], "1048576 total bytes written");
        assert_eq!(lines[5], "1 MiB/s read throughput");
        assert_eq!(lines[6], "1 MiB/s write throughput");
    }
}
