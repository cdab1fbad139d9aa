//! Per-port transaction statistics.
//!
//! Counts ISDU and process-data traffic and tracks ISDU round-trip times.
//! Plain counters; no allocation after construction.

use std::time::Duration;

/// Transaction counters for one port.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionStats {
    /// Completed ISDU reads.
    pub isdu_reads: u64,
    /// Completed ISDU writes.
    pub isdu_writes: u64,
    /// ISDU requests rejected by the device.
    pub isdu_errors: u64,
    /// ISDU requests that timed out.
    pub isdu_timeouts: u64,
    /// Process-data output frames written and marked valid.
    pub pd_writes: u64,
    /// Process-data input frames read.
    pub pd_reads: u64,
    /// Last ISDU round-trip time in microseconds.
    pub last_isdu_rtt_us: u64,
    /// Minimum ISDU round-trip time.
    pub min_isdu_rtt_us: u64,
    /// Maximum ISDU round-trip time.
    pub max_isdu_rtt_us: u64,
}

impl TransactionStats {
    /// Record a successful ISDU read.
    pub fn record_read(&mut self, rtt: Duration) {
        self.isdu_reads += 1;
        self.record_rtt(rtt);
    }

    /// Record a successful ISDU write.
    pub fn record_write(&mut self, rtt: Duration) {
        self.isdu_writes += 1;
        self.record_rtt(rtt);
    }

    /// Record an ISDU rejection.
    pub fn record_isdu_error(&mut self) {
        self.isdu_errors += 1;
    }

    /// Record an ISDU timeout.
    pub fn record_timeout(&mut self) {
        self.isdu_timeouts += 1;
    }

    /// Record a process-data output write.
    pub fn record_pd_write(&mut self) {
        self.pd_writes += 1;
    }

    /// Record a process-data input read.
    pub fn record_pd_read(&mut self) {
        self.pd_reads += 1;
    }

    /// Total ISDU transactions that reached the fetch phase.
    #[must_use]
    pub fn isdu_completed(&self) -> u64 {
        self.isdu_reads + self.isdu_writes + self.isdu_errors
    }

    fn record_rtt(&mut self, rtt: Duration) {
        let us = u64::try_from(rtt.as_micros()).unwrap_or(u64::MAX);
        self.last_isdu_rtt_us = us;
        if self.min_isdu_rtt_us == 0 || us < self.min_isdu_rtt_us {
            self.min_isdu_rtt_us = us;
        }
        if us > self.max_isdu_rtt_us {
            self.max_isdu_rtt_us = us;
        }
    }
}
