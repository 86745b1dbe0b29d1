//! Pipeline counters.
//!
//! Shared between the producer, the consumer and whoever reports on
//! them. All counters are monotonic and updated with relaxed ordering.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Live counters, shared through an `Arc`.
#[derive(Debug, Default)]
pub struct PipelineStats {
    pub chunks: AtomicU64,
    pub chunk_bytes: AtomicU64,
    pub commits: AtomicU64,
    pub oversize_drops: AtomicU64,
    pub unknown_commands: AtomicU64,
    pub malformed_chunks: AtomicU64,
    pub orphan_chunks: AtomicU64,
    pub ring_full_drops: AtomicU64,
    pub overruns: AtomicU64,
    pub signals: AtomicU64,
    pub consumer_runs: AtomicU64,
    pub raw_blits: AtomicU64,
    pub rle_blits: AtomicU64,
    pub bytes_written: AtomicU64,
    pub bounds_errors: AtomicU64,
    pub malformed_rle: AtomicU64,
    pub missing_surface: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub chunks: u64,
    pub chunk_bytes: u64,
    pub commits: u64,
    pub oversize_drops: u64,
    pub unknown_commands: u64,
    pub malformed_chunks: u64,
    pub orphan_chunks: u64,
    pub ring_full_drops: u64,
    pub overruns: u64,
    pub signals: u64,
    pub consumer_runs: u64,
    pub raw_blits: u64,
    pub rle_blits: u64,
    pub bytes_written: u64,
    pub bounds_errors: u64,
    pub malformed_rle: u64,
    pub missing_surface: u64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            chunks: get(&self.chunks),
            chunk_bytes: get(&self.chunk_bytes),
            commits: get(&self.commits),
            oversize_drops: get(&self.oversize_drops),
            unknown_commands: get(&self.unknown_commands),
            malformed_chunks: get(&self.malformed_chunks),
            orphan_chunks: get(&self.orphan_chunks),
            ring_full_drops: get(&self.ring_full_drops),
            overruns: get(&self.overruns),
            signals: get(&self.signals),
            consumer_runs: get(&self.consumer_runs),
            raw_blits: get(&self.raw_blits),
            rle_blits: get(&self.rle_blits),
            bytes_written: get(&self.bytes_written),
            bounds_errors: get(&self.bounds_errors),
            malformed_rle: get(&self.malformed_rle),
            missing_surface: get(&self.missing_surface),
        }
    }
}

impl StatsSnapshot {
    /// Messages dropped on the producer side for any reason.
    pub fn dropped_messages(&self) -> u64 {
        self.oversize_drops + self.ring_full_drops + self.overruns
    }

    /// JSON rendering used by the gadget's exit report.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_counters() {
        let stats = PipelineStats::new();
        PipelineStats::bump(&stats.commits);
        PipelineStats::bump(&stats.oversize_drops);
        PipelineStats::add(&stats.bytes_written, 128);

        let snap = stats.snapshot();
        assert_eq!(snap.commits, 1);
        assert_eq!(snap.bytes_written, 128);
        assert_eq!(snap.dropped_messages(), 1);

        let json = snap.to_json().unwrap();
        assert!(json.contains("\"bytes_written\": 128"));
    }
}
