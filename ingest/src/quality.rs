//! Per-channel quality counters and inter-arrival statistics.

use std::collections::VecDeque;
use std::time::Duration;

use serde::Serialize;

use crate::endianness::EndiannessVerdict;

/// Inter-arrival intervals retained per channel.
pub const INTERVAL_HISTORY: usize = 100;

/// Monotonic counters for one channel (or a sum over channels).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QualityStats {
    pub received: u64,
    pub valid: u64,
    pub size_violations: u64,
    pub timing_violations: u64,
    pub parse_errors: u64,
    pub connection_errors: u64,
    pub rejected_peers: u64,
}

impl QualityStats {
    /// Fraction of received frames that were valid, 1.0 before any arrive.
    pub fn quality_score(&self) -> f64 {
        if self.received == 0 {
            1.0
        } else {
            self.valid as f64 / self.received as f64
        }
    }

    /// Add another set of counters into this one.
    pub fn merge(&mut self, other: &QualityStats) {
        self.received += other.received;
        self.valid += other.valid;
        self.size_violations += other.size_violations;
        self.timing_violations += other.timing_violations;
        self.parse_errors += other.parse_errors;
        self.connection_errors += other.connection_errors;
        self.rejected_peers += other.rejected_peers;
    }
}

/// Summary of recent inter-arrival intervals in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TimingSummary {
    pub count: usize,
    pub mean_ms: f64,
    pub std_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
}

/// Rolling window of inter-arrival intervals.
#[derive(Debug, Clone, Default)]
pub struct IntervalStats {
    intervals: VecDeque<Duration>,
}

impl IntervalStats {
    pub fn record(&mut self, interval: Duration) {
        if self.intervals.len() == INTERVAL_HISTORY {
            self.intervals.pop_front();
        }
        self.intervals.push_back(interval);
    }

    pub fn summary(&self) -> TimingSummary {
        if self.intervals.is_empty() {
            return TimingSummary::default();
        }
        let ms: Vec<f64> = self.intervals.iter().map(|d| d.as_secs_f64() * 1000.0).collect();
        let n = ms.len() as f64;
        let mean = ms.iter().sum::<f64>() / n;
        let variance = ms.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        TimingSummary {
            count: ms.len(),
            mean_ms: mean,
            std_ms: variance.sqrt(),
            min_ms: ms.iter().copied().fold(f64::INFINITY, f64::min),
            max_ms: ms.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

/// Snapshot of one channel's health.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelQuality {
    pub channel: usize,
    pub port: u16,
    pub connected: bool,
    pub stats: QualityStats,
    pub timing: TimingSummary,
    pub endianness: Option<EndiannessVerdict>,
}

/// Snapshot of every channel of a device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceQuality {
    pub device: String,
    pub channels: Vec<ChannelQuality>,
}

impl DeviceQuality {
    /// Counters summed over all channels.
    pub fn totals(&self) -> QualityStats {
        let mut total = QualityStats::default();
        for channel in &self.channels {
            total.merge(&channel.stats);
        }
        total
    }

    pub fn connected_channels(&self) -> usize {
        self.channels.iter().filter(|c| c.connected).count()
    }

    /// Aggregate valid/received ratio.
    pub fn quality_score(&self) -> f64 {
        self.totals().quality_score()
    }
}
