//! Latest-value vector and quality records for one device.
//!
//! Every listener of a device writes through the same [`DeviceState`]; a
//! single mutex guards the vector and the per-channel counters so that a
//! reader always sees a consistent snapshot.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime};

use serde::Serialize;

use crate::config::TimingPolicy;
use crate::endianness::EndiannessVerdict;
use crate::lock;
use crate::quality::{ChannelQuality, DeviceQuality, IntervalStats, QualityStats};

/// Latest accepted value of every channel of a device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatestDeviceVector {
    pub values: Vec<f64>,
    /// Accepted samples per channel
    pub sample_counts: Vec<u64>,
    /// Time of the most recent accepted sample on any channel
    pub updated_at: Option<SystemTime>,
}

impl LatestDeviceVector {
    pub fn new(channel_count: usize) -> Self {
        Self {
            values: vec![0.0; channel_count],
            sample_counts: vec![0; channel_count],
            updated_at: None,
        }
    }

    /// True once every channel has delivered at least one sample.
    pub fn is_complete(&self) -> bool {
        self.sample_counts.iter().all(|count| *count > 0)
    }

    /// Sum of accepted samples over all channels.
    pub fn total_samples(&self) -> u64 {
        self.sample_counts.iter().sum()
    }
}

/// Result of processing one frame off the wire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameOutcome {
    /// Frame was not 8 bytes long
    SizeViolation,
    /// Decoded to NaN or infinity
    ParseError,
    /// Decoded value
    Value(f64),
}

#[derive(Debug, Default)]
struct ChannelRecord {
    port: u16,
    connected: bool,
    stats: QualityStats,
    intervals: IntervalStats,
    last_accepted: Option<Instant>,
}

#[derive(Debug)]
struct DeviceInner {
    vector: LatestDeviceVector,
    channels: Vec<ChannelRecord>,
}

/// Shared state of one device.
#[derive(Debug)]
pub struct DeviceState {
    name: String,
    inner: Mutex<DeviceInner>,
}

impl DeviceState {
    pub fn new(name: impl Into<String>, channel_count: usize) -> Self {
        Self {
            name: name.into(),
            inner: Mutex::new(DeviceInner {
                vector: LatestDeviceVector::new(channel_count),
                channels: (0..channel_count).map(|_| ChannelRecord::default()).collect(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn channel_count(&self) -> usize {
        lock(&self.inner).channels.len()
    }

    /// Account for one frame received on `channel`.
    ///
    /// Returns the elapsed time since the previous accepted sample when it
    /// violates the timing policy. The value is stored regardless.
    pub fn record_frame(
        &self,
        channel: usize,
        outcome: FrameOutcome,
        now: Instant,
        timing: &TimingPolicy,
    ) -> Option<Duration> {
        let mut inner = lock(&self.inner);
        let DeviceInner { vector, channels } = &mut *inner;
        let record = channels.get_mut(channel)?;

        record.stats.received += 1;
        let value = match outcome {
            FrameOutcome::SizeViolation => {
                record.stats.size_violations += 1;
                return None;
            }
            FrameOutcome::ParseError => {
                record.stats.parse_errors += 1;
                return None;
            }
            FrameOutcome::Value(value) => value,
        };

        let mut violation = None;
        if let Some(previous) = record.last_accepted {
            let elapsed = now.saturating_duration_since(previous);
            record.intervals.record(elapsed);
            if timing.is_violation(elapsed) {
                record.stats.timing_violations += 1;
                violation = Some(elapsed);
            }
        }
        record.last_accepted = Some(now);

        vector.values[channel] = value;
        vector.sample_counts[channel] += 1;
        vector.updated_at = Some(SystemTime::now());
        record.stats.valid += 1;
        violation
    }

    pub fn record_connection_error(&self, channel: usize) {
        if let Some(record) = lock(&self.inner).channels.get_mut(channel) {
            record.stats.connection_errors += 1;
        }
    }

    pub fn record_rejected_peer(&self, channel: usize) {
        if let Some(record) = lock(&self.inner).channels.get_mut(channel) {
            record.stats.rejected_peers += 1;
        }
    }

    /// Mark a channel (dis)connected. A new connection restarts interval
    /// tracking so the reconnect gap is not counted as a timing violation.
    pub fn set_connected(&self, channel: usize, connected: bool) {
        if let Some(record) = lock(&self.inner).channels.get_mut(channel) {
            record.connected = connected;
            if connected {
                record.last_accepted = None;
            }
        }
    }

    pub fn set_port(&self, channel: usize, port: u16) {
        if let Some(record) = lock(&self.inner).channels.get_mut(channel) {
            record.port = port;
        }
    }

    pub fn latest_vector(&self) -> LatestDeviceVector {
        lock(&self.inner).vector.clone()
    }

    pub fn channel_stats(&self, channel: usize) -> Option<QualityStats> {
        lock(&self.inner).channels.get(channel).map(|r| r.stats)
    }

    /// Quality snapshot, annotated with the given endianness verdicts.
    pub fn quality(&self, endianness: &BTreeMap<usize, EndiannessVerdict>) -> DeviceQuality {
        let inner = lock(&self.inner);
        DeviceQuality {
            device: self.name.clone(),
            channels: inner
                .channels
                .iter()
                .enumerate()
                .map(|(channel, record)| ChannelQuality {
                    channel,
                    port: record.port,
                    connected: record.connected,
                    stats: record.stats,
                    timing: record.intervals.summary(),
                    endianness: endianness.get(&channel).cloned(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_value_is_published() {
        let state = DeviceState::new("mag", 3);
        let start = Instant::now();
        let policy = TimingPolicy::default();

        assert!(state.record_frame(1, FrameOutcome::Value(42.0), start, &policy).is_none());
        let vector = state.latest_vector();
        assert_eq!(vector.values, vec![0.0, 42.0, 0.0]);
        assert_eq!(vector.sample_counts, vec![0, 1, 0]);
        assert!(vector.updated_at.is_some());
        assert!(!vector.is_complete());

        let stats = state.channel_stats(1).unwrap();
        assert_eq!(stats.received, 1);
        assert_eq!(stats.valid, 1);
    }

    #[test]
    fn test_rejected_frames_are_counted_not_stored() {
        let state = DeviceState::new("mag", 1);
        let policy = TimingPolicy::default();
        let now = Instant::now();

        state.record_frame(0, FrameOutcome::SizeViolation, now, &policy);
        state.record_frame(0, FrameOutcome::ParseError, now, &policy);

        let stats = state.channel_stats(0).unwrap();
        assert_eq!(stats.received, 2);
        assert_eq!(stats.valid, 0);
        assert_eq!(stats.size_violations, 1);
        assert_eq!(stats.parse_errors, 1);
        assert_eq!(state.latest_vector().sample_counts, vec![0]);
    }

    #[test]
    fn test_timing_violation_keeps_value() {
        let state = DeviceState::new("rw", 1);
        let policy = TimingPolicy::default();
        let start = Instant::now();

        state.record_frame(0, FrameOutcome::Value(1.0), start, &policy);
        assert!(state.record_frame(0, FrameOutcome::Value(2.0), start + ms(10), &policy).is_none());
        let late = state.record_frame(0, FrameOutcome::Value(3.0), start + ms(60), &policy);
        assert_eq!(late, Some(ms(50)));

        let stats = state.channel_stats(0).unwrap();
        assert_eq!(stats.timing_violations, 1);
        assert_eq!(stats.valid, 3);
        assert_eq!(state.latest_vector().values[0], 3.0);
    }

    #[test]
    fn test_reconnect_resets_interval() {
        let state = DeviceState::new("rw", 1);
        let policy = TimingPolicy::default();
        let start = Instant::now();

        state.set_connected(0, true);
        state.record_frame(0, FrameOutcome::Value(1.0), start, &policy);
        state.set_connected(0, false);
        state.set_connected(0, true);
        assert!(state
            .record_frame(0, FrameOutcome::Value(1.0), start + ms(5000), &policy)
            .is_none());
    }

    #[test]
    fn test_quality_snapshot() {
        let state = DeviceState::new("ars", 2);
        state.set_port(0, 50038);
        state.set_connected(0, true);
        state.record_connection_error(1);
        state.record_rejected_peer(0);
        state.record_frame(7, FrameOutcome::Value(1.0), Instant::now(), &TimingPolicy::default());

        let quality = state.quality(&BTreeMap::new());
        assert_eq!(quality.device, "ars");
        assert_eq!(quality.channels.len(), 2);
        assert_eq!(quality.channels[0].port, 50038);
        assert!(quality.channels[0].connected);
        assert_eq!(quality.channels[0].stats.rejected_peers, 1);
        assert_eq!(quality.channels[1].stats.connection_errors, 1);
        assert_eq!(quality.totals().received, 0);
    }
}
