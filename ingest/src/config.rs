//! Ingestion configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::Display;

use crate::endianness::DetectorConfig;
use crate::error::{IngestError, IngestResult};

/// Default nominal sample interval.
pub const DEFAULT_EXPECTED_INTERVAL: Duration = Duration::from_millis(10);

/// Default allowed deviation from the nominal interval.
pub const DEFAULT_TIMING_TOLERANCE: Duration = Duration::from_millis(15);

/// Default socket read timeout; bounds how long shutdown can take.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Default delay before a client-mode listener reconnects.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// TCP connection mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TcpMode {
    /// Listen on the channel port and accept the simulator's connection.
    #[default]
    Server,
    /// Connect out to the simulator.
    Client,
}

/// How a device's samples are byte-ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ByteOrderMode {
    /// Detect per channel from the data.
    #[default]
    Auto,
    Little,
    Big,
}

/// Expected sample cadence and the deviation counted as a violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingPolicy {
    pub expected_interval: Duration,
    pub tolerance: Duration,
}

impl Default for TimingPolicy {
    fn default() -> Self {
        Self {
            expected_interval: DEFAULT_EXPECTED_INTERVAL,
            tolerance: DEFAULT_TIMING_TOLERANCE,
        }
    }
}

impl TimingPolicy {
    /// True when `elapsed` deviates from the expected interval by more than
    /// the tolerance.
    pub fn is_violation(&self, elapsed: Duration) -> bool {
        let deviation = if elapsed > self.expected_interval {
            elapsed - self.expected_interval
        } else {
            self.expected_interval - elapsed
        };
        deviation > self.tolerance
    }
}

/// Ingestion settings for one device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceIngestConfig {
    /// Device name used for lookups and logging
    pub name: String,
    /// Number of channels (one TCP port each)
    pub channel_count: usize,
    pub mode: TcpMode,
    /// Bind address (server) or simulator host (client)
    pub host: String,
    /// Port of channel 0; channel `i` uses `base_port + i`. Zero binds
    /// every channel to an ephemeral port.
    pub base_port: u16,
    pub byte_order: ByteOrderMode,
    pub timing: TimingPolicy,
    pub read_timeout: Duration,
    pub reconnect_delay: Duration,
    pub detector: DetectorConfig,
}

impl DeviceIngestConfig {
    /// Server-mode configuration with default timing.
    pub fn new(name: impl Into<String>, channel_count: usize, base_port: u16) -> Self {
        Self {
            name: name.into(),
            channel_count,
            mode: TcpMode::Server,
            host: "0.0.0.0".to_string(),
            base_port,
            byte_order: ByteOrderMode::Auto,
            timing: TimingPolicy::default(),
            read_timeout: DEFAULT_READ_TIMEOUT,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            detector: DetectorConfig::default(),
        }
    }

    /// Port for a channel.
    pub fn port_for(&self, channel: usize) -> u16 {
        if self.base_port == 0 {
            0
        } else {
            self.base_port.saturating_add(channel as u16)
        }
    }

    /// `host:port` for a channel.
    pub fn address_for(&self, channel: usize) -> String {
        format!("{}:{}", self.host, self.port_for(channel))
    }

    /// Reject configurations that cannot work.
    pub fn validate(&self) -> IngestResult<()> {
        if self.name.is_empty() {
            return Err(IngestError::invalid(&self.name, "device name is empty"));
        }
        if self.channel_count == 0 {
            return Err(IngestError::invalid(&self.name, "channel_count must be at least 1"));
        }
        if self.base_port != 0 && usize::from(self.base_port) + self.channel_count - 1 > usize::from(u16::MAX) {
            return Err(IngestError::invalid(
                &self.name,
                format!("ports {}+{} exceed 65535", self.base_port, self.channel_count),
            ));
        }
        if self.mode == TcpMode::Client && self.base_port == 0 {
            return Err(IngestError::invalid(&self.name, "client mode needs a base_port"));
        }
        if self.read_timeout.is_zero() {
            return Err(IngestError::invalid(&self.name, "read_timeout must be non-zero"));
        }
        self.detector.validate().map_err(|reason| IngestError::invalid(&self.name, reason))
    }
}
