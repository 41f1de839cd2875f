//! JSON configuration.
//!
//! ```json
//! {
//!   "devices": {
//!     "ars": { "base_port": 5000, "output": { "mode": "serial", "serial_port": "/dev/ttyUSB0" } },
//!     "magnetometer": { "magnetometer": { "format": "rs485" }, "cycling_enabled": true,
//!                       "scenarios": ["normal", "warning", "memory_error"] },
//!     "reaction_wheel": { "enabled": false }
//!   }
//! }
//! ```
//!
//! Every field is optional. Device names select the encoder and must be one
//! of `ars`, `magnetometer` or `reaction_wheel`.

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use devices::magnetometer::MagnetometerConfig;
use devices::rate_sensor::{RateSensorConfig, FULL_LEN, PRIMARY_ONLY_LEN};
use devices::reaction_wheel::{self, ReactionWheelConfig};
use devices::NORMAL_SCENARIO;
use ingest::endianness::DetectorConfig;
use ingest::{ByteOrderMode, DeviceIngestConfig, TcpMode, TimingPolicy};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::error::{BridgeError, BridgeResult};

/// Device types the bridge can emulate.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString, EnumIter, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeviceKind {
    #[serde(rename = "ars")]
    #[strum(serialize = "ars")]
    RateSensor,
    Magnetometer,
    ReactionWheel,
}

impl DeviceKind {
    pub fn default_channel_count(self) -> usize {
        match self {
            DeviceKind::RateSensor => FULL_LEN,
            DeviceKind::Magnetometer => 3,
            DeviceKind::ReactionWheel => reaction_wheel::INPUT_LEN,
        }
    }

    /// Simulator port of channel 0 when none is configured.
    pub fn default_base_port(self) -> u16 {
        match self {
            DeviceKind::RateSensor => 5000,
            DeviceKind::Magnetometer => 5012,
            DeviceKind::ReactionWheel => 5016,
        }
    }

    /// Whether the encoder accepts a vector of `len` values.
    pub fn accepts_len(self, len: usize, duplicate_to_redundant: bool) -> bool {
        match self {
            DeviceKind::RateSensor => len == FULL_LEN || (len == PRIMARY_ONLY_LEN && duplicate_to_redundant),
            DeviceKind::Magnetometer => len == 3 || len == 4,
            DeviceKind::ReactionWheel => len == reaction_wheel::INPUT_LEN,
        }
    }
}

/// Where encoded frames go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OutputMode {
    /// Hex dump through the log
    #[default]
    Log,
    /// Serial / RS485 adapter
    Serial,
    /// TCP client to a test harness
    Tcp,
    /// CAN bus; frames are logged with their identifier
    Can,
}

/// Output link settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub mode: OutputMode,
    pub serial_port: String,
    pub baud_rate: u32,
    pub host: String,
    pub port: u16,
    pub timeout_ms: u64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            mode: OutputMode::Log,
            serial_port: "/dev/ttyUSB0".to_string(),
            baud_rate: 115_200,
            host: "127.0.0.1".to_string(),
            port: 6000,
            timeout_ms: 100,
        }
    }
}

impl OutputConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Settings for one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub enabled: bool,
    pub tcp_mode: TcpMode,
    pub host: String,
    /// Port of channel 0; device default when absent, ephemeral when 0
    pub base_port: Option<u16>,
    /// Device default when absent
    pub channel_count: Option<usize>,
    pub byte_order: ByteOrderMode,
    pub expected_interval_ms: f64,
    pub timing_tolerance_ms: f64,
    pub read_timeout_ms: u64,
    pub reconnect_delay_ms: u64,
    /// How often the processing loop polls the latest vector
    pub processing_interval_ms: u64,
    pub output: OutputConfig,
    pub scenarios: Vec<String>,
    pub cycle_interval_s: f64,
    pub cycling_enabled: bool,
    pub detector: DetectorConfig,
    pub rate_sensor: RateSensorConfig,
    pub magnetometer: MagnetometerConfig,
    pub reaction_wheel: ReactionWheelConfig,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tcp_mode: TcpMode::Server,
            host: "0.0.0.0".to_string(),
            base_port: None,
            channel_count: None,
            byte_order: ByteOrderMode::Auto,
            expected_interval_ms: 10.0,
            timing_tolerance_ms: 15.0,
            read_timeout_ms: 1000,
            reconnect_delay_ms: 1000,
            processing_interval_ms: 100,
            output: OutputConfig::default(),
            scenarios: vec![NORMAL_SCENARIO.to_string()],
            cycle_interval_s: 30.0,
            cycling_enabled: false,
            detector: DetectorConfig::default(),
            rate_sensor: RateSensorConfig::default(),
            magnetometer: MagnetometerConfig::default(),
            reaction_wheel: ReactionWheelConfig::default(),
        }
    }
}

fn millis(ms: f64) -> Duration {
    Duration::try_from_secs_f64(ms / 1000.0).unwrap_or_default()
}

impl DeviceConfig {
    pub fn channel_count_for(&self, kind: DeviceKind) -> usize {
        self.channel_count.unwrap_or_else(|| kind.default_channel_count())
    }

    pub fn base_port_for(&self, kind: DeviceKind) -> u16 {
        self.base_port.unwrap_or_else(|| kind.default_base_port())
    }

    pub fn processing_interval(&self) -> Duration {
        Duration::from_millis(self.processing_interval_ms)
    }

    pub fn cycle_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.cycle_interval_s).unwrap_or_default()
    }

    /// Ingestion settings for this device.
    pub fn ingest_config(&self, name: &str, kind: DeviceKind) -> DeviceIngestConfig {
        let mut config = DeviceIngestConfig::new(name, self.channel_count_for(kind), self.base_port_for(kind));
        config.mode = self.tcp_mode;
        config.host = self.host.clone();
        config.byte_order = self.byte_order;
        config.timing = TimingPolicy {
            expected_interval: millis(self.expected_interval_ms),
            tolerance: millis(self.timing_tolerance_ms),
        };
        config.read_timeout = Duration::from_millis(self.read_timeout_ms);
        config.reconnect_delay = Duration::from_millis(self.reconnect_delay_ms);
        config.detector = self.detector.clone();
        config
    }

    /// Reject settings the bridge cannot run with.
    pub fn validate(&self, name: &str, kind: DeviceKind) -> BridgeResult<()> {
        let channels = self.channel_count_for(kind);
        if !kind.accepts_len(channels, self.rate_sensor.duplicate_to_redundant) {
            let hint = if kind == DeviceKind::RateSensor && channels == PRIMARY_ONLY_LEN {
                " (6 channels need rate_sensor.duplicate_to_redundant)"
            } else {
                ""
            };
            return Err(BridgeError::invalid(
                name,
                format!("{channels} channels do not match the {kind} input vector{hint}"),
            ));
        }
        let positive = |v: f64| v.is_finite() && v > 0.0;
        if !positive(self.expected_interval_ms) {
            return Err(BridgeError::invalid(name, "expected_interval_ms must be positive"));
        }
        if !(self.timing_tolerance_ms.is_finite() && self.timing_tolerance_ms >= 0.0) {
            return Err(BridgeError::invalid(name, "timing_tolerance_ms must not be negative"));
        }
        if self.read_timeout_ms == 0 || self.processing_interval_ms == 0 {
            return Err(BridgeError::invalid(
                name,
                "read_timeout_ms and processing_interval_ms must be non-zero",
            ));
        }
        if self.cycling_enabled && !positive(self.cycle_interval_s) {
            return Err(BridgeError::invalid(name, "cycle_interval_s must be positive"));
        }
        let variation = self.rate_sensor.redundant_variation_percent;
        if !(variation.is_finite() && (0.0..100.0).contains(&variation)) {
            return Err(BridgeError::invalid(name, "redundant_variation_percent must be in [0, 100)"));
        }
        if self.output.mode == OutputMode::Serial && self.output.baud_rate == 0 {
            return Err(BridgeError::invalid(name, "baud_rate must be non-zero"));
        }
        self.ingest_config(name, kind).validate()?;
        Ok(())
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub devices: BTreeMap<String, DeviceConfig>,
}

impl BridgeConfig {
    /// Read and validate a JSON configuration file.
    pub fn load(path: &Path) -> BridgeResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| BridgeError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Parse and validate a JSON configuration string.
    pub fn from_json(text: &str) -> BridgeResult<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> BridgeResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> BridgeResult<()> {
        for (name, device) in &self.devices {
            let kind = DeviceKind::from_str(name).map_err(|_| BridgeError::UnknownDevice(name.clone()))?;
            if device.enabled {
                device.validate(name, kind)?;
            }
        }
        Ok(())
    }

    /// Enabled devices with their kind, in name order.
    pub fn enabled_devices(&self) -> impl Iterator<Item = (&str, DeviceKind, &DeviceConfig)> {
        self.devices.iter().filter(|(_, d)| d.enabled).filter_map(|(name, device)| {
            DeviceKind::from_str(name)
                .ok()
                .map(|kind| (name.as_str(), kind, device))
        })
    }
}
