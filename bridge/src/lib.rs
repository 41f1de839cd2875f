//! FlatSat sensor bridge.
//!
//! Ties simulator ingestion to the device encoders: per-channel TCP
//! listeners fill a latest-value vector per device, a processing loop per
//! device encodes that vector under the active status scenario, and the
//! resulting frames go out through a serial, TCP or log transmitter.
//!
//! The `flatsat_bridge` binary wraps [`Bridge`] with a JSON configuration
//! file and periodic status logging.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod transmitter;

pub use config::{BridgeConfig, DeviceConfig, DeviceKind, OutputConfig, OutputMode};
pub use error::{BridgeError, BridgeResult};
pub use pipeline::{AnyEncoder, AnyScenario, Bridge, ProcessingStats, StatusSnapshot};
pub use transmitter::{
    build_transmitter, LogTransmitter, OutputTransmitter, RecordingTransmitter, SerialTransmitter, TcpTransmitter,
};
