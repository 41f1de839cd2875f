//! Bridge errors.

use std::path::PathBuf;

use devices::EncodeError;
use ingest::IngestError;
use thiserror::Error;

use crate::config::DeviceKind;

/// Errors raised while configuring or driving the bridge.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Failed to read config file {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("Invalid configuration for '{device}': {reason}")]
    InvalidConfig { device: String, reason: String },

    #[error("Unknown device '{0}'")]
    UnknownDevice(String),

    /// A status snapshot for one device type was handed to another's encoder.
    #[error("Status snapshot for {snapshot} passed to the {device} encoder")]
    SnapshotMismatch { device: DeviceKind, snapshot: DeviceKind },

    #[error("Failed to open output for '{device}': {reason}")]
    Output { device: String, reason: String },

    #[error("Ingestion error: {0}")]
    Ingest(#[from] IngestError),

    #[error("Encoding error: {0}")]
    Encode(#[from] EncodeError),
}

impl BridgeError {
    pub(crate) fn invalid(device: &str, reason: impl Into<String>) -> Self {
        BridgeError::InvalidConfig {
            device: device.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;
