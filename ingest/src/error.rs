//! Ingestion errors.
//!
//! Only setup failures are errors. Once a listener runs, socket failures,
//! malformed frames and timing anomalies are counted in the channel's
//! quality statistics instead.

use thiserror::Error;

/// Errors that can occur while setting up ingestion.
#[derive(Error, Debug)]
pub enum IngestError {
    /// Low-level socket error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Could not bind the listening socket for a channel.
    #[error("{device} channel {channel}: failed to bind {addr}: {source}")]
    Bind {
        device: String,
        channel: usize,
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Host/port did not resolve to a socket address.
    #[error("Cannot resolve address {0}")]
    Resolve(String),

    /// A device with this name is already registered.
    #[error("Device '{0}' is already registered")]
    DuplicateDevice(String),

    /// Device configuration is unusable.
    #[error("Invalid configuration for '{device}': {reason}")]
    InvalidConfig { device: String, reason: String },
}

impl IngestError {
    pub(crate) fn invalid(device: &str, reason: impl Into<String>) -> Self {
        IngestError::InvalidConfig {
            device: device.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type for ingestion setup.
pub type IngestResult<T> = Result<T, IngestError>;
