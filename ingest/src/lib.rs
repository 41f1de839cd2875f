//! TCP ingestion of simulator float streams.
//!
//! The simulator sends one stream of raw 8-byte IEEE-754 doubles per
//! logical channel, one TCP connection per channel, with no framing. This
//! crate reassembles those streams, works out their byte order, checks the
//! sample timing and publishes the latest value of every channel into a
//! per-device vector that encoders poll.
//!
//! - [`frame_reader`] - 8-byte frame reassembly across reads
//! - [`endianness`] - statistical byte-order detection per channel
//! - [`quality`] - per-channel counters and interval statistics
//! - [`device_state`] - latest-value vector shared under a device lock
//! - [`listener`] - one thread per channel, server or client mode
//! - [`manager`] - owns every listener and exposes the query API

pub mod config;
pub mod device_state;
pub mod endianness;
pub mod error;
pub mod frame_reader;
pub mod listener;
pub mod manager;
pub mod quality;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use config::{ByteOrderMode, DeviceIngestConfig, TcpMode, TimingPolicy};
pub use device_state::{DeviceState, LatestDeviceVector};
pub use endianness::{ByteOrder, DetectionMethod, DetectorConfig, EndiannessDetector, EndiannessVerdict};
pub use error::{IngestError, IngestResult};
pub use frame_reader::{FloatFrameReader, SAMPLE_LEN};
pub use listener::ChannelListener;
pub use manager::IngestionManager;
pub use quality::{ChannelQuality, DeviceQuality, QualityStats, TimingSummary};

/// Lock a mutex, recovering the data if a panicking thread poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
