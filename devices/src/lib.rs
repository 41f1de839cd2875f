//! Wire-format encoders for FlatSat hardware-in-the-loop testing.
//!
//! Each device module turns a vector of physical values (plus a status
//! snapshot from the scenario source) into the exact byte frame the flight
//! hardware would put on its serial, CAN or TCP link. Every device module
//! also carries a decoder so test benches can check frames on the way back.
//!
//! # Features
//!
//! - `rate-sensor` - HG4934-style rate sensor serial frames
//! - `magnetometer` - Magnetometer CAN and RS485 frames
//! - `reaction-wheel` - ICD64020011 reaction wheel telemetry frames
//!
//! All three are enabled by default.

pub mod checksum;
pub mod error;
pub mod frame;
pub mod scenario;

#[cfg(feature = "magnetometer")]
pub mod magnetometer;

#[cfg(feature = "rate-sensor")]
pub mod rate_sensor;

#[cfg(feature = "reaction-wheel")]
pub mod reaction_wheel;

pub use error::{EncodeError, EncodeResult};
pub use frame::EncodedFrame;
pub use scenario::{ScenarioCycler, ScenarioParams, NORMAL_SCENARIO};

/// A device encoder turning a float vector plus status snapshot into a frame.
///
/// Encoders keep only the small amount of state the wire protocol demands
/// (rolling counters, sequence numbers, latched flags).
pub trait DeviceEncoder: Send {
    /// Scenario parameters consumed by this encoder.
    type Status: ScenarioParams;

    /// Encode one frame from the latest vector and status snapshot.
    ///
    /// # Errors
    /// Returns [`EncodeError`] only when the caller breaks the contract
    /// (wrong vector length, unsupported configuration). Out-of-range
    /// physical values are clamped instead.
    fn encode(&mut self, values: &[f64], status: &Self::Status) -> EncodeResult<EncodedFrame>;

    /// All frames due for one processing cycle.
    ///
    /// Defaults to the single frame from [`encode`](Self::encode); devices
    /// with periodic side telemetry append it here.
    fn encode_burst(&mut self, values: &[f64], status: &Self::Status) -> EncodeResult<Vec<EncodedFrame>> {
        Ok(vec![self.encode(values, status)?])
    }
}

/// Replace non-finite or absurdly large inputs with zero.
///
/// Shared by every encoder so a bad simulator value never produces a
/// malformed frame.
pub(crate) fn sanitize(value: f64, limit: f64) -> f64 {
    if value.is_finite() && value.abs() <= limit {
        value
    } else {
        0.0
    }
}
