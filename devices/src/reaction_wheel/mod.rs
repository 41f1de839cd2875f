//! ICD64020011 reaction wheel telemetry encoder.
//!
//! Input is 4 values: wheel speed (RPM), motor current (A), temperature
//! (°C) and bus voltage (V). Power is derived as |current × voltage|.

pub mod frame;
pub mod health;
pub mod status;

use serde::{Deserialize, Serialize};

use crate::error::{EncodeError, EncodeResult};
use crate::frame::EncodedFrame;
use crate::{sanitize, DeviceEncoder};

pub use frame::{HealthFrame, Telemetry, HEALTH_FRAME_LEN, VALUE_FRAME_LEN};
pub use health::{status_byte, HealthFlags, RwaLimits, RwaMode, RwaStatus, StatusByte};
pub use status::ReactionWheelStatus;

const DEVICE: &str = "reaction wheel";

/// Input vector length.
pub const INPUT_LEN: usize = 4;

/// Physical values beyond this magnitude are encoded as zero.
const MAX_INPUT_MAGNITUDE: f64 = 1e6;

/// Reaction wheel encoder options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReactionWheelConfig {
    /// Device address byte
    pub address: u8,
    /// Telemetry frame produced each cycle
    pub telemetry: Telemetry,
    /// Degrade inputs according to the active scenario's faults
    pub apply_scenario_effects: bool,
    pub limits: RwaLimits,
}

impl Default for ReactionWheelConfig {
    fn default() -> Self {
        Self {
            address: 0x01,
            telemetry: Telemetry::Health,
            apply_scenario_effects: false,
            limits: RwaLimits::default(),
        }
    }
}

/// One reaction wheel measurement.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WheelSample {
    pub speed_rpm: f64,
    pub current_a: f64,
    pub temperature_c: f64,
    pub bus_voltage_v: f64,
}

impl WheelSample {
    /// Build a sample from a 4-value vector; unusable values become zero.
    ///
    /// # Errors
    /// [`EncodeError::VectorLength`] unless the vector has 4 values.
    pub fn from_values(values: &[f64]) -> EncodeResult<Self> {
        if values.len() != INPUT_LEN {
            return Err(EncodeError::VectorLength {
                device: DEVICE,
                expected: "4",
                actual: values.len(),
            });
        }
        let clean = |v: f64| sanitize(v, MAX_INPUT_MAGNITUDE);
        Ok(Self {
            speed_rpm: clean(values[0]),
            current_a: clean(values[1]),
            temperature_c: clean(values[2]),
            bus_voltage_v: clean(values[3]),
        })
    }

    pub fn power_w(&self) -> f64 {
        (self.current_a * self.bus_voltage_v).abs()
    }
}

/// Reaction wheel encoder.
pub struct ReactionWheelEncoder {
    config: ReactionWheelConfig,
}

/// Mode, status level and status byte for one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WheelState {
    pub mode: RwaMode,
    pub status: RwaStatus,
    pub status_byte: StatusByte,
    pub health: HealthFlags,
}

impl ReactionWheelEncoder {
    pub fn new(config: ReactionWheelConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ReactionWheelConfig {
        &self.config
    }

    /// Mode and status for a sample under a scenario.
    ///
    /// The reported level is the more severe of the measured and scenario
    /// levels; a standby scenario forces standby mode.
    pub fn state(&self, sample: &WheelSample, scenario: &ReactionWheelStatus) -> WheelState {
        let limits = &self.config.limits;
        let mode = match scenario.mode {
            RwaMode::Standby => RwaMode::Standby,
            RwaMode::Operate => limits.mode(sample.speed_rpm),
        };
        let status = limits
            .status(sample.speed_rpm, sample.current_a, sample.bus_voltage_v)
            .max(scenario.level);
        WheelState {
            mode,
            status,
            status_byte: status_byte(mode, status),
            health: limits.health(sample.speed_rpm, sample.current_a, sample.bus_voltage_v),
        }
    }

    /// Health/status frame fields for a sample.
    pub fn health_frame(&self, sample: &WheelSample, scenario: &ReactionWheelStatus) -> HealthFrame {
        let state = self.state(sample, scenario);
        HealthFrame {
            address: self.config.address,
            status: state.status_byte,
            mram_state: frame::MRAM_OK,
            health: state.health,
            temperature_c: sample.temperature_c as f32,
            bus_voltage_v: sample.bus_voltage_v as f32,
            power_w: sample.power_w() as f32,
        }
    }

    /// Encode a sample as the requested telemetry frame.
    pub fn encode_sample(&self, sample: &WheelSample, scenario: &ReactionWheelStatus, telemetry: Telemetry) -> EncodedFrame {
        let sample = if self.config.apply_scenario_effects {
            scenario.apply_effects(*sample)
        } else {
            *sample
        };
        let bytes = match telemetry {
            Telemetry::Health => self.health_frame(&sample, scenario).to_bytes(),
            Telemetry::Speed | Telemetry::Current => {
                let state = self.state(&sample, scenario);
                let value = match telemetry {
                    Telemetry::Speed => sample.speed_rpm,
                    _ => sample.current_a,
                };
                frame::value_frame(self.config.address, telemetry.opcode(), state.status_byte, value as f32)
            }
        };
        EncodedFrame::Stream(bytes)
    }
}

impl DeviceEncoder for ReactionWheelEncoder {
    type Status = ReactionWheelStatus;

    fn encode(&mut self, values: &[f64], status: &ReactionWheelStatus) -> EncodeResult<EncodedFrame> {
        let sample = WheelSample::from_values(values)?;
        Ok(self.encode_sample(&sample, status, self.config.telemetry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::xor8;
    use approx::assert_relative_eq;

    fn encoder() -> ReactionWheelEncoder {
        ReactionWheelEncoder::new(ReactionWheelConfig::default())
    }

    fn parse(frame: &EncodedFrame) -> HealthFrame {
        HealthFrame::parse(frame.bytes()).unwrap()
    }

    #[test]
    fn test_nominal_health_frame() {
        let frame = encoder()
            .encode(&[1000.0, 0.5, 25.0, 28.0], &ReactionWheelStatus::NORMAL)
            .unwrap();
        assert_eq!(frame.len(), HEALTH_FRAME_LEN);

        let bytes = frame.bytes();
        assert_eq!(bytes[0], 0x01);
        assert_eq!(bytes[1], 0x15);
        assert_eq!(bytes[HEALTH_FRAME_LEN - 1], xor8(&bytes[1..HEALTH_FRAME_LEN - 1]));

        let health = parse(&frame);
        assert_eq!(health.status, StatusByte::empty());
        assert_eq!(health.health, HealthFlags::empty());
        assert_eq!(health.mram_state, 0x01);
        assert_relative_eq!(health.temperature_c, 25.0);
        assert_relative_eq!(health.bus_voltage_v, 28.0);
        assert_relative_eq!(health.power_w, 14.0);
    }

    #[test]
    fn test_power_uses_magnitude() {
        let sample = WheelSample::from_values(&[-500.0, -2.0, 20.0, 30.0]).unwrap();
        assert_relative_eq!(sample.power_w(), 60.0);
    }

    #[test]
    fn test_standby_bit_at_low_speed() {
        let frame = encoder()
            .encode(&[5.0, 0.1, 25.0, 28.0], &ReactionWheelStatus::NORMAL)
            .unwrap();
        assert_eq!(parse(&frame).status, StatusByte::STANDBY);
    }

    #[test]
    fn test_over_limits_set_health_word() {
        let frame = encoder()
            .encode(&[4500.0, 10.0, 25.0, 18.0], &ReactionWheelStatus::NORMAL)
            .unwrap();
        let health = parse(&frame);
        assert_eq!(
            health.health,
            HealthFlags::OVER_SPEED | HealthFlags::OVER_CURRENT | HealthFlags::UNDER_VOLTAGE
        );
        // Critical is not a fault: the fault bit stays clear
        assert!(!health.status.contains(StatusByte::FAULT));
    }

    #[test]
    fn test_fault_scenario_sets_fault_and_standby() {
        let frame = encoder()
            .encode(&[1000.0, 0.5, 25.0, 28.0], &ReactionWheelStatus::FAULT)
            .unwrap();
        assert_eq!(parse(&frame).status, StatusByte::FAULT | StatusByte::STANDBY);
    }

    #[test]
    fn test_scenario_level_only_raises_status() {
        let enc = encoder();
        let sample = WheelSample::from_values(&[4300.0, 0.5, 25.0, 28.0]).unwrap();
        assert_eq!(enc.state(&sample, &ReactionWheelStatus::WARNING).status, RwaStatus::Critical);

        let sample = WheelSample::from_values(&[1000.0, 0.5, 25.0, 28.0]).unwrap();
        assert_eq!(enc.state(&sample, &ReactionWheelStatus::ERROR).status, RwaStatus::Error);
    }

    #[test]
    fn test_speed_and_current_frames() {
        let enc = encoder();
        let sample = WheelSample::from_values(&[-1234.5, 1.25, 25.0, 28.0]).unwrap();

        let speed = enc.encode_sample(&sample, &ReactionWheelStatus::NORMAL, Telemetry::Speed);
        assert_eq!(speed.len(), VALUE_FRAME_LEN);
        let (_, value) = frame::parse_value_frame(speed.bytes(), frame::OPCODE_SPEED).unwrap();
        assert_relative_eq!(value, -1234.5);

        let current = enc.encode_sample(&sample, &ReactionWheelStatus::NORMAL, Telemetry::Current);
        let (_, value) = frame::parse_value_frame(current.bytes(), frame::OPCODE_CURRENT).unwrap();
        assert_relative_eq!(value, 1.25);
    }

    #[test]
    fn test_scenario_effects_when_enabled() {
        let mut enc = ReactionWheelEncoder::new(ReactionWheelConfig {
            telemetry: Telemetry::Speed,
            apply_scenario_effects: true,
            ..Default::default()
        });
        let encoded = enc
            .encode(&[1000.0, 0.5, 25.0, 28.0], &ReactionWheelStatus::ERROR)
            .unwrap();
        let (status, value) = frame::parse_value_frame(encoded.bytes(), frame::OPCODE_SPEED).unwrap();
        assert_eq!(value, 0.0);
        assert!(status.contains(StatusByte::STANDBY));
    }

    #[test]
    fn test_custom_address() {
        let mut enc = ReactionWheelEncoder::new(ReactionWheelConfig {
            address: 0x07,
            ..Default::default()
        });
        let frame = enc.encode(&[1000.0, 0.5, 25.0, 28.0], &ReactionWheelStatus::NORMAL).unwrap();
        assert_eq!(parse(&frame).address, 0x07);
    }

    #[test]
    fn test_wrong_length_and_garbage() {
        assert!(matches!(
            encoder().encode(&[1.0, 2.0, 3.0], &ReactionWheelStatus::NORMAL),
            Err(EncodeError::VectorLength { actual: 3, .. })
        ));

        let frame = encoder()
            .encode(&[f64::NAN, f64::INFINITY, 25.0, 28.0], &ReactionWheelStatus::NORMAL)
            .unwrap();
        let health = parse(&frame);
        assert_eq!(health.power_w, 0.0);
        assert_eq!(health.status, StatusByte::STANDBY);
    }

    #[test]
    fn test_encoding_is_idempotent() {
        let sample = WheelSample::from_values(&[2000.0, 1.0, 30.0, 27.0]).unwrap();
        let enc = encoder();
        assert_eq!(
            enc.encode_sample(&sample, &ReactionWheelStatus::WARNING, Telemetry::Health),
            enc.encode_sample(&sample, &ReactionWheelStatus::WARNING, Telemetry::Health)
        );
    }
}
