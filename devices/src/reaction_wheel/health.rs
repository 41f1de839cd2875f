//! Reaction wheel operating limits, health word and status levels.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use strum::{Display, FromRepr};

bitflags! {
    /// Health word carried in the health/status telemetry frame.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct HealthFlags: u16 {
        const OVER_CURRENT = 1 << 0;
        const OVER_VOLTAGE = 1 << 1;
        const UNDER_VOLTAGE = 1 << 2;
        const OVER_SPEED = 1 << 7;
    }
}

bitflags! {
    /// Status byte shared by every telemetry frame.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StatusByte: u8 {
        const STANDBY = 1 << 0;
        const FAULT = 1 << 7;
    }
}

/// Wheel operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RwaMode {
    Standby,
    #[default]
    Operate,
}

/// Status level, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Display, FromRepr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum RwaStatus {
    #[default]
    Normal = 0,
    Warning = 1,
    Error = 2,
    Critical = 3,
    Fault = 4,
}

/// Operating limits from the wheel ICD.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RwaLimits {
    /// Below this |speed| the wheel reports standby, RPM
    pub standby_speed_rpm: f64,
    pub warning_speed_rpm: f64,
    pub max_speed_rpm: f64,
    pub warning_current_a: f64,
    pub max_current_a: f64,
    pub warning_voltage_low_v: f64,
    pub warning_voltage_high_v: f64,
    pub min_voltage_v: f64,
    pub max_voltage_v: f64,
}

impl Default for RwaLimits {
    fn default() -> Self {
        Self {
            standby_speed_rpm: 10.0,
            warning_speed_rpm: 4000.0,
            max_speed_rpm: 4200.0,
            warning_current_a: 8.0,
            max_current_a: 9.76,
            warning_voltage_low_v: 20.0,
            warning_voltage_high_v: 40.0,
            min_voltage_v: 19.0,
            max_voltage_v: 42.0,
        }
    }
}

impl RwaLimits {
    /// Mode implied by wheel speed alone.
    pub fn mode(&self, speed_rpm: f64) -> RwaMode {
        if speed_rpm.abs() < self.standby_speed_rpm {
            RwaMode::Standby
        } else {
            RwaMode::Operate
        }
    }

    /// Status level implied by the measurement.
    ///
    /// Speed and current limits are signed upper bounds, as in the ICD:
    /// negative speed or current never trips them.
    pub fn status(&self, speed_rpm: f64, current_a: f64, voltage_v: f64) -> RwaStatus {
        if speed_rpm > self.max_speed_rpm
            || current_a > self.max_current_a
            || voltage_v > self.max_voltage_v
            || voltage_v < self.min_voltage_v
        {
            RwaStatus::Critical
        } else if speed_rpm > self.warning_speed_rpm
            || current_a > self.warning_current_a
            || voltage_v > self.warning_voltage_high_v
            || voltage_v < self.warning_voltage_low_v
        {
            RwaStatus::Warning
        } else {
            RwaStatus::Normal
        }
    }

    /// Health word bits for the measurement.
    pub fn health(&self, speed_rpm: f64, current_a: f64, voltage_v: f64) -> HealthFlags {
        let mut flags = HealthFlags::empty();
        flags.set(HealthFlags::OVER_CURRENT, current_a > self.max_current_a);
        flags.set(HealthFlags::OVER_VOLTAGE, voltage_v > self.max_voltage_v);
        flags.set(HealthFlags::UNDER_VOLTAGE, voltage_v < self.min_voltage_v);
        flags.set(HealthFlags::OVER_SPEED, speed_rpm > self.max_speed_rpm);
        flags
    }
}

/// Status byte for a mode and status level.
pub fn status_byte(mode: RwaMode, status: RwaStatus) -> StatusByte {
    let mut byte = StatusByte::empty();
    byte.set(StatusByte::STANDBY, mode == RwaMode::Standby);
    byte.set(StatusByte::FAULT, status == RwaStatus::Fault);
    byte
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_thresholds() {
        let limits = RwaLimits::default();
        assert_eq!(limits.status(1000.0, 0.5, 28.0), RwaStatus::Normal);
        assert_eq!(limits.status(4100.0, 0.5, 28.0), RwaStatus::Warning);
        assert_eq!(limits.status(4300.0, 0.5, 28.0), RwaStatus::Critical);
        assert_eq!(limits.status(1000.0, 8.5, 28.0), RwaStatus::Warning);
        assert_eq!(limits.status(1000.0, 10.0, 28.0), RwaStatus::Critical);
        assert_eq!(limits.status(1000.0, 0.5, 19.5), RwaStatus::Warning);
        assert_eq!(limits.status(1000.0, 0.5, 41.0), RwaStatus::Warning);
        assert_eq!(limits.status(1000.0, 0.5, 18.0), RwaStatus::Critical);
        assert_eq!(limits.status(1000.0, 0.5, 43.0), RwaStatus::Critical);
    }

    #[test]
    fn test_health_bits() {
        let limits = RwaLimits::default();
        assert_eq!(limits.health(1000.0, 0.5, 28.0), HealthFlags::empty());
        assert_eq!(limits.health(1000.0, 9.8, 28.0).bits(), 0x0001);
        assert_eq!(limits.health(1000.0, 0.5, 43.0).bits(), 0x0002);
        assert_eq!(limits.health(1000.0, 0.5, 18.0).bits(), 0x0004);
        assert_eq!(limits.health(4500.0, 0.5, 28.0).bits(), 0x0080);
        assert_eq!(limits.health(4500.0, 10.0, 50.0).bits(), 0x0083);
    }

    #[test]
    fn test_negative_speed_and_current_are_within_limits() {
        let limits = RwaLimits::default();
        assert_eq!(limits.status(-4500.0, -9.9, 28.0), RwaStatus::Normal);
        assert_eq!(limits.health(-4500.0, -9.9, 28.0), HealthFlags::empty());
        assert_eq!(limits.mode(-4500.0), RwaMode::Operate);
    }

    #[test]
    fn test_mode() {
        let limits = RwaLimits::default();
        assert_eq!(limits.mode(5.0), RwaMode::Standby);
        assert_eq!(limits.mode(-9.9), RwaMode::Standby);
        assert_eq!(limits.mode(10.0), RwaMode::Operate);
    }

    #[test]
    fn test_status_byte() {
        assert_eq!(status_byte(RwaMode::Operate, RwaStatus::Normal).bits(), 0x00);
        assert_eq!(status_byte(RwaMode::Standby, RwaStatus::Critical).bits(), 0x01);
        assert_eq!(status_byte(RwaMode::Standby, RwaStatus::Fault).bits(), 0x81);
    }

    #[test]
    fn test_status_ordering() {
        assert!(RwaStatus::Fault > RwaStatus::Critical);
        assert_eq!(RwaStatus::Warning.max(RwaStatus::Error), RwaStatus::Error);
        assert_eq!(RwaStatus::from_repr(3), Some(RwaStatus::Critical));
    }
}
