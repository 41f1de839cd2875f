//! Rate sensor status scenarios.

use crate::scenario::ScenarioParams;

use super::status_words::BitMode;

/// Status flags injected by the active rate sensor scenario.
///
/// Failure flags are OR-ed with the flags the encoder derives from the
/// data itself; `start_run` and `rs_ok` are AND-ed with them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateSensorStatus {
    pub bit_mode: BitMode,
    pub rate_sensor_failed: bool,
    pub gyro_failed: bool,
    pub agc_voltage_failed: bool,
    /// Gyro A temperature in °C
    pub temperature_c: i8,
    pub motor_bias_voltage_failed: bool,
    pub start_data_flag: bool,
    pub processor_failed: bool,
    pub memory_failed: bool,
    pub start_run: [bool; 3],
    pub fdc: [bool; 3],
    pub fdc_failed: bool,
    pub rs_ok: bool,
}

impl RateSensorStatus {
    /// Nominal status: continuous BIT, 25 °C, all gyros running.
    pub const NORMAL: Self = Self {
        bit_mode: BitMode::Continuous,
        rate_sensor_failed: false,
        gyro_failed: false,
        agc_voltage_failed: false,
        temperature_c: 25,
        motor_bias_voltage_failed: false,
        start_data_flag: false,
        processor_failed: false,
        memory_failed: false,
        start_run: [true; 3],
        fdc: [false; 3],
        fdc_failed: false,
        rs_ok: true,
    };

    /// AGC voltage warning at elevated temperature.
    pub const WARNING: Self = Self {
        agc_voltage_failed: true,
        temperature_c: 35,
        ..Self::NORMAL
    };

    /// Rate sensor failure with motor bias fault.
    pub const ERROR: Self = Self {
        rate_sensor_failed: true,
        agc_voltage_failed: true,
        temperature_c: 45,
        motor_bias_voltage_failed: true,
        rs_ok: false,
        ..Self::NORMAL
    };

    /// Everything failed, gyros stopped, initiated BIT running.
    pub const FAULT: Self = Self {
        bit_mode: BitMode::Initiated,
        rate_sensor_failed: true,
        gyro_failed: true,
        agc_voltage_failed: true,
        temperature_c: 55,
        motor_bias_voltage_failed: true,
        start_data_flag: true,
        processor_failed: true,
        memory_failed: true,
        start_run: [false; 3],
        fdc: [true; 3],
        fdc_failed: true,
        rs_ok: false,
    };
}

impl Default for RateSensorStatus {
    fn default() -> Self {
        Self::NORMAL
    }
}

impl ScenarioParams for RateSensorStatus {
    fn preset(name: &str) -> Option<Self> {
        match name {
            "normal" => Some(Self::NORMAL),
            "warning" => Some(Self::WARNING),
            "error" => Some(Self::ERROR),
            "fault" => Some(Self::FAULT),
            _ => None,
        }
    }

    fn normal() -> Self {
        Self::NORMAL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        assert_eq!(RateSensorStatus::preset("normal"), Some(RateSensorStatus::NORMAL));
        assert_eq!(RateSensorStatus::preset("fault").map(|s| s.bit_mode), Some(BitMode::Initiated));
        assert!(RateSensorStatus::preset("critical").is_none());
        assert_eq!(RateSensorStatus::resolve("critical"), RateSensorStatus::NORMAL);
    }

    #[test]
    fn test_severity_escalates() {
        assert!(RateSensorStatus::WARNING.rs_ok);
        assert!(!RateSensorStatus::ERROR.rs_ok);
        assert!(RateSensorStatus::ERROR.start_run.iter().all(|&r| r));
        assert!(RateSensorStatus::FAULT.start_run.iter().all(|&r| !r));
    }
}
