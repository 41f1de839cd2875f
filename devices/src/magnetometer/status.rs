//! Magnetometer status codes, message types and scenarios.

use strum::{Display, FromRepr};

use crate::scenario::ScenarioParams;

/// Field magnitude below this is an error, nT.
pub const FIELD_ERROR_MIN_NT: f64 = 10_000.0;
/// Field magnitude above this is an error, nT.
pub const FIELD_ERROR_MAX_NT: f64 = 100_000.0;
/// Field magnitude below this is a warning, nT.
pub const FIELD_WARNING_MIN_NT: f64 = 20_000.0;
/// Field magnitude above this is a warning, nT.
pub const FIELD_WARNING_MAX_NT: f64 = 80_000.0;
/// Operating temperature range, °C.
pub const TEMPERATURE_RANGE_C: (f64, f64) = (-40.0, 85.0);

/// Status byte carried in every data frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, FromRepr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum MagStatus {
    Normal = 0x00,
    Warning = 0x01,
    Error = 0x02,
    Critical = 0x03,
    CalibrationMode = 0x04,
    MemoryError = 0x05,
    CommunicationError = 0x06,
}

impl MagStatus {
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// RS485 message type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, FromRepr)]
#[strum(serialize_all = "UPPERCASE")]
#[repr(u8)]
pub enum MessageType {
    MagData = 0x01,
    MagTemp = 0x02,
    MagId = 0x03,
    MemRead = 0x04,
    MemWrite = 0x05,
    MemCmd = 0x06,
    OpMode = 0x07,
    Status = 0x08,
}

/// Status derived from the measurement itself.
///
/// Out-of-range temperature is critical regardless of the field.
pub fn derive_status(field_nt: [f64; 3], temperature_c: f64) -> MagStatus {
    if temperature_out_of_range(temperature_c) {
        return MagStatus::Critical;
    }
    let magnitude = field_nt.iter().map(|v| v * v).sum::<f64>().sqrt();
    if !(FIELD_ERROR_MIN_NT..=FIELD_ERROR_MAX_NT).contains(&magnitude) {
        MagStatus::Error
    } else if !(FIELD_WARNING_MIN_NT..=FIELD_WARNING_MAX_NT).contains(&magnitude) {
        MagStatus::Warning
    } else {
        MagStatus::Normal
    }
}

pub(crate) fn temperature_out_of_range(temperature_c: f64) -> bool {
    let (min, max) = TEMPERATURE_RANGE_C;
    !(min..=max).contains(&temperature_c)
}

/// Parameters injected by the active magnetometer scenario.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MagnetometerStatus {
    /// Status forced onto every frame; `None` keeps the derived status
    pub forced_status: Option<MagStatus>,
    /// Message type used in the RS485 data frame header
    pub message_type: MessageType,
    /// Reported temperature when the input vector carries none, °C
    pub temperature_c: f64,
}

impl MagnetometerStatus {
    pub const NORMAL: Self = Self {
        forced_status: None,
        message_type: MessageType::MagData,
        temperature_c: 25.0,
    };

    pub const WARNING: Self = Self {
        forced_status: Some(MagStatus::Warning),
        message_type: MessageType::MagData,
        temperature_c: 35.0,
    };

    pub const ERROR: Self = Self {
        forced_status: Some(MagStatus::Error),
        message_type: MessageType::MagData,
        temperature_c: 45.0,
    };

    pub const CALIBRATION_MODE: Self = Self {
        forced_status: Some(MagStatus::CalibrationMode),
        message_type: MessageType::OpMode,
        temperature_c: 25.0,
    };

    pub const MEMORY_ERROR: Self = Self {
        forced_status: Some(MagStatus::MemoryError),
        message_type: MessageType::Status,
        temperature_c: 25.0,
    };

    pub const COMMUNICATION_ERROR: Self = Self {
        forced_status: Some(MagStatus::CommunicationError),
        message_type: MessageType::Status,
        temperature_c: 25.0,
    };
}

impl Default for MagnetometerStatus {
    fn default() -> Self {
        Self::NORMAL
    }
}

impl ScenarioParams for MagnetometerStatus {
    fn preset(name: &str) -> Option<Self> {
        match name {
            "normal" => Some(Self::NORMAL),
            "warning" => Some(Self::WARNING),
            "error" => Some(Self::ERROR),
            "calibration_mode" => Some(Self::CALIBRATION_MODE),
            "memory_error" => Some(Self::MEMORY_ERROR),
            "communication_error" => Some(Self::COMMUNICATION_ERROR),
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
    fn test_derive_status_field_bands() {
        assert_eq!(derive_status([30_000.0, 20_000.0, 10_000.0], 25.0), MagStatus::Normal);
        assert_eq!(derive_status([15_000.0, 0.0, 0.0], 25.0), MagStatus::Warning);
        assert_eq!(derive_status([85_000.0, 0.0, 0.0], 25.0), MagStatus::Warning);
        assert_eq!(derive_status([5_000.0, 0.0, 0.0], 25.0), MagStatus::Error);
        assert_eq!(derive_status([0.0, 0.0, 150_000.0], 25.0), MagStatus::Error);
    }

    #[test]
    fn test_temperature_overrides_field() {
        assert_eq!(derive_status([5_000.0, 0.0, 0.0], 90.0), MagStatus::Critical);
        assert_eq!(derive_status([30_000.0, 0.0, 0.0], -41.0), MagStatus::Critical);
        assert_eq!(derive_status([30_000.0, 0.0, 0.0], 85.0), MagStatus::Normal);
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(MagStatus::CommunicationError.code(), 0x06);
        assert_eq!(MagStatus::from_repr(0x04), Some(MagStatus::CalibrationMode));
        assert_eq!(MagStatus::from_repr(0x07), None);
        assert_eq!(MagStatus::MemoryError.to_string(), "MEMORY_ERROR");
        assert_eq!(MessageType::OpMode.to_string(), "OPMODE");
    }

    #[test]
    fn test_presets() {
        assert_eq!(
            MagnetometerStatus::preset("calibration_mode").map(|s| s.message_type),
            Some(MessageType::OpMode)
        );
        assert_eq!(MagnetometerStatus::resolve("fault"), MagnetometerStatus::NORMAL);
    }
}
