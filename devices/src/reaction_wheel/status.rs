//! Reaction wheel status scenarios.

use crate::scenario::ScenarioParams;

use super::health::{RwaMode, RwaStatus};
use super::WheelSample;

/// Nominal bus voltage the voltage-fault derating is relative to, V.
const NOMINAL_BUS_VOLTAGE: f64 = 28.0;

/// Parameters injected by the active reaction wheel scenario.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReactionWheelStatus {
    /// Commanded mode; standby forces the standby bit
    pub mode: RwaMode,
    /// Minimum status level reported
    pub level: RwaStatus,
    /// Scenario temperature, °C
    pub temperature_c: f64,
    /// Scenario bus voltage, V
    pub bus_voltage_v: f64,
    pub motor_fault: bool,
    pub temperature_fault: bool,
    pub voltage_fault: bool,
}

impl ReactionWheelStatus {
    pub const NORMAL: Self = Self {
        mode: RwaMode::Operate,
        level: RwaStatus::Normal,
        temperature_c: 25.0,
        bus_voltage_v: 28.0,
        motor_fault: false,
        temperature_fault: false,
        voltage_fault: false,
    };

    pub const WARNING: Self = Self {
        level: RwaStatus::Warning,
        temperature_c: 35.0,
        bus_voltage_v: 27.5,
        ..Self::NORMAL
    };

    pub const ERROR: Self = Self {
        level: RwaStatus::Error,
        temperature_c: 45.0,
        bus_voltage_v: 26.0,
        motor_fault: true,
        temperature_fault: true,
        ..Self::NORMAL
    };

    pub const CRITICAL: Self = Self {
        mode: RwaMode::Standby,
        level: RwaStatus::Critical,
        temperature_c: 55.0,
        bus_voltage_v: 24.0,
        motor_fault: true,
        temperature_fault: true,
        voltage_fault: true,
    };

    pub const FAULT: Self = Self {
        mode: RwaMode::Standby,
        level: RwaStatus::Fault,
        temperature_c: 60.0,
        bus_voltage_v: 22.0,
        motor_fault: true,
        temperature_fault: true,
        voltage_fault: true,
    };

    /// Degrade a measured sample the way the scenario's faults would.
    ///
    /// Standby and motor faults stop the wheel; temperature and voltage
    /// faults derate speed and current. The reported temperature becomes
    /// the scenario temperature.
    pub fn apply_effects(&self, sample: WheelSample) -> WheelSample {
        let mut speed = sample.speed_rpm;
        let mut current = sample.current_a;

        if self.mode == RwaMode::Standby || self.motor_fault {
            speed = 0.0;
            current = 0.0;
        }
        if self.temperature_fault {
            let factor = (1.0 - (self.temperature_c - 25.0) / 30.0).max(0.0);
            speed *= factor;
            current *= factor;
        }
        if self.voltage_fault {
            let factor = (self.bus_voltage_v / NOMINAL_BUS_VOLTAGE).max(0.0);
            speed *= factor;
            current *= factor;
        }

        WheelSample {
            speed_rpm: speed,
            current_a: current,
            temperature_c: self.temperature_c,
            bus_voltage_v: sample.bus_voltage_v,
        }
    }
}

impl Default for ReactionWheelStatus {
    fn default() -> Self {
        Self::NORMAL
    }
}

impl ScenarioParams for ReactionWheelStatus {
    fn preset(name: &str) -> Option<Self> {
        match name {
            "normal" => Some(Self::NORMAL),
            "warning" => Some(Self::WARNING),
            "error" => Some(Self::ERROR),
            "critical" => Some(Self::CRITICAL),
            "fault" => Some(Self::FAULT),
            _ => None,
        }
    }

    fn normal() -> Self {
        Self::NORMAL
    }
}
