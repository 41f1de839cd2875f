//! The three 16-bit rate sensor status words.
//!
//! Each word is described by a plain struct of named fields and packed with
//! [`pack`](StatusWord1::pack); [`unpack`](StatusWord1::unpack) reverses it
//! for frame inspection.
//!
//! | Word | Bits  | Meaning                              |
//! |------|-------|--------------------------------------|
//! | 1    | 0-1   | Rolling message counter (mod 4)      |
//! | 1    | 2-3   | BIT mode                             |
//! | 1    | 4     | Rate sensor failed                   |
//! | 1    | 5     | Gyro failed                          |
//! | 1    | 7     | AGC voltage failed                   |
//! | 2    | 0-7   | Gyro temperature, °C two's complement|
//! | 2    | 8     | Motor bias voltage failed            |
//! | 2    | 9     | Start data flag                      |
//! | 2    | 10    | Processor failed                     |
//! | 2    | 11    | Memory failed                        |
//! | 3    | 8-10  | Gyro A/B/C start (0) / run (1)       |
//! | 3    | 11-13 | Gyro A/B/C fault detection (FDC)     |
//! | 3    | 14    | FDC failed                           |
//! | 3    | 15    | Rate sensor OK                       |

use serde::{Deserialize, Serialize};

const COUNTER_MASK: u16 = 0x0003;
const BIT_MODE_SHIFT: u16 = 2;
const RATE_SENSOR_FAILED: u16 = 1 << 4;
const GYRO_FAILED: u16 = 1 << 5;
const AGC_VOLTAGE_FAILED: u16 = 1 << 7;

const TEMPERATURE_MASK: u16 = 0x00FF;
const MOTOR_BIAS_VOLTAGE_FAILED: u16 = 1 << 8;
const START_DATA_FLAG: u16 = 1 << 9;
const PROCESSOR_FAILED: u16 = 1 << 10;
const MEMORY_FAILED: u16 = 1 << 11;

const START_RUN_SHIFT: u16 = 8;
const FDC_SHIFT: u16 = 11;
const FDC_FAILED: u16 = 1 << 14;
const RS_OK: u16 = 1 << 15;

/// Built-in test mode reported in status word 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BitMode {
    /// Power-up BIT
    PowerUp = 0,
    /// Continuous BIT (normal operation)
    #[default]
    Continuous = 1,
    /// Initiated BIT
    Initiated = 2,
    /// Reserved encoding
    Reserved = 3,
}

impl BitMode {
    fn from_bits(bits: u16) -> Self {
        match bits & 0x03 {
            0 => BitMode::PowerUp,
            1 => BitMode::Continuous,
            2 => BitMode::Initiated,
            _ => BitMode::Reserved,
        }
    }
}

/// Status word 1: counter, BIT mode and top-level failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusWord1 {
    /// Rolling counter; only the low two bits are transmitted
    pub counter: u8,
    pub bit_mode: BitMode,
    pub rate_sensor_failed: bool,
    pub gyro_failed: bool,
    pub agc_voltage_failed: bool,
}

impl StatusWord1 {
    pub fn pack(&self) -> u16 {
        let mut word = u16::from(self.counter) & COUNTER_MASK;
        word |= (self.bit_mode as u16) << BIT_MODE_SHIFT;
        if self.rate_sensor_failed {
            word |= RATE_SENSOR_FAILED;
        }
        if self.gyro_failed {
            word |= GYRO_FAILED;
        }
        if self.agc_voltage_failed {
            word |= AGC_VOLTAGE_FAILED;
        }
        word
    }

    pub fn unpack(word: u16) -> Self {
        Self {
            counter: (word & COUNTER_MASK) as u8,
            bit_mode: BitMode::from_bits(word >> BIT_MODE_SHIFT),
            rate_sensor_failed: word & RATE_SENSOR_FAILED != 0,
            gyro_failed: word & GYRO_FAILED != 0,
            agc_voltage_failed: word & AGC_VOLTAGE_FAILED != 0,
        }
    }
}

/// Status word 2: gyro temperature and electronics failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusWord2 {
    /// Gyro A temperature in °C
    pub temperature_c: i8,
    pub motor_bias_voltage_failed: bool,
    pub start_data_flag: bool,
    pub processor_failed: bool,
    pub memory_failed: bool,
}

impl StatusWord2 {
    pub fn pack(&self) -> u16 {
        let mut word = u16::from(self.temperature_c as u8);
        if self.motor_bias_voltage_failed {
            word |= MOTOR_BIAS_VOLTAGE_FAILED;
        }
        if self.start_data_flag {
            word |= START_DATA_FLAG;
        }
        if self.processor_failed {
            word |= PROCESSOR_FAILED;
        }
        if self.memory_failed {
            word |= MEMORY_FAILED;
        }
        word
    }

    pub fn unpack(word: u16) -> Self {
        Self {
            temperature_c: (word & TEMPERATURE_MASK) as u8 as i8,
            motor_bias_voltage_failed: word & MOTOR_BIAS_VOLTAGE_FAILED != 0,
            start_data_flag: word & START_DATA_FLAG != 0,
            processor_failed: word & PROCESSOR_FAILED != 0,
            memory_failed: word & MEMORY_FAILED != 0,
        }
    }
}

/// Status word 3: per-gyro run state and fault detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusWord3 {
    /// Gyro A/B/C in run (true) or start (false) state
    pub start_run: [bool; 3],
    /// Gyro A/B/C fault detection tripped
    pub fdc: [bool; 3],
    pub fdc_failed: bool,
    pub rs_ok: bool,
}

impl StatusWord3 {
    pub fn pack(&self) -> u16 {
        let mut word = 0u16;
        for axis in 0..3 {
            if self.start_run[axis] {
                word |= 1 << (START_RUN_SHIFT + axis as u16);
            }
            if self.fdc[axis] {
                word |= 1 << (FDC_SHIFT + axis as u16);
            }
        }
        if self.fdc_failed {
            word |= FDC_FAILED;
        }
        if self.rs_ok {
            word |= RS_OK;
        }
        word
    }

    pub fn unpack(word: u16) -> Self {
        let bit = |shift: u16| word & (1 << shift) != 0;
        Self {
            start_run: [bit(START_RUN_SHIFT), bit(START_RUN_SHIFT + 1), bit(START_RUN_SHIFT + 2)],
            fdc: [bit(FDC_SHIFT), bit(FDC_SHIFT + 1), bit(FDC_SHIFT + 2)],
            fdc_failed: word & FDC_FAILED != 0,
            rs_ok: word & RS_OK != 0,
        }
    }
}
