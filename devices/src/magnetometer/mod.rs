//! Magnetometer encoder for CAN and RS485 links.
//!
//! Input is 3 values (X/Y/Z field, nT) or 4 values (field plus sensor
//! temperature, °C). Without a temperature channel the active scenario's
//! temperature is reported. Field components are rounded to 1 nT counts
//! and saturate at the i16 range.

pub mod can;
pub mod rs485;
pub mod status;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{EncodeError, EncodeResult};
use crate::frame::EncodedFrame;
use crate::DeviceEncoder;

pub use can::{CAN_DATA_ID, CAN_TEMP_ID};
pub use rs485::{Rs485DataFrame, Rs485Header, DATA_FRAME_LEN, TEMP_FRAME_LEN};
pub use status::{derive_status, MagStatus, MagnetometerStatus, MessageType};

const DEVICE: &str = "magnetometer";

/// Output link for magnetometer frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MagFormat {
    #[default]
    Can,
    Rs485,
}

/// Magnetometer encoder options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MagnetometerConfig {
    pub format: MagFormat,
    /// Emit a temperature frame after every N data frames (0 disables)
    pub temperature_every: u32,
}

impl Default for MagnetometerConfig {
    fn default() -> Self {
        Self {
            format: MagFormat::Can,
            temperature_every: 0,
        }
    }
}

/// One magnetometer measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MagReading {
    /// X/Y/Z field, nT
    pub field_nt: [f64; 3],
    /// Sensor temperature, °C
    pub temperature_c: f64,
    /// Status byte to transmit
    pub status: MagStatus,
}

impl MagReading {
    /// Build a reading from an input vector and scenario.
    ///
    /// # Errors
    /// [`EncodeError::VectorLength`] unless the vector has 3 or 4 values.
    pub fn from_values(values: &[f64], scenario: &MagnetometerStatus) -> EncodeResult<Self> {
        let temperature_c = match values.len() {
            3 => scenario.temperature_c,
            4 if values[3].is_finite() => values[3],
            4 => scenario.temperature_c,
            actual => {
                return Err(EncodeError::VectorLength {
                    device: DEVICE,
                    expected: "3 or 4",
                    actual,
                })
            }
        };
        let field_nt = [values[0], values[1], values[2]].map(|v| if v.is_finite() { v } else { 0.0 });

        let mut status = scenario
            .forced_status
            .unwrap_or_else(|| derive_status(field_nt, temperature_c));
        if status::temperature_out_of_range(temperature_c) {
            status = MagStatus::Critical;
        }

        Ok(Self {
            field_nt,
            temperature_c,
            status,
        })
    }

    /// Field components as saturated 1 nT counts.
    pub fn field_counts(&self) -> [i16; 3] {
        self.field_nt.map(to_i16_counts)
    }

    /// Temperature as saturated 1 °C counts.
    pub fn temperature_counts(&self) -> i16 {
        to_i16_counts(self.temperature_c)
    }
}

fn to_i16_counts(value: f64) -> i16 {
    if !value.is_finite() {
        return 0;
    }
    value
        .round()
        .clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16
}

/// Stateful magnetometer encoder.
///
/// Holds the RS485 sequence counter, shared by data and temperature frames,
/// and the count of data frames for periodic temperature output.
pub struct MagnetometerEncoder {
    config: MagnetometerConfig,
    sequence: u16,
    data_frames: u64,
}

impl MagnetometerEncoder {
    pub fn new(config: MagnetometerConfig) -> Self {
        Self {
            config,
            sequence: 0,
            data_frames: 0,
        }
    }

    pub fn config(&self) -> &MagnetometerConfig {
        &self.config
    }

    /// Sequence number the next RS485 frame will carry.
    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    fn next_sequence(&mut self) -> u16 {
        let sequence = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);
        sequence
    }

    /// CAN data frame for a reading.
    pub fn can_data(reading: &MagReading) -> EncodedFrame {
        EncodedFrame::Can {
            id: CAN_DATA_ID,
            data: can::data_payload(reading.field_counts(), reading.status),
        }
    }

    /// CAN temperature frame for a reading.
    pub fn can_temperature(reading: &MagReading) -> EncodedFrame {
        EncodedFrame::Can {
            id: CAN_TEMP_ID,
            data: can::temperature_payload(reading.temperature_counts()),
        }
    }

    /// RS485 data frame; consumes one sequence number.
    pub fn rs485_data(&mut self, reading: &MagReading, message_type: MessageType) -> EncodedFrame {
        let header = Rs485Header {
            message_type: message_type as u8,
            command: rs485::DATA_COMMAND,
            sequence: self.next_sequence(),
        };
        let payload = rs485::data_payload(reading.field_counts(), reading.status.code());
        EncodedFrame::Stream(rs485::frame(header, &payload))
    }

    /// RS485 temperature frame; consumes one sequence number.
    pub fn rs485_temperature(&mut self, reading: &MagReading) -> EncodedFrame {
        let header = Rs485Header {
            message_type: MessageType::MagTemp as u8,
            command: rs485::TEMP_COMMAND,
            sequence: self.next_sequence(),
        };
        let payload = reading.temperature_counts().to_le_bytes();
        EncodedFrame::Stream(rs485::frame(header, &payload))
    }

    fn temperature_frame(&mut self, reading: &MagReading) -> EncodedFrame {
        match self.config.format {
            MagFormat::Can => Self::can_temperature(reading),
            MagFormat::Rs485 => self.rs485_temperature(reading),
        }
    }

    /// Temperature frame as raw bytes, for links that ignore CAN ids.
    pub fn encode_temperature(&mut self, values: &[f64], status: &MagnetometerStatus) -> EncodeResult<Bytes> {
        let reading = MagReading::from_values(values, status)?;
        Ok(self.temperature_frame(&reading).bytes().clone())
    }
}

impl DeviceEncoder for MagnetometerEncoder {
    type Status = MagnetometerStatus;

    fn encode(&mut self, values: &[f64], status: &MagnetometerStatus) -> EncodeResult<EncodedFrame> {
        let reading = MagReading::from_values(values, status)?;
        self.data_frames += 1;
        Ok(match self.config.format {
            MagFormat::Can => Self::can_data(&reading),
            MagFormat::Rs485 => self.rs485_data(&reading, status.message_type),
        })
    }

    fn encode_burst(&mut self, values: &[f64], status: &MagnetometerStatus) -> EncodeResult<Vec<EncodedFrame>> {
        let mut frames = vec![self.encode(values, status)?];
        let every = u64::from(self.config.temperature_every);
        if every > 0 && self.data_frames % every == 0 {
            let reading = MagReading::from_values(values, status)?;
            frames.push(self.temperature_frame(&reading));
        }
        Ok(frames)
    }
}
