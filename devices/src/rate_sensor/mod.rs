//! HG4934-style rate sensor encoder.
//!
//! The simulator delivers either 6 values (primary rate X/Y/Z, primary
//! summed angle X/Y/Z) or 12 values (primary rate, redundant rate, primary
//! angle, redundant angle). The frame carries the primary channel; the
//! redundant channel is only compared against it to drive the gyro
//! fault-detection bits. With `duplicate_to_redundant` enabled a 6-value
//! input gets a synthetic redundant channel: each primary value scaled by a
//! small random factor.

pub mod frame;
pub mod scaling;
pub mod status;
pub mod status_words;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{EncodeError, EncodeResult};
use crate::frame::EncodedFrame;
use crate::{sanitize, DeviceEncoder};

pub use frame::{RateSensorPacket, FRAME_LEN, SYNC_BYTE};
pub use scaling::{ANGLE_SCALE, MAX_INPUT_MAGNITUDE, RATE_SCALE};
pub use status::RateSensorStatus;
pub use status_words::{BitMode, StatusWord1, StatusWord2, StatusWord3};

const DEVICE: &str = "rate sensor";

/// Vector length for primary-only input.
pub const PRIMARY_ONLY_LEN: usize = 6;

/// Vector length for primary plus redundant input.
pub const FULL_LEN: usize = 12;

/// Rate sensor encoder options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateSensorConfig {
    /// Synthesize redundant channels from 6-value input
    pub duplicate_to_redundant: bool,
    /// Redundant channel variation, percent of the primary value
    pub redundant_variation_percent: f64,
    /// Primary/redundant rate difference that trips fault detection, rad/s
    pub discrepancy_threshold: f64,
    /// Fixed RNG seed for reproducible redundant channels
    pub seed: Option<u64>,
}

impl Default for RateSensorConfig {
    fn default() -> Self {
        Self {
            duplicate_to_redundant: false,
            redundant_variation_percent: 0.1,
            discrepancy_threshold: 0.1,
            seed: None,
        }
    }
}

/// One rate sensor sample in physical units.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RateSensorSample {
    /// Primary angular rate, rad/s
    pub primary_rate: [f64; 3],
    /// Redundant angular rate, rad/s
    pub redundant_rate: [f64; 3],
    /// Primary summed angle, rad
    pub primary_angle: [f64; 3],
    /// Redundant summed angle, rad
    pub redundant_angle: [f64; 3],
}

impl RateSensorSample {
    /// Largest primary/redundant rate difference across the three axes.
    ///
    /// NaN differences are ignored.
    pub fn max_rate_discrepancy(&self) -> f64 {
        self.primary_rate
            .iter()
            .zip(&self.redundant_rate)
            .map(|(p, r)| (p - r).abs())
            .fold(0.0, f64::max)
    }

    /// True when any primary or redundant rate is non-zero.
    pub fn has_rate_data(&self) -> bool {
        self.primary_rate
            .iter()
            .chain(&self.redundant_rate)
            .any(|&v| v != 0.0 && !v.is_nan())
    }
}

/// Stateful rate sensor encoder.
///
/// Holds the rolling message counter, the latched "data seen" flag and the
/// RNG used for redundant-channel synthesis.
pub struct RateSensorEncoder {
    config: RateSensorConfig,
    rng: StdRng,
    message_counter: u32,
    data_seen: bool,
}

impl RateSensorEncoder {
    pub fn new(config: RateSensorConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            config,
            rng,
            message_counter: 0,
            data_seen: false,
        }
    }

    pub fn config(&self) -> &RateSensorConfig {
        &self.config
    }

    /// Number of frames encoded so far.
    pub fn message_counter(&self) -> u32 {
        self.message_counter
    }

    /// Split a 6- or 12-value vector into a sample.
    ///
    /// Unusable values (non-finite or beyond [`MAX_INPUT_MAGNITUDE`]) are
    /// zeroed first, so they neither count as data nor drive the
    /// primary/redundant discrepancy.
    ///
    /// # Errors
    /// [`EncodeError::RedundantChannelsMissing`] for 6 values without
    /// duplication, [`EncodeError::VectorLength`] for any other length.
    pub fn split_input(&mut self, values: &[f64]) -> EncodeResult<RateSensorSample> {
        let values: Vec<f64> = values.iter().map(|&v| sanitize(v, MAX_INPUT_MAGNITUDE)).collect();
        match values.len() {
            FULL_LEN => Ok(RateSensorSample {
                primary_rate: [values[0], values[1], values[2]],
                redundant_rate: [values[3], values[4], values[5]],
                primary_angle: [values[6], values[7], values[8]],
                redundant_angle: [values[9], values[10], values[11]],
            }),
            PRIMARY_ONLY_LEN if self.config.duplicate_to_redundant => {
                let primary_rate = [values[0], values[1], values[2]];
                let primary_angle = [values[3], values[4], values[5]];
                Ok(RateSensorSample {
                    primary_rate,
                    redundant_rate: primary_rate.map(|v| self.vary(v)),
                    primary_angle,
                    redundant_angle: primary_angle.map(|v| self.vary(v)),
                })
            }
            PRIMARY_ONLY_LEN => Err(EncodeError::RedundantChannelsMissing),
            actual => Err(EncodeError::VectorLength {
                device: DEVICE,
                expected: "6 or 12",
                actual,
            }),
        }
    }

    /// Scale a primary value by `1 + U(-p, p)`; fall back to the primary
    /// value if the result is not usable.
    fn vary(&mut self, value: f64) -> f64 {
        let spread = self.config.redundant_variation_percent.abs() / 100.0;
        if !spread.is_finite() || spread == 0.0 {
            return value;
        }
        let varied = value * (1.0 + self.rng.random_range(-spread..=spread));
        if varied.is_finite() && varied.abs() <= MAX_INPUT_MAGNITUDE {
            varied
        } else {
            value
        }
    }

    /// Build the raw packet for a sample and advance the message counter.
    pub fn build_packet(&mut self, sample: &RateSensorSample, status: &RateSensorStatus) -> RateSensorPacket {
        if sample.has_rate_data() {
            self.data_seen = true;
        }
        let discrepancy = sample.max_rate_discrepancy() > self.config.discrepancy_threshold;

        let packet = pack_sample(
            sample,
            status,
            (self.message_counter % 4) as u8,
            self.data_seen,
            discrepancy,
        );
        self.message_counter = self.message_counter.wrapping_add(1);
        packet
    }
}

/// Combine sample and scenario into a packet.
///
/// Pure: the same inputs always produce the same packet.
pub fn pack_sample(
    sample: &RateSensorSample,
    status: &RateSensorStatus,
    counter: u8,
    data_seen: bool,
    discrepancy: bool,
) -> RateSensorPacket {
    let rate_sensor_failed = status.rate_sensor_failed || !data_seen;
    let gyro_failed = status.gyro_failed || discrepancy;

    let word1 = StatusWord1 {
        counter,
        bit_mode: status.bit_mode,
        rate_sensor_failed,
        gyro_failed,
        agc_voltage_failed: status.agc_voltage_failed,
    };
    let word2 = StatusWord2 {
        temperature_c: status.temperature_c,
        motor_bias_voltage_failed: status.motor_bias_voltage_failed,
        start_data_flag: status.start_data_flag,
        processor_failed: status.processor_failed,
        memory_failed: status.memory_failed,
    };
    let word3 = StatusWord3 {
        start_run: status.start_run.map(|run| run && data_seen),
        fdc: status.fdc.map(|fdc| fdc || discrepancy),
        fdc_failed: status.fdc_failed || discrepancy,
        rs_ok: status.rs_ok && !rate_sensor_failed && !gyro_failed,
    };

    RateSensorPacket {
        rates: sample.primary_rate.map(scaling::rate_to_counts),
        status_words: [word1.pack(), word2.pack(), word3.pack()],
        angles: sample.primary_angle.map(scaling::angle_to_counts),
    }
}

impl DeviceEncoder for RateSensorEncoder {
    type Status = RateSensorStatus;

    fn encode(&mut self, values: &[f64], status: &RateSensorStatus) -> EncodeResult<EncodedFrame> {
        let sample = self.split_input(values)?;
        let packet = self.build_packet(&sample, status);
        Ok(EncodedFrame::Stream(packet.to_bytes()))
    }
}
