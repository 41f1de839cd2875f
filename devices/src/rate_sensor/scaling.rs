//! Fixed-point scaling for rate sensor rate and angle fields.

use crate::sanitize;

/// Angular rate resolution: 600 × 2⁻²³ rad/s per LSB.
pub const RATE_SCALE: f64 = 600.0 / 8_388_608.0;

/// Summed angle resolution: 2⁻²⁷ rad per LSB.
pub const ANGLE_SCALE: f64 = 1.0 / 134_217_728.0;

/// Inputs beyond this magnitude are treated as garbage and encoded as zero.
pub const MAX_INPUT_MAGNITUDE: f64 = 1e6;

/// Convert an angular rate in rad/s to saturated 16-bit counts.
pub fn rate_to_counts(rad_per_sec: f64) -> i16 {
    let value = sanitize(rad_per_sec, MAX_INPUT_MAGNITUDE);
    (value / RATE_SCALE)
        .round()
        .clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16
}

/// Convert 16-bit rate counts back to rad/s.
pub fn counts_to_rate(counts: i16) -> f64 {
    f64::from(counts) * RATE_SCALE
}

/// Convert a summed angle in radians to saturated 32-bit counts.
pub fn angle_to_counts(radians: f64) -> i32 {
    let value = sanitize(radians, MAX_INPUT_MAGNITUDE);
    (value / ANGLE_SCALE)
        .round()
        .clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32
}

/// Convert 32-bit angle counts back to radians.
pub fn counts_to_angle(counts: i32) -> f64 {
    f64::from(counts) * ANGLE_SCALE
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_scale_constants() {
        assert_abs_diff_eq!(RATE_SCALE, 7.152_557_373_046_875e-5, epsilon = 1e-18);
        assert_abs_diff_eq!(ANGLE_SCALE, 7.450_580_596_923_828e-9, epsilon = 1e-21);
    }

    #[test]
    fn test_rate_roundtrip_within_one_lsb() {
        for &rate in &[0.0, 0.0001745, -0.0001745, 0.01, -0.5, 1.0, 2.3] {
            let decoded = counts_to_rate(rate_to_counts(rate));
            assert_abs_diff_eq!(decoded, rate, epsilon = RATE_SCALE);
        }
    }

    #[test]
    fn test_rate_rounds_to_nearest() {
        assert_eq!(rate_to_counts(RATE_SCALE * 10.4), 10);
        assert_eq!(rate_to_counts(RATE_SCALE * 10.6), 11);
        assert_eq!(rate_to_counts(-RATE_SCALE * 10.6), -11);
    }

    #[test]
    fn test_rate_saturates() {
        // Full scale is about ±2.34 rad/s
        assert_eq!(rate_to_counts(10.0), i16::MAX);
        assert_eq!(rate_to_counts(-10.0), i16::MIN);
    }

    #[test]
    fn test_garbage_inputs_encode_as_zero() {
        assert_eq!(rate_to_counts(f64::NAN), 0);
        assert_eq!(rate_to_counts(f64::NEG_INFINITY), 0);
        assert_eq!(rate_to_counts(2e6), 0);
        assert_eq!(angle_to_counts(f64::INFINITY), 0);
        assert_eq!(angle_to_counts(-5e6), 0);
    }

    #[test]
    fn test_angle_counts() {
        assert_eq!(angle_to_counts(1.0), 134_217_728);
        assert_eq!(angle_to_counts(-0.5), -67_108_864);
        assert_abs_diff_eq!(counts_to_angle(angle_to_counts(0.123456)), 0.123456, epsilon = ANGLE_SCALE);
    }

    #[test]
    fn test_angle_saturates() {
        // 16 rad is exactly 2^31 counts, one past i32::MAX
        assert_eq!(angle_to_counts(16.0), i32::MAX);
        assert_eq!(angle_to_counts(-100.0), i32::MIN);
    }
}
