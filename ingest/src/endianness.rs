//! Statistical byte-order detection.
//!
//! The simulator does not announce its byte order, so each channel keeps a
//! rolling window of raw samples and three independent scorers vote on it:
//!
//! | Scorer      | Signal                                                   |
//! |-------------|----------------------------------------------------------|
//! | range       | fraction of decoded values that are physically plausible |
//! | pattern     | zero bytes at the low-mantissa end of the sample         |
//! | consistency | coefficient of variation of the decoded series          |
//!
//! A scorer that sees no difference between the two readings abstains.
//! The majority of the remaining scorers wins and the reported confidence
//! is the mean of their confidences, so a constant stream (where pattern
//! and consistency cannot tell the orders apart) is judged on range alone.
//! Detection is best effort: until a channel has a confident verdict every
//! sample is decoded both ways and the plausible reading is kept. Streams
//! whose bytes decode plausibly and equally smoothly both ways get no
//! confidence at all.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use strum::Display;
use tracing::debug;

use crate::frame_reader::SAMPLE_LEN;
use crate::lock;

/// A raw 8-byte sample as received.
pub type RawSample = [u8; SAMPLE_LEN];

/// Upper bound on the coefficient of variation, reached when the mean is
/// effectively zero.
const MAX_CV: f64 = 1e6;

/// Verdicts at or below this confidence are not trusted.
pub const CONFIDENCE_THRESHOLD: f64 = 0.5;

/// Byte order of a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    pub fn decode(self, raw: RawSample) -> f64 {
        match self {
            ByteOrder::Little => f64::from_le_bytes(raw),
            ByteOrder::Big => f64::from_be_bytes(raw),
        }
    }
}

/// Scorer that contributed the strongest evidence to a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DetectionMethod {
    Range,
    Pattern,
    Consistency,
}

/// Current byte-order verdict for one channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndiannessVerdict {
    pub byte_order: ByteOrder,
    /// 0.0 (no evidence) to 1.0
    pub confidence: f64,
    pub method: DetectionMethod,
    pub samples_tested: usize,
    pub last_updated: SystemTime,
}

impl EndiannessVerdict {
    pub fn is_big_endian(&self) -> bool {
        self.byte_order == ByteOrder::Big
    }

    /// Whether consumers should decode with this verdict.
    pub fn is_confident(&self) -> bool {
        self.confidence > CONFIDENCE_THRESHOLD
    }
}

/// Detector tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Raw samples retained per channel
    pub window: usize,
    /// Samples required before the first vote
    pub min_samples: usize,
    /// Largest plausible physical magnitude
    pub plausibility_bound: f64,
    /// Smallest plausible non-zero magnitude
    pub min_magnitude: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            window: 50,
            min_samples: 10,
            plausibility_bound: 1000.0,
            min_magnitude: 1e-12,
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.min_samples == 0 || self.window < self.min_samples {
            return Err(format!(
                "detector window {} must be at least min_samples {} (> 0)",
                self.window, self.min_samples
            ));
        }
        if !(self.plausibility_bound > self.min_magnitude && self.min_magnitude >= 0.0) {
            return Err("detector plausibility bounds are inverted".to_string());
        }
        Ok(())
    }

    /// Finite, below the bound and not vanishingly small.
    pub fn is_plausible(&self, value: f64) -> bool {
        let magnitude = value.abs();
        value.is_finite()
            && magnitude < self.plausibility_bound
            && (value == 0.0 || magnitude >= self.min_magnitude)
    }
}

/// One scorer's opinion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vote {
    pub byte_order: ByteOrder,
    pub confidence: f64,
}

impl Vote {
    /// Vote for the lower score; `None` when the scores are equal.
    fn prefer_lower(le: f64, be: f64, confidence: f64) -> Option<Self> {
        if le == be {
            return None;
        }
        Some(Self {
            byte_order: if be < le { ByteOrder::Big } else { ByteOrder::Little },
            confidence,
        })
    }
}

fn decode_both(samples: &[RawSample]) -> (Vec<f64>, Vec<f64>) {
    samples
        .iter()
        .map(|raw| (ByteOrder::Little.decode(*raw), ByteOrder::Big.decode(*raw)))
        .unzip()
}

/// Range scorer: the byte order with more plausible values wins.
pub fn range_vote(config: &DetectorConfig, samples: &[RawSample]) -> Option<Vote> {
    let n = samples.len().max(1) as f64;
    let (le, be) = decode_both(samples);
    let fraction = |values: &[f64]| values.iter().filter(|v| config.is_plausible(**v)).count() as f64 / n;
    let (le, be) = (fraction(&le), fraction(&be));
    // Higher is better, so compare negated fractions
    Vote::prefer_lower(-le, -be, (le - be).abs())
}

/// Pattern scorer: small round values leave zero low-mantissa bytes, which
/// lead a little-endian sample and trail a big-endian one.
pub fn pattern_vote(samples: &[RawSample]) -> Option<Vote> {
    let n = samples.len().max(1) as f64;
    let le = samples.iter().filter(|raw| raw[0] == 0 && raw[1] == 0).count() as f64;
    let be = samples
        .iter()
        .filter(|raw| raw[SAMPLE_LEN - 1] == 0 && raw[SAMPLE_LEN - 2] == 0)
        .count() as f64;
    Vote::prefer_lower(-le, -be, (le - be).abs() / n)
}

/// Coefficient of variation of a series, with non-finite values read as 0.
///
/// Values are normalized by the largest magnitude first so that wildly
/// misdecoded series cannot overflow.
pub fn coefficient_of_variation(values: &[f64]) -> f64 {
    let clean: Vec<f64> = values
        .iter()
        .map(|v| if v.is_finite() { *v } else { 0.0 })
        .collect();
    let scale = clean.iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
    if clean.is_empty() || scale == 0.0 {
        return 0.0;
    }
    let n = clean.len() as f64;
    let mean = clean.iter().map(|v| v / scale).sum::<f64>() / n;
    let variance = clean.iter().map(|v| (v / scale - mean).powi(2)).sum::<f64>() / n;
    if mean.abs() < 1e-12 {
        return MAX_CV;
    }
    (variance.sqrt() / mean.abs()).min(MAX_CV)
}

/// Consistency scorer: the smoother decoded series wins.
pub fn consistency_vote(samples: &[RawSample]) -> Option<Vote> {
    let (le, be) = decode_both(samples);
    let (cv_le, cv_be) = (coefficient_of_variation(&le), coefficient_of_variation(&be));
    let total = cv_le + cv_be;
    let confidence = if total > 0.0 { (cv_le - cv_be).abs() / total } else { 0.0 };
    Vote::prefer_lower(cv_le, cv_be, confidence)
}

/// Run all three scorers over a window.
///
/// Returns the majority byte order among the scorers that voted, the mean
/// of their confidences and the scorer with the strongest confidence. A
/// split vote goes to the side with more total confidence, then to
/// little-endian. With no votes at all the verdict is little-endian with
/// zero confidence.
pub fn evaluate(config: &DetectorConfig, samples: &[RawSample]) -> (ByteOrder, f64, DetectionMethod) {
    let votes: Vec<(DetectionMethod, Vote)> = [
        (DetectionMethod::Range, range_vote(config, samples)),
        (DetectionMethod::Pattern, pattern_vote(samples)),
        (DetectionMethod::Consistency, consistency_vote(samples)),
    ]
    .into_iter()
    .filter_map(|(method, vote)| vote.map(|vote| (method, vote)))
    .collect();

    let Some(&(mut method, mut strongest)) = votes.first() else {
        return (ByteOrder::Little, 0.0, DetectionMethod::Range);
    };
    for &(candidate, vote) in &votes[1..] {
        if vote.confidence > strongest.confidence {
            method = candidate;
            strongest = vote;
        }
    }

    let tally = |order: ByteOrder| {
        votes
            .iter()
            .filter(|(_, vote)| vote.byte_order == order)
            .fold((0usize, 0.0f64), |(count, sum), (_, vote)| (count + 1, sum + vote.confidence))
    };
    let (big_count, big_sum) = tally(ByteOrder::Big);
    let (little_count, little_sum) = tally(ByteOrder::Little);
    let byte_order = if big_count > little_count || (big_count == little_count && big_sum > little_sum) {
        ByteOrder::Big
    } else {
        ByteOrder::Little
    };

    let confidence = (big_sum + little_sum) / votes.len() as f64;
    (byte_order, confidence.clamp(0.0, 1.0), method)
}

#[derive(Debug, Default)]
struct ChannelWindow {
    samples: VecDeque<RawSample>,
    verdict: Option<EndiannessVerdict>,
}

/// Per-channel byte-order detector shared by a device's listeners.
#[derive(Debug, Default)]
pub struct EndiannessDetector {
    config: DetectorConfig,
    channels: Mutex<BTreeMap<usize, ChannelWindow>>,
}

impl EndiannessDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            channels: Default::default(),
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Record a raw sample and decode it with the best available knowledge.
    pub fn observe_and_decode(&self, channel: usize, raw: RawSample) -> f64 {
        let mut channels = lock(&self.channels);
        let window = channels.entry(channel).or_default();

        window.samples.push_back(raw);
        while window.samples.len() > self.config.window {
            window.samples.pop_front();
        }

        if window.samples.len() >= self.config.min_samples {
            let samples: Vec<RawSample> = window.samples.iter().copied().collect();
            let (byte_order, confidence, method) = evaluate(&self.config, &samples);
            let changed = window
                .verdict
                .as_ref()
                .is_none_or(|previous| previous.byte_order != byte_order);
            if changed {
                debug!(
                    "Channel {channel}: byte order {byte_order} (confidence {confidence:.2}, {method})"
                );
            }
            window.verdict = Some(EndiannessVerdict {
                byte_order,
                confidence,
                method,
                samples_tested: samples.len(),
                last_updated: SystemTime::now(),
            });
        }

        match &window.verdict {
            Some(verdict) if verdict.is_confident() => verdict.byte_order.decode(raw),
            _ => self.fallback_decode(raw),
        }
    }

    /// Decode both ways and keep the plausible reading, little-endian when
    /// both or neither are plausible.
    pub fn fallback_decode(&self, raw: RawSample) -> f64 {
        let le = ByteOrder::Little.decode(raw);
        let be = ByteOrder::Big.decode(raw);
        if self.config.is_plausible(be) && !self.config.is_plausible(le) {
            be
        } else {
            le
        }
    }

    /// Current verdict for a channel, if enough samples have arrived.
    pub fn verdict(&self, channel: usize) -> Option<EndiannessVerdict> {
        lock(&self.channels).get(&channel).and_then(|w| w.verdict.clone())
    }

    /// Verdicts for every channel that has one.
    pub fn report(&self) -> BTreeMap<usize, EndiannessVerdict> {
        lock(&self.channels)
            .iter()
            .filter_map(|(channel, window)| window.verdict.clone().map(|v| (*channel, v)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn smooth_series(n: usize) -> Vec<f64> {
        (0..n).map(|i| 1.0 + 0.5 * (0.3 * i as f64).sin()).collect()
    }

    fn le_samples(values: &[f64]) -> Vec<RawSample> {
        values.iter().map(|v| v.to_le_bytes()).collect()
    }

    fn be_samples(values: &[f64]) -> Vec<RawSample> {
        values.iter().map(|v| v.to_be_bytes()).collect()
    }

    #[test]
    fn test_plausibility() {
        let config = DetectorConfig::default();
        assert!(config.is_plausible(0.0));
        assert!(config.is_plausible(-999.0));
        assert!(config.is_plausible(1e-12));
        assert!(!config.is_plausible(1000.0));
        assert!(!config.is_plausible(1e-300));
        assert!(!config.is_plausible(f64::NAN));
        assert!(!config.is_plausible(f64::NEG_INFINITY));
    }

    #[test]
    fn test_little_endian_series_detected() {
        let samples = le_samples(&smooth_series(40));
        let (order, confidence, _) = evaluate(&DetectorConfig::default(), &samples);
        assert_eq!(order, ByteOrder::Little);
        assert!(confidence > 0.5, "confidence {confidence}");
    }

    #[test]
    fn test_big_endian_series_detected() {
        let samples = be_samples(&smooth_series(40));
        let (order, confidence, _) = evaluate(&DetectorConfig::default(), &samples);
        assert_eq!(order, ByteOrder::Big);
        assert!(confidence > 0.5, "confidence {confidence}");
    }

    #[test]
    fn test_constant_streams_detected() {
        let config = DetectorConfig::default();
        for value in [0.0001745, 1.0, 42.5, -273.15, 999.0, 3.14159] {
            let (order, confidence, _) = evaluate(&config, &le_samples(&[value; 12]));
            assert_eq!(order, ByteOrder::Little, "{value}");
            assert!(confidence > 0.5, "{value}: confidence {confidence}");

            let (order, confidence, _) = evaluate(&config, &be_samples(&[value; 12]));
            assert_eq!(order, ByteOrder::Big, "{value}");
            assert!(confidence > 0.5, "{value}: confidence {confidence}");
        }
    }

    #[test]
    fn test_one_lsb_stream_trusted_by_detector() {
        let detector = EndiannessDetector::new(DetectorConfig::default());
        for _ in 0..12 {
            assert_eq!(detector.observe_and_decode(0, 0.0001745f64.to_le_bytes()), 0.0001745);
        }
        let verdict = detector.verdict(0).unwrap();
        assert_eq!(verdict.byte_order, ByteOrder::Little);
        assert!(verdict.is_confident(), "confidence {}", verdict.confidence);
        assert_eq!(verdict.method, DetectionMethod::Range);
    }

    #[test]
    fn test_indistinguishable_stream_has_no_confidence() {
        // Zero reads the same in both orders
        let (order, confidence, _) = evaluate(&DetectorConfig::default(), &le_samples(&[0.0; 12]));
        assert_eq!(order, ByteOrder::Little);
        assert_eq!(confidence, 0.0);
    }

    #[test]
    fn test_range_vote() {
        let config = DetectorConfig::default();
        let vote = range_vote(&config, &le_samples(&smooth_series(20))).unwrap();
        assert_eq!(vote.byte_order, ByteOrder::Little);
        assert!(vote.confidence > 0.8);
    }

    #[test]
    fn test_pattern_vote_on_round_values() {
        // Small integers have an all-zero low mantissa
        let values: Vec<f64> = (1..=10).map(f64::from).collect();
        let vote = pattern_vote(&be_samples(&values)).unwrap();
        assert_eq!(vote.byte_order, ByteOrder::Big);
        assert_relative_eq!(vote.confidence, 1.0);
    }

    #[test]
    fn test_tied_scorers_abstain() {
        assert_eq!(pattern_vote(&[[0u8; 8], [0u8; 8]]), None);
        // Both readings of a constant stream are perfectly consistent
        assert_eq!(consistency_vote(&le_samples(&[0.0001745; 12])), None);
    }

    #[test]
    fn test_coefficient_of_variation() {
        assert_eq!(coefficient_of_variation(&[]), 0.0);
        assert_eq!(coefficient_of_variation(&[0.0, 0.0]), 0.0);
        assert_relative_eq!(coefficient_of_variation(&[2.0, 2.0, 2.0]), 0.0);
        assert_relative_eq!(coefficient_of_variation(&[1.0, 3.0]), 0.5);
        assert_eq!(coefficient_of_variation(&[1.0, -1.0]), MAX_CV);
        // Huge values do not overflow
        assert_relative_eq!(coefficient_of_variation(&[1e300, 3e300]), 0.5, epsilon = 1e-12);
        // Non-finite reads as zero: [0, 2] has cv 1
        assert_relative_eq!(coefficient_of_variation(&[f64::NAN, 2.0]), 1.0);
    }

    #[test]
    fn test_no_verdict_before_min_samples() {
        let detector = EndiannessDetector::new(DetectorConfig::default());
        for raw in le_samples(&smooth_series(9)) {
            detector.observe_and_decode(3, raw);
        }
        assert!(detector.verdict(3).is_none());
        assert!(detector.report().is_empty());
    }

    #[test]
    fn test_detector_reports_per_channel() {
        let detector = EndiannessDetector::new(DetectorConfig::default());
        let series = smooth_series(60);
        for (le, be) in le_samples(&series).into_iter().zip(be_samples(&series)) {
            detector.observe_and_decode(0, le);
            detector.observe_and_decode(1, be);
        }

        let report = detector.report();
        assert_eq!(report.len(), 2);
        assert_eq!(report[&0].byte_order, ByteOrder::Little);
        assert!(report[&1].is_big_endian());
        assert!(report[&1].is_confident());
        assert_eq!(report[&0].samples_tested, 50);

        // Confident verdicts drive decoding
        assert_eq!(detector.observe_and_decode(1, 0.75f64.to_be_bytes()), 0.75);
        assert_eq!(detector.observe_and_decode(0, 0.75f64.to_le_bytes()), 0.75);
    }

    #[test]
    fn test_fallback_decode() {
        let detector = EndiannessDetector::default();
        assert_eq!(detector.fallback_decode(12.5f64.to_le_bytes()), 12.5);
        assert_eq!(detector.fallback_decode(12.5f64.to_be_bytes()), 12.5);
        // Neither reading is plausible: little-endian
        let raw = 1e200f64.to_le_bytes();
        assert_eq!(detector.fallback_decode(raw), 1e200);
    }

    #[test]
    fn test_config_validation() {
        assert!(DetectorConfig::default().validate().is_ok());
        let bad = DetectorConfig {
            window: 5,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
