//! Short-term energy tracking
//!
//! Converts each sample block into an RMS level and keeps an exponentially
//! smoothed running value that the gain policy reacts to.

use crate::{ENERGY_SMOOTHING, EPSILON};

/// Root-mean-square level of a sample block
///
/// Returns 0.0 for an empty block. Non-finite samples count as silence so one
/// corrupt block cannot poison the smoothed level.
pub fn block_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum: f64 = samples
        .iter()
        .filter(|s| s.is_finite())
        .map(|&s| (s as f64) * (s as f64))
        .sum();
    (sum / samples.len() as f64).sqrt() as f32
}

/// Exponentially smoothed RMS tracker
///
/// Live gain decisions use the smoothed value; explicit calibration reads the
/// instantaneous level of the last block instead (see [`last_rms`](Self::last_rms)).
#[derive(Debug, Clone)]
pub struct EnergyEstimator {
    /// Smoothing coefficient (weight of the previous value)
    smoothing: f32,
    /// Smoothed RMS (includes the epsilon floor)
    smoothed: f32,
    /// RMS of the most recent block, without the epsilon floor
    last_rms: f32,
    /// Number of blocks seen since creation or reset
    updates: u64,
}

impl EnergyEstimator {
    /// Create an estimator with the default smoothing coefficient (0.92)
    pub fn new() -> Self {
        Self::with_smoothing(ENERGY_SMOOTHING)
    }

    /// Create an estimator with a custom smoothing coefficient (0.0-1.0)
    pub fn with_smoothing(smoothing: f32) -> Self {
        Self {
            smoothing: smoothing.clamp(0.0, 1.0),
            smoothed: 0.0,
            last_rms: 0.0,
            updates: 0,
        }
    }

    /// Feed one block and return the new smoothed level
    pub fn update(&mut self, samples: &[f32]) -> f32 {
        self.last_rms = block_rms(samples);
        let rms = self.last_rms + EPSILON;
        self.smoothed = self.smoothed * self.smoothing + rms * (1.0 - self.smoothing);
        self.updates += 1;
        self.smoothed
    }

    /// Current smoothed level
    pub fn smoothed(&self) -> f32 {
        self.smoothed
    }

    /// Instantaneous RMS of the last block
    pub fn last_rms(&self) -> f32 {
        self.last_rms
    }

    /// Whether at least one block has been fed
    pub fn has_input(&self) -> bool {
        self.updates > 0
    }

    /// Forget all history
    pub fn reset(&mut self) {
        self.smoothed = 0.0;
        self.last_rms = 0.0;
        self.updates = 0;
    }
}

impl Default for EnergyEstimator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_rms_constant() {
        let samples = vec![0.5_f32; 256];
        assert!((block_rms(&samples) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_block_rms_sine() {
        // Full-scale sine has RMS 1/sqrt(2)
        let samples: Vec<f32> = (0..4800)
            .map(|i| (2.0 * std::f32::consts::PI * 100.0 * i as f32 / 48000.0).sin())
            .collect();
        assert!((block_rms(&samples) - std::f32::consts::FRAC_1_SQRT_2).abs() < 0.001);
    }

    #[test]
    fn test_non_finite_samples_count_as_silence() {
        let samples = [0.5, f32::NAN, 0.5, f32::INFINITY];
        let rms = block_rms(&samples);
        assert!((rms - 0.5 / std::f32::consts::SQRT_2).abs() < 1e-6);

        assert_eq!(block_rms(&[f32::NAN; 64]), 0.0);
        assert_eq!(block_rms(&[f32::NEG_INFINITY; 8]), 0.0);
    }

    #[test]
    fn test_nan_block_does_not_poison_smoothed_level() {
        let mut estimator = EnergyEstimator::new();
        for _ in 0..100 {
            estimator.update(&[0.1; 128]);
        }
        let before = estimator.smoothed();

        let after_nan = estimator.update(&[f32::NAN; 128]);
        assert!(after_nan.is_finite());
        assert!((after_nan - before * ENERGY_SMOOTHING).abs() < 1e-6);

        for _ in 0..200 {
            estimator.update(&[0.1; 128]);
        }
        assert!((estimator.smoothed() - 0.1).abs() < 1e-4);
    }

    #[test]
    fn test_empty_block_is_floored() {
        let mut estimator = EnergyEstimator::new();
        let smoothed = estimator.update(&[]);

        assert_eq!(estimator.last_rms(), 0.0);
        assert!(smoothed > 0.0, "epsilon floor keeps the level above zero");
        assert!(smoothed < 1e-9);
    }

    #[test]
    fn test_smoothing_recurrence() {
        let mut estimator = EnergyEstimator::new();
        let block = vec![0.5_f32; 128];

        let first = estimator.update(&block);
        let expected_first = (0.5 + EPSILON) * (1.0 - ENERGY_SMOOTHING);
        assert!((first - expected_first).abs() < 1e-6);

        let second = estimator.update(&block);
        let expected_second = first * ENERGY_SMOOTHING + (0.5 + EPSILON) * (1.0 - ENERGY_SMOOTHING);
        assert!((second - expected_second).abs() < 1e-6);
    }

    #[test]
    fn test_converges_to_block_level() {
        let mut estimator = EnergyEstimator::new();
        let block = vec![-0.25_f32; 64];

        for _ in 0..500 {
            estimator.update(&block);
        }

        assert!((estimator.smoothed() - 0.25).abs() < 1e-4);
        assert!(estimator.has_input());
    }

    #[test]
    fn test_reset() {
        let mut estimator = EnergyEstimator::new();
        estimator.update(&[0.9; 32]);
        estimator.reset();

        assert_eq!(estimator.smoothed(), 0.0);
        assert!(!estimator.has_input());
    }
}
