//! Desired-gain computation
//!
//! Maps the smoothed level of a stream onto a correction gain relative to its
//! learned baseline:
//!
//! ```text
//!  gain
//!  1.6 ┤████████╮                          boost (soft knee), capped
//!      │        ╰──╮
//!  1.0 ┤           ├─────────────╮         dead zone
//!      │           │             ╰──╮
//! 0.35 ┤           │                ╰───── baseline / level, floored
//!      └───────────┴─────────────┴──────── level
//!          baseline*0.6   baseline*sensitivity
//! ```

use crate::settings::EngineSettings;
use crate::{EPSILON, MAX_GAIN, MIN_GAIN, SOFT_KNEE_RATIO};

/// Threshold, dead-zone and soft-knee rules for the levelling gain
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainPolicy {
    /// Lowest gain ever requested (linear)
    pub min_gain: f32,
    /// Highest gain ever requested (linear)
    pub max_gain: f32,
    /// Levels below `baseline * knee_ratio` are boosted
    pub knee_ratio: f32,
}

impl GainPolicy {
    /// Policy with the default range (0.35-1.6) and knee (0.6)
    pub const fn new() -> Self {
        Self {
            min_gain: MIN_GAIN,
            max_gain: MAX_GAIN,
            knee_ratio: SOFT_KNEE_RATIO,
        }
    }

    /// Correction gain for a calibrated, enabled stream
    ///
    /// A level exactly at `baseline * sensitivity` falls in the dead zone.
    pub fn desired_gain(&self, smoothed: f32, baseline: f32, sensitivity: f32) -> f32 {
        let threshold = baseline * sensitivity;

        let desired = if smoothed > threshold {
            // Loud: pull back toward the baseline
            baseline / smoothed
        } else if smoothed < baseline * self.knee_ratio {
            // Quiet: bounded boost
            self.max_gain.min(baseline / smoothed.max(EPSILON))
        } else {
            1.0
        };

        self.clamp(desired)
    }

    /// Gain the smoother should chase this tick
    ///
    /// Exactly 1.0 when there is no baseline yet or levelling is disabled.
    pub fn target_gain(&self, smoothed: f32, baseline: Option<f32>, settings: EngineSettings) -> f32 {
        match baseline {
            Some(baseline) if settings.enabled => {
                self.desired_gain(smoothed, baseline, settings.sensitivity)
            }
            _ => 1.0,
        }
    }

    /// Clamp a gain into this policy's range
    pub fn clamp(&self, gain: f32) -> f32 {
        if gain.is_nan() {
            return 1.0;
        }
        gain.clamp(self.min_gain, self.max_gain)
    }
}

impl Default for GainPolicy {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLICY: GainPolicy = GainPolicy::new();

    #[test]
    fn test_attenuates_above_threshold() {
        let gain = POLICY.desired_gain(0.4, 0.2, 1.0);
        assert!((gain - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_attenuation_floor() {
        // 0.1 / 1.0 = 0.1 would be far below the floor
        let gain = POLICY.desired_gain(1.0, 0.1, 1.0);
        assert_eq!(gain, MIN_GAIN);
    }

    #[test]
    fn test_threshold_boundary_is_dead_zone() {
        let baseline = 0.25_f32;
        let sensitivity = 1.5_f32;
        let threshold = baseline * sensitivity;

        assert_eq!(POLICY.desired_gain(threshold, baseline, sensitivity), 1.0);

        let just_above = f32::from_bits(threshold.to_bits() + 1);
        assert!(POLICY.desired_gain(just_above, baseline, sensitivity) < 1.0);
    }

    #[test]
    fn test_dead_zone() {
        for level in [0.6_f32, 0.8, 0.95, 1.0] {
            assert_eq!(POLICY.desired_gain(level, 1.0, 1.0), 1.0, "level {}", level);
        }
    }

    #[test]
    fn test_soft_knee_boost() {
        assert_eq!(POLICY.desired_gain(0.1, 1.0, 1.0), 1.6);

        // Inside the knee baseline/level is always above 1/0.6, so the cap wins
        assert_eq!(POLICY.desired_gain(0.55, 1.0, 1.0), MAX_GAIN);
    }

    #[test]
    fn test_silence_boost_is_capped() {
        assert_eq!(POLICY.desired_gain(0.0, 0.3, 1.0), MAX_GAIN);
    }

    #[test]
    fn test_higher_sensitivity_widens_dead_zone() {
        // Level 1.5x above baseline: attenuated at 1.0, untouched at 2.0
        assert!(POLICY.desired_gain(0.3, 0.2, 1.0) < 1.0);
        assert_eq!(POLICY.desired_gain(0.3, 0.2, 2.0), 1.0);
    }

    #[test]
    fn test_target_without_baseline_or_disabled() {
        let enabled = EngineSettings::default();
        let disabled = EngineSettings {
            enabled: false,
            ..EngineSettings::default()
        };

        assert_eq!(POLICY.target_gain(0.9, None, enabled), 1.0);
        assert_eq!(POLICY.target_gain(0.9, Some(0.1), disabled), 1.0);
        assert!(POLICY.target_gain(0.9, Some(0.1), enabled) < 1.0);
    }
}
