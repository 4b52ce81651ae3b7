//! Baseline calibration
//!
//! A session learns its reference loudness in one of two ways:
//!
//! - **Warm-up**: after a run of playing ticks the smoothed level is taken as
//!   the baseline. Paused ticks do not count, but pausing does not discard
//!   progress either.
//! - **Explicit**: on request, the instantaneous level of the next N ticks is
//!   averaged. This supersedes warm-up and only one run may be in flight.
//!
//! Both are stepped once per tick by the owning session; nothing here blocks.

use crate::{CALIBRATION_TICKS, EPSILON, WARMUP_TICKS};

/// Where a session is in its calibration lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationState {
    /// No baseline yet; warm-up may be counting
    Uncalibrated,
    /// Explicit run in progress (a previous baseline may still be in force)
    Calibrating,
    /// Baseline established
    Calibrated,
}

/// Outcome of a calibration step that produced a baseline
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CalibrationEvent {
    /// Warm-up finished; baseline is the smoothed level at that tick
    WarmupCompleted { baseline: f32 },
    /// Explicit run finished; baseline is the mean sampled level
    ExplicitCompleted { baseline: f32, samples: usize },
}

impl CalibrationEvent {
    /// Baseline carried by this event
    pub fn baseline(&self) -> f32 {
        match *self {
            Self::WarmupCompleted { baseline } | Self::ExplicitCompleted { baseline, .. } => {
                baseline
            }
        }
    }
}

/// Per-session baseline calibrator
#[derive(Debug, Clone)]
pub struct BaselineCalibrator {
    baseline: Option<f32>,
    /// Playing ticks counted toward warm-up
    warmup_ticks: u32,
    /// Warm-up completes once the counter exceeds this
    warmup_threshold: u32,
    /// Instantaneous levels collected by the in-flight explicit run
    explicit_samples: Option<Vec<f32>>,
    /// Samples needed to finish an explicit run
    explicit_len: usize,
}

impl BaselineCalibrator {
    /// Create a calibrator with the default window lengths
    /// (~1 s warm-up and ~1.2 s explicit run at 60 ticks per second)
    pub fn new() -> Self {
        Self::with_windows(WARMUP_TICKS, CALIBRATION_TICKS)
    }

    /// Create a calibrator for a host that ticks at a different rate
    ///
    /// `explicit_len` is clamped to at least one sample.
    pub fn with_windows(warmup_threshold: u32, explicit_len: usize) -> Self {
        Self {
            baseline: None,
            warmup_ticks: 0,
            warmup_threshold,
            explicit_samples: None,
            explicit_len: explicit_len.max(1),
        }
    }

    /// Current baseline, if calibrated
    pub fn baseline(&self) -> Option<f32> {
        self.baseline
    }

    /// Whether a baseline has been established
    pub fn is_calibrated(&self) -> bool {
        self.baseline.is_some()
    }

    /// Whether an explicit run is in flight
    pub fn is_calibrating(&self) -> bool {
        self.explicit_samples.is_some()
    }

    /// Current lifecycle state
    pub fn state(&self) -> CalibrationState {
        if self.explicit_samples.is_some() {
            CalibrationState::Calibrating
        } else if self.baseline.is_some() {
            CalibrationState::Calibrated
        } else {
            CalibrationState::Uncalibrated
        }
    }

    /// Playing ticks counted so far toward warm-up
    pub fn warmup_progress(&self) -> u32 {
        self.warmup_ticks
    }

    /// Samples collected so far by the explicit run
    pub fn explicit_progress(&self) -> Option<usize> {
        self.explicit_samples.as_ref().map(Vec::len)
    }

    /// Arm an explicit calibration run
    ///
    /// Returns `false` (and changes nothing) if a run is already in flight.
    /// Restarts warm-up progress.
    pub fn begin_explicit(&mut self) -> bool {
        if self.explicit_samples.is_some() {
            return false;
        }
        self.explicit_samples = Some(Vec::with_capacity(self.explicit_len));
        self.warmup_ticks = 0;
        true
    }

    /// Advance calibration by one tick
    ///
    /// `smoothed` feeds warm-up, `instantaneous` feeds an explicit run.
    pub fn step(
        &mut self,
        smoothed: f32,
        instantaneous: f32,
        is_playing: bool,
    ) -> Option<CalibrationEvent> {
        // A reset between ticks has already dropped the run, so this check is
        // the cancellation point.
        if let Some(samples) = self.explicit_samples.as_mut() {
            // Unusable levels are dropped; the run just takes one tick longer
            if !instantaneous.is_finite() {
                return None;
            }
            samples.push(instantaneous);
            if samples.len() < self.explicit_len {
                return None;
            }

            let count = samples.len();
            let mean = samples.iter().map(|&s| s as f64).sum::<f64>() / count as f64;
            let baseline = mean as f32 + EPSILON;
            self.baseline = Some(baseline);
            self.explicit_samples = None;
            self.warmup_ticks = 0;
            return Some(CalibrationEvent::ExplicitCompleted {
                baseline,
                samples: count,
            });
        }

        if self.baseline.is_none() && is_playing && smoothed.is_finite() {
            self.warmup_ticks += 1;
            if self.warmup_ticks > self.warmup_threshold {
                self.baseline = Some(smoothed);
                self.warmup_ticks = 0;
                return Some(CalibrationEvent::WarmupCompleted { baseline: smoothed });
            }
        }

        None
    }

    /// Drop the baseline and any progress, including an in-flight run
    pub fn reset(&mut self) {
        self.baseline = None;
        self.warmup_ticks = 0;
        self.explicit_samples = None;
    }
}

impl Default for BaselineCalibrator {
    fn default() -> Self {
        Self::new()
    }
}
