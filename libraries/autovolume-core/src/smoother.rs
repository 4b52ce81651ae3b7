//! Gain smoothing
//!
//! First-order low pass on the applied gain. The step size depends on the
//! measured time between ticks, not on the tick count, so the response is the
//! same at 30 Hz and 144 Hz. Long stalls are clamped so a backgrounded host
//! cannot cause a jump on its next tick.

use std::time::Duration;

use crate::{MAX_GAIN, MAX_TICK_SECONDS, MIN_GAIN, SMOOTHING_RATE};

/// Time-aware gain smoother
#[derive(Debug, Clone)]
pub struct GainSmoother {
    gain: f32,
    /// Per-second rate constant (8.0 = ~125 ms characteristic time)
    rate: f32,
    /// Longest interval honored for a single step, in seconds
    max_step: f32,
}

impl GainSmoother {
    /// Create a smoother at unity gain with the default rate
    pub fn new() -> Self {
        Self::with_rate(SMOOTHING_RATE)
    }

    /// Create a smoother at unity gain with a custom rate constant (per second)
    pub fn with_rate(rate: f32) -> Self {
        Self {
            gain: 1.0,
            rate: rate.max(0.0),
            max_step: MAX_TICK_SECONDS,
        }
    }

    /// Current gain
    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Interval actually used for a step of `elapsed`
    pub fn effective_elapsed(&self, elapsed: Duration) -> f32 {
        elapsed.as_secs_f32().min(self.max_step)
    }

    /// Move toward `desired` by the amount `elapsed` allows and return the new gain
    pub fn advance(&mut self, desired: f32, elapsed: Duration) -> f32 {
        let dt = self.effective_elapsed(elapsed);
        let alpha = (dt * self.rate).clamp(0.0, 1.0);

        self.gain = self.gain * (1.0 - alpha) + desired * alpha;
        self.gain = self.gain.clamp(MIN_GAIN, MAX_GAIN);
        self.gain
    }

    /// Jump straight to unity gain
    ///
    /// Only for reset/deactivation; the sink ramp hides the discontinuity.
    pub fn snap_to_unity(&mut self) {
        self.gain = 1.0;
    }
}

impl Default for GainSmoother {
    fn default() -> Self {
        Self::new()
    }
}
