//! Gain application
//!
//! The engine never multiplies samples itself: it hands a target gain and a
//! ramp time constant to a [`GainSink`] owned by the host audio path. Sinks
//! must glide toward the target (exponential approach with the given time
//! constant) rather than jump, otherwise every gain update would click.

use std::time::Duration;

use crate::error::SinkError;

/// Host audio path that applies a session's gain
pub trait GainSink: Send {
    /// Start gliding toward `gain` with the given time constant
    fn set_target(&mut self, gain: f32, time_constant: Duration) -> Result<(), SinkError>;

    /// Attempt to bring a suspended output path back
    ///
    /// Called once after a failed [`set_target`](Self::set_target); the tick's
    /// update is skipped either way and retried on the next tick.
    fn resume(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

impl<S: GainSink + ?Sized> GainSink for Box<S> {
    fn set_target(&mut self, gain: f32, time_constant: Duration) -> Result<(), SinkError> {
        (**self).set_target(gain, time_constant)
    }

    fn resume(&mut self) -> Result<(), SinkError> {
        (**self).resume()
    }
}

/// Software gain stage with exponential ramping
///
/// Behaves like a `setTargetAtTime` automation: after one time constant the
/// gain has covered ~63% of the distance to its target.
///
/// # Example
///
/// ```
/// use autovolume_core::{GainSink, RampedGain};
/// use std::time::Duration;
///
/// let mut gain = RampedGain::new(48000, 2);
/// gain.set_target(0.5, Duration::from_millis(50)).unwrap();
///
/// let mut block = vec![0.8_f32; 2048];
/// gain.process(&mut block);
/// assert!(gain.current_gain() < 1.0);
/// ```
#[derive(Debug, Clone)]
pub struct RampedGain {
    sample_rate: u32,
    channels: usize,
    /// Gain applied to the most recent frame
    current: f32,
    /// Gain being approached
    target: f32,
    /// Per-frame decay toward the target
    coeff: f32,
    suspended: bool,
    closed: bool,
}

impl RampedGain {
    /// Create a unity-gain stage for interleaved audio
    pub fn new(sample_rate: u32, channels: usize) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            channels: channels.max(1),
            current: 1.0,
            target: 1.0,
            coeff: 0.0,
            suspended: false,
            closed: false,
        }
    }

    /// Gain applied to the most recent frame
    pub fn current_gain(&self) -> f32 {
        self.current
    }

    /// Gain being approached
    pub fn target_gain(&self) -> f32 {
        self.target
    }

    /// Whether the stage is suspended
    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Suspend the stage; target updates fail until [`resume`](GainSink::resume)
    pub fn suspend(&mut self) {
        self.suspended = true;
    }

    /// Tear the stage down permanently
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Apply the ramping gain to interleaved samples in place
    ///
    /// A suspended stage outputs silence and does not advance its ramp.
    pub fn process(&mut self, samples: &mut [f32]) {
        if self.suspended || self.closed {
            samples.fill(0.0);
            return;
        }

        for frame in samples.chunks_mut(self.channels) {
            self.current = self.target + (self.current - self.target) * self.coeff;
            for sample in frame.iter_mut() {
                *sample *= self.current;
            }
        }
    }
}

impl GainSink for RampedGain {
    fn set_target(&mut self, gain: f32, time_constant: Duration) -> Result<(), SinkError> {
        if self.closed {
            return Err(SinkError::Closed);
        }
        if self.suspended {
            return Err(SinkError::Suspended);
        }

        let tau_frames = time_constant.as_secs_f32() * self.sample_rate as f32;
        self.coeff = if tau_frames > 0.0 {
            (-1.0 / tau_frames).exp()
        } else {
            0.0
        };
        self.target = gain;
        Ok(())
    }

    fn resume(&mut self) -> Result<(), SinkError> {
        if self.closed {
            return Err(SinkError::Closed);
        }
        self.suspended = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TAU: Duration = Duration::from_millis(50);

    #[test]
    fn test_unity_passthrough() {
        let mut gain = RampedGain::new(48000, 2);
        let mut block = vec![0.3_f32, -0.3, 0.6, -0.6];
        gain.process(&mut block);
        assert_eq!(block, vec![0.3, -0.3, 0.6, -0.6]);
    }

    #[test]
    fn test_ramp_reaches_63_percent_after_one_time_constant() {
        let mut gain = RampedGain::new(48000, 1);
        gain.set_target(0.5, TAU).unwrap();

        // 50 ms at 48 kHz
        let mut block = vec![1.0_f32; 2400];
        gain.process(&mut block);

        let covered = (1.0 - gain.current_gain()) / 0.5;
        assert!((covered - 0.632).abs() < 0.01, "covered {}", covered);
    }

    #[test]
    fn test_ramp_has_no_jumps() {
        let mut gain = RampedGain::new(48000, 1);
        gain.set_target(0.35, TAU).unwrap();

        let mut block = vec![1.0_f32; 4800];
        gain.process(&mut block);

        let max_step = block
            .windows(2)
            .map(|w| (w[1] - w[0]).abs())
            .fold(0.0_f32, f32::max);
        // Instant set would step by 0.65 in one sample
        assert!(max_step < 0.001, "max step {}", max_step);
        assert!(block[0] < 1.0);
    }

    #[test]
    fn test_stereo_frames_share_gain() {
        let mut gain = RampedGain::new(48000, 2);
        gain.set_target(0.5, TAU).unwrap();

        let mut block = vec![1.0_f32; 256];
        gain.process(&mut block);

        for frame in block.chunks(2) {
            assert_eq!(frame[0], frame[1]);
        }
    }

    #[test]
    fn test_suspended_rejects_until_resumed() {
        let mut gain = RampedGain::new(48000, 2);
        gain.suspend();

        assert_eq!(gain.set_target(0.5, TAU), Err(SinkError::Suspended));
        let mut block = vec![0.5_f32; 4];
        gain.process(&mut block);
        assert_eq!(block, vec![0.0; 4]);

        gain.resume().unwrap();
        assert!(!gain.is_suspended());
        assert!(gain.set_target(0.5, TAU).is_ok());
        assert_eq!(gain.target_gain(), 0.5);
    }

    #[test]
    fn test_closed() {
        let mut gain = RampedGain::new(48000, 2);
        gain.close();
        assert_eq!(gain.set_target(0.5, TAU), Err(SinkError::Closed));
        assert_eq!(gain.resume(), Err(SinkError::Closed));
    }
}
