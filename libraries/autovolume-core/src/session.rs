//! Per-stream levelling session
//!
//! One session per attached media source. It owns the whole control loop for
//! that stream (estimator, calibrator, policy, smoother) plus the host sink
//! the resulting gain is pushed to. Sessions share nothing mutable with each
//! other; the only shared input is the settings snapshot passed into
//! [`StreamSession::tick`].

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::calibration::{BaselineCalibrator, CalibrationEvent, CalibrationState};
use crate::energy::EnergyEstimator;
use crate::policy::GainPolicy;
use crate::settings::EngineSettings;
use crate::sink::GainSink;
use crate::smoother::GainSmoother;
use crate::GAIN_RAMP_TIME_CONSTANT;

/// Host-side identifier of a media source
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    /// Create a new source ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SourceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SourceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Handle to a session in a [`StreamController`](crate::StreamController)
///
/// Handles are generational: once a session is detached its handle stays
/// invalid even if the slot is reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

/// What one tick did
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    /// Instantaneous RMS of the block
    pub rms: f32,
    /// Smoothed level after this block
    pub smoothed_energy: f32,
    /// Gain the policy asked for
    pub desired_gain: f32,
    /// Smoothed gain after this tick
    pub gain: f32,
    /// Whether the sink accepted the gain
    pub applied: bool,
    /// Calibration that completed on this tick, if any
    pub calibration: Option<CalibrationEvent>,
}

/// Levelling state of one media source
pub struct StreamSession<S> {
    source: SourceId,
    estimator: EnergyEstimator,
    calibrator: BaselineCalibrator,
    policy: GainPolicy,
    smoother: GainSmoother,
    sink: S,
    last_tick: Option<Instant>,
    active: bool,
}

impl<S: GainSink> StreamSession<S> {
    /// Create an active, uncalibrated session at unity gain
    pub fn new(source: SourceId, sink: S) -> Self {
        Self {
            source,
            estimator: EnergyEstimator::new(),
            calibrator: BaselineCalibrator::new(),
            policy: GainPolicy::new(),
            smoother: GainSmoother::new(),
            sink,
            last_tick: None,
            active: true,
        }
    }

    /// Replace the calibrator (e.g. with windows sized for another tick rate)
    pub fn with_calibrator(mut self, calibrator: BaselineCalibrator) -> Self {
        self.calibrator = calibrator;
        self
    }

    /// Source this session levels
    pub fn source(&self) -> &SourceId {
        &self.source
    }

    /// Smoothed level, `None` before the first block
    pub fn smoothed_energy(&self) -> Option<f32> {
        self.estimator
            .has_input()
            .then(|| self.estimator.smoothed())
    }

    /// Learned baseline
    pub fn baseline(&self) -> Option<f32> {
        self.calibrator.baseline()
    }

    /// Whether a baseline has been learned
    pub fn is_calibrated(&self) -> bool {
        self.calibrator.is_calibrated()
    }

    /// Calibration lifecycle state
    pub fn calibration_state(&self) -> CalibrationState {
        self.calibrator.state()
    }

    /// Calibrator (for progress inspection)
    pub fn calibrator(&self) -> &BaselineCalibrator {
        &self.calibrator
    }

    /// Smoothed gain last sent to the sink
    pub fn current_gain(&self) -> f32 {
        self.smoother.gain()
    }

    /// Whether the session still ticks
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Timestamp of the previous tick
    pub fn last_tick(&self) -> Option<Instant> {
        self.last_tick
    }

    /// Sink this session drives
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Mutable access to the sink (e.g. to render audio through it)
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Give back the sink
    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Run one update: energy, calibration, policy, smoothing, apply
    ///
    /// Returns `None` without touching any state when the session is inactive.
    pub fn tick(
        &mut self,
        samples: &[f32],
        now: Instant,
        is_playing: bool,
        settings: EngineSettings,
    ) -> Option<TickReport> {
        if !self.active {
            return None;
        }

        let smoothed = self.estimator.update(samples);
        let rms = self.estimator.last_rms();

        let calibration = self.calibrator.step(smoothed, rms, is_playing);
        if let Some(event) = calibration {
            debug!(
                source = %self.source,
                baseline = event.baseline(),
                "Baseline calibrated: {:?}",
                event
            );
        }

        let desired_gain = self
            .policy
            .target_gain(smoothed, self.calibrator.baseline(), settings);

        let elapsed = self
            .last_tick
            .map_or(Duration::ZERO, |last| now.saturating_duration_since(last));
        self.last_tick = Some(now);

        let gain = self.smoother.advance(desired_gain, elapsed);
        let applied = self.apply(gain);

        trace!(
            source = %self.source,
            rms,
            smoothed,
            desired_gain,
            gain,
            applied,
            "tick"
        );

        Some(TickReport {
            rms,
            smoothed_energy: smoothed,
            desired_gain,
            gain,
            applied,
            calibration,
        })
    }

    /// Arm explicit calibration; `false` if a run is already in flight
    pub fn begin_calibration(&mut self) -> bool {
        let started = self.calibrator.begin_explicit();
        if started {
            debug!(source = %self.source, "Explicit calibration started");
        } else {
            debug!(source = %self.source, "Calibration already running, request ignored");
        }
        started
    }

    /// Forget the baseline and any calibration in flight, return to unity gain
    pub fn reset(&mut self) {
        self.calibrator.reset();
        self.smoother.snap_to_unity();
        self.apply(1.0);
    }

    /// Drive the sink to unity and stop ticking
    pub fn deactivate(&mut self) {
        if !self.active {
            return;
        }

        self.smoother.snap_to_unity();
        if !self.apply(1.0) && self.sink.set_target(1.0, GAIN_RAMP_TIME_CONSTANT).is_err() {
            warn!(source = %self.source, "Could not restore unity gain before deactivating");
        }
        self.active = false;
    }

    /// Push a gain to the sink, with one resume attempt on failure
    fn apply(&mut self, gain: f32) -> bool {
        match self.sink.set_target(gain, GAIN_RAMP_TIME_CONSTANT) {
            Ok(()) => true,
            Err(e) => {
                debug!(source = %self.source, "Gain update skipped: {}", e);
                if let Err(e) = self.sink.resume() {
                    warn!(source = %self.source, "Failed to resume audio output: {}", e);
                }
                false
            }
        }
    }
}

impl<S> fmt::Debug for StreamSession<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSession")
            .field("source", &self.source)
            .field("smoothed_energy", &self.estimator.smoothed())
            .field("calibration", &self.calibrator.state())
            .field("baseline", &self.calibrator.baseline())
            .field("gain", &self.smoother.gain())
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}
