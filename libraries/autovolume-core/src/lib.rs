//! Adaptive loudness levelling for concurrently playing streams
//!
//! This crate provides:
//! - Short-term energy tracking (block RMS + exponential smoothing)
//! - Per-stream baseline calibration (automatic warm-up or explicit sampling)
//! - A threshold / dead-zone / soft-knee gain policy
//! - Time-aware gain smoothing and ramped application to the host audio path
//! - A session table with process-wide settings and their persistence
//!
//! # Architecture
//!
//! ```text
//!                       once per tick, per stream
//! ┌─────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ Sample Block│ ──► │ Energy       │ ──► │ Calibrator   │
//! └─────────────┘     │ Estimator    │     │ (baseline)   │
//!                     └──────────────┘     └──────────────┘
//!                            │                    │
//!                            ▼                    ▼
//!                     ┌──────────────┐     ┌──────────────┐     ┌───────────┐
//!   EngineSettings ─► │ Gain Policy  │ ──► │ Gain Smoother│ ──► │ Gain Sink │
//!                     └──────────────┘     └──────────────┘     └───────────┘
//! ```
//!
//! The host owns scheduling: it calls [`StreamController::tick`] with a block,
//! a monotonic timestamp and the play state, and the controller pushes the
//! resulting gain into that stream's [`GainSink`] with a 50 ms glide.
//!
//! # Example
//!
//! ```
//! use autovolume_core::{RampedGain, StreamController, Target};
//! use std::time::{Duration, Instant};
//!
//! let mut controller = StreamController::new();
//! let handle = controller.attach("tab-3/video-0", RampedGain::new(48000, 2));
//!
//! let start = Instant::now();
//! let quiet = vec![0.05_f32; 2048];
//! for n in 0..90 {
//!     let now = start + Duration::from_millis(16 * n);
//!     controller.tick(handle, &quiet, now, true)?;
//! }
//!
//! let session = controller.session(handle).unwrap();
//! println!("baseline: {:?}, gain: {:.2}", session.baseline(), session.current_gain());
//!
//! controller.calibrate(Target::All)?;
//! # Ok::<(), autovolume_core::EngineError>(())
//! ```

#![deny(unsafe_code)]

use std::time::Duration;

mod calibration;
mod controller;
mod energy;
mod error;
mod policy;
mod session;
mod settings;
mod sink;
mod smoother;

pub use calibration::{BaselineCalibrator, CalibrationEvent, CalibrationState};
pub use controller::{StreamController, StreamInput, Target};
pub use energy::{block_rms, EnergyEstimator};
pub use error::{EngineError, Result, SinkError};
pub use policy::GainPolicy;
pub use session::{SessionHandle, SourceId, StreamSession, TickReport};
pub use settings::{
    sanitize_sensitivity, EngineSettings, JsonFileSettingsStore, MemorySettingsStore,
    SettingsStore, DEFAULT_ENABLED, DEFAULT_SENSITIVITY,
};
pub use sink::{GainSink, RampedGain};
pub use smoother::GainSmoother;

/// Lowest gain the engine ever applies (about -9 dB)
pub const MIN_GAIN: f32 = 0.35;

/// Highest gain the engine ever applies (about +4 dB)
pub const MAX_GAIN: f32 = 1.6;

/// Floor added to levels to keep divisions finite
pub const EPSILON: f32 = 1e-9;

/// Weight of the previous value in the energy smoother
pub const ENERGY_SMOOTHING: f32 = 0.92;

/// Levels below `baseline * SOFT_KNEE_RATIO` are boosted
pub const SOFT_KNEE_RATIO: f32 = 0.6;

/// Longest interval a single smoothing step honors, in seconds
pub const MAX_TICK_SECONDS: f32 = 0.1;

/// Gain smoothing rate per second (~125 ms characteristic time)
pub const SMOOTHING_RATE: f32 = 8.0;

/// Time constant of the glide sinks apply toward each new gain
pub const GAIN_RAMP_TIME_CONSTANT: Duration = Duration::from_millis(50);

/// Warm-up completes on the first playing tick after this many
/// (~1 s at 60 ticks per second)
pub const WARMUP_TICKS: u32 = 60;

/// Blocks averaged by an explicit calibration (~1.2 s at 60 ticks per second)
pub const CALIBRATION_TICKS: usize = 72;
