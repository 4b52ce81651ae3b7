//! AutoVolume simulator
//!
//! Plays a scripted program (dialogue, adverts, pauses, whispers) on one or
//! more synthetic streams and runs them through the levelling engine exactly
//! as a media host would: one analysis window per tick, gain applied through
//! a ramped gain stage, settings persisted to a JSON file.

pub mod config;
pub mod error;
pub mod simulation;

pub use config::{Segment, SimConfig};
pub use error::{Result, SimError};
pub use simulation::{run, SegmentReport, SimulationOptions};
