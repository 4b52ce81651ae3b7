/// Simulator configuration
use crate::error::{Result, SimError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "autovolume.toml";

/// Playing time before a stream's baseline is learned automatically
pub const WARMUP_SECS: f32 = 1.0;

/// Length of an explicit calibration run
pub const CALIBRATION_SECS: f32 = 1.2;

/// Prefix for environment overrides (`AUTOVOLUME_TICK_RATE_HZ=30`)
pub const ENV_PREFIX: &str = "AUTOVOLUME";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimConfig {
    /// Audio sample rate of the simulated streams
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Host tick rate (render cadence)
    #[serde(default = "default_tick_rate_hz")]
    pub tick_rate_hz: u32,

    /// Analysis window handed to the engine each tick
    #[serde(default = "default_block_size")]
    pub block_size: usize,

    /// Number of concurrent streams
    #[serde(default = "default_streams")]
    pub streams: usize,

    /// Where engine settings are persisted
    #[serde(default = "default_settings_path")]
    pub settings_path: PathBuf,

    /// Program played on every stream
    #[serde(default = "default_program")]
    pub program: Vec<Segment>,
}

/// A stretch of constant-level material
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Segment {
    pub label: String,

    /// Peak amplitude of the tone (0.0-1.0)
    pub amplitude: f32,

    pub seconds: f32,

    /// Paused segments render silence and do not advance warm-up
    #[serde(default = "default_playing")]
    pub playing: bool,
}

impl Segment {
    pub fn new(label: impl Into<String>, amplitude: f32, seconds: f32) -> Self {
        Self {
            label: label.into(),
            amplitude,
            seconds,
            playing: true,
        }
    }

    pub fn paused(label: impl Into<String>, seconds: f32) -> Self {
        Self {
            label: label.into(),
            amplitude: 0.0,
            seconds,
            playing: false,
        }
    }
}

fn default_sample_rate() -> u32 {
    48000
}

fn default_tick_rate_hz() -> u32 {
    60
}

fn default_block_size() -> usize {
    2048
}

fn default_streams() -> usize {
    1
}

fn default_settings_path() -> PathBuf {
    PathBuf::from("autovolume-settings.json")
}

fn default_playing() -> bool {
    true
}

fn default_program() -> Vec<Segment> {
    vec![
        Segment::new("dialogue", 0.1, 4.0),
        Segment::new("advert", 0.5, 3.0),
        Segment::paused("pause", 1.0),
        Segment::new("whisper", 0.02, 3.0),
        Segment::new("dialogue", 0.1, 3.0),
    ]
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            tick_rate_hz: default_tick_rate_hz(),
            block_size: default_block_size(),
            streams: default_streams(),
            settings_path: default_settings_path(),
            program: default_program(),
        }
    }
}

impl SimConfig {
    /// Load configuration from file and environment
    ///
    /// `path` overrides the default `autovolume.toml`; a missing default file
    /// is fine, a missing explicit one is not.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = config::Config::builder();

        settings = match path {
            Some(path) => settings.add_source(config::File::from(path).required(true)),
            None => settings
                .add_source(config::File::with_name(DEFAULT_CONFIG_FILE).required(false)),
        };

        // Override with environment variables (prefixed with AUTOVOLUME_)
        settings = settings.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = settings.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(SimError::Config("sample_rate must be positive".to_string()));
        }
        if self.tick_rate_hz == 0 {
            return Err(SimError::Config("tick_rate_hz must be positive".to_string()));
        }
        if self.block_size == 0 {
            return Err(SimError::Config("block_size must be positive".to_string()));
        }
        if self.program.is_empty() {
            return Err(SimError::Config("program has no segments".to_string()));
        }
        if let Some(segment) = self
            .program
            .iter()
            .find(|s| {
                !(0.0..=1.0).contains(&s.amplitude) || !s.seconds.is_finite() || s.seconds < 0.0
            })
        {
            return Err(SimError::Config(format!(
                "segment '{}' needs amplitude in 0..=1 and a finite, non-negative duration",
                segment.label
            )));
        }
        Ok(())
    }

    /// Audio frames rendered per tick
    pub fn frames_per_tick(&self) -> usize {
        (self.sample_rate / self.tick_rate_hz).max(1) as usize
    }

    /// Ticks covering `seconds`
    pub fn ticks_for(&self, seconds: f32) -> usize {
        (seconds * self.tick_rate_hz as f32).round() as usize
    }

    /// Warm-up and explicit calibration windows, in ticks, at this tick rate
    pub fn calibration_windows(&self) -> (u32, usize) {
        let warmup = self.ticks_for(WARMUP_SECS).max(1) as u32;
        (warmup, self.ticks_for(CALIBRATION_SECS).max(1))
    }
}
