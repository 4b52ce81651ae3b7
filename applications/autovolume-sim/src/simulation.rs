/// Drives the levelling engine the way a media host would
///
/// Each stream renders a tone whose level follows the configured program.
/// Every tick the host hands the engine the most recent analysis window,
/// then renders that tick's audio through the stream's ramped gain stage.
use crate::config::SimConfig;
use crate::error::Result;
use autovolume_core::{RampedGain, SessionHandle, SourceId, StreamController, StreamInput, Target};
use serde::Serialize;
use std::f32::consts::TAU;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Knobs for a single run
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulationOptions {
    /// Trigger explicit calibration on every stream at this point (seconds)
    pub calibrate_at_secs: Option<f32>,
}

/// Levels measured over one program segment of one stream
#[derive(Debug, Clone, Serialize)]
pub struct SegmentReport {
    pub stream: String,
    pub label: String,
    pub input_rms: f32,
    pub output_rms: f32,
    pub mean_gain: f32,
    pub final_gain: f32,
    pub baseline: Option<f32>,
}

impl SegmentReport {
    /// Output level relative to input level (1.0 = untouched)
    pub fn level_ratio(&self) -> f32 {
        if self.input_rms > 0.0 {
            self.output_rms / self.input_rms
        } else {
            1.0
        }
    }
}

struct StreamState {
    handle: SessionHandle,
    source: SourceId,
    /// Level multiplier so streams differ from each other
    scale: f32,
    frequency: f32,
    phase: f32,
    /// Most recent `block_size` input samples
    window: Vec<f32>,
    audio: Vec<f32>,
    input_energy: f64,
    output_energy: f64,
    gain_sum: f64,
    frames: usize,
    ticks: usize,
}

impl StreamState {
    fn render(&mut self, amplitude: f32, frames: usize, sample_rate: u32, block_size: usize) {
        let step = TAU * self.frequency / sample_rate as f32;
        let level = (amplitude * self.scale).min(1.0);

        self.audio.clear();
        for _ in 0..frames {
            self.audio.push(level * self.phase.sin());
            self.phase = (self.phase + step) % TAU;
        }

        self.window.extend_from_slice(&self.audio);
        if self.window.len() > block_size {
            let excess = self.window.len() - block_size;
            self.window.drain(..excess);
        }
    }

    fn take_report(&mut self, label: &str, final_gain: f32, baseline: Option<f32>) -> SegmentReport {
        let frames = self.frames.max(1) as f64;
        let report = SegmentReport {
            stream: self.source.to_string(),
            label: label.to_string(),
            input_rms: (self.input_energy / frames).sqrt() as f32,
            output_rms: (self.output_energy / frames).sqrt() as f32,
            mean_gain: if self.ticks > 0 {
                (self.gain_sum / self.ticks as f64) as f32
            } else {
                final_gain
            },
            final_gain,
            baseline,
        };

        self.input_energy = 0.0;
        self.output_energy = 0.0;
        self.gain_sum = 0.0;
        self.frames = 0;
        self.ticks = 0;
        report
    }
}

/// Run the configured program through `controller`
///
/// Streams are attached as `stream-0`, `stream-1`, ...; reports come back in
/// program order, one per stream per segment.
pub fn run(
    config: &SimConfig,
    controller: &mut StreamController<RampedGain>,
    options: SimulationOptions,
) -> Result<Vec<SegmentReport>> {
    config.validate()?;

    let frames_per_tick = config.frames_per_tick();
    let period = Duration::from_secs_f64(1.0 / config.tick_rate_hz as f64);
    let calibrate_tick = options.calibrate_at_secs.map(|secs| config.ticks_for(secs));

    let mut streams: Vec<StreamState> = (0..config.streams)
        .map(|i| {
            let source = SourceId::new(format!("stream-{}", i));
            let handle = controller.attach(source.clone(), RampedGain::new(config.sample_rate, 1));
            StreamState {
                handle,
                source,
                scale: 1.0 + 0.5 * i as f32,
                frequency: 220.0 * (i + 1) as f32,
                phase: 0.0,
                window: Vec::with_capacity(config.block_size + frames_per_tick),
                audio: Vec::with_capacity(frames_per_tick),
                input_energy: 0.0,
                output_energy: 0.0,
                gain_sum: 0.0,
                frames: 0,
                ticks: 0,
            }
        })
        .collect();

    info!(
        streams = streams.len(),
        tick_rate_hz = config.tick_rate_hz,
        block_size = config.block_size,
        "Starting simulation"
    );

    let start = Instant::now();
    let mut tick = 0usize;
    let mut reports = Vec::with_capacity(config.program.len() * streams.len());

    for segment in &config.program {
        debug!(segment = %segment.label, seconds = segment.seconds, "Segment");

        for _ in 0..config.ticks_for(segment.seconds) {
            if calibrate_tick == Some(tick) {
                let started = controller.calibrate(Target::All)?;
                info!(started, "Explicit calibration requested");
            }

            let amplitude = if segment.playing { segment.amplitude } else { 0.0 };
            for stream in &mut streams {
                stream.render(
                    amplitude,
                    frames_per_tick,
                    config.sample_rate,
                    config.block_size,
                );
            }

            let now = start + period * tick as u32;
            controller.tick_all(now, |handle, _| {
                streams
                    .iter()
                    .find(|s| s.handle == handle)
                    .map(|s| StreamInput {
                        samples: s.window.as_slice(),
                        is_playing: segment.playing,
                    })
            });

            for stream in &mut streams {
                stream.input_energy += stream.audio.iter().map(|&s| (s as f64).powi(2)).sum::<f64>();

                if let Some(sink) = controller.sink_mut(stream.handle) {
                    sink.process(&mut stream.audio);
                }
                stream.output_energy += stream.audio.iter().map(|&s| (s as f64).powi(2)).sum::<f64>();
                stream.frames += stream.audio.len();

                if let Some(session) = controller.session(stream.handle) {
                    stream.gain_sum += session.current_gain() as f64;
                }
                stream.ticks += 1;
            }

            tick += 1;
        }

        for stream in &mut streams {
            let (final_gain, baseline) = controller
                .session(stream.handle)
                .map_or((1.0, None), |s| (s.current_gain(), s.baseline()));
            let report = stream.take_report(&segment.label, final_gain, baseline);
            debug!(
                stream = %report.stream,
                segment = %report.label,
                input_rms = report.input_rms,
                output_rms = report.output_rms,
                "Segment finished"
            );
            reports.push(report);
        }
    }

    for stream in &streams {
        controller.detach(stream.handle)?;
    }

    info!(ticks = tick, "Simulation finished");
    Ok(reports)
}
