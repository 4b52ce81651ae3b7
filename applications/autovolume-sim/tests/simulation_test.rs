//! End-to-end runs of the simulator against the levelling engine

use autovolume_core::{JsonFileSettingsStore, RampedGain, StreamController};
use autovolume_sim::{run, Segment, SegmentReport, SimConfig, SimulationOptions};

fn report<'a>(reports: &'a [SegmentReport], stream: &str, label: &str) -> &'a SegmentReport {
    reports
        .iter()
        .find(|r| r.stream == stream && r.label == label)
        .unwrap_or_else(|| panic!("no report for {} / {}", stream, label))
}

#[test]
fn test_default_program_is_levelled() {
    let config = SimConfig::default();
    let mut controller = StreamController::<RampedGain>::new();

    let reports = run(&config, &mut controller, SimulationOptions::default()).unwrap();
    assert_eq!(reports.len(), config.program.len());

    let dialogue = report(&reports, "stream-0", "dialogue");
    assert!((dialogue.level_ratio() - 1.0).abs() < 0.02);

    let advert = report(&reports, "stream-0", "advert");
    assert!(advert.level_ratio() < 0.5, "advert ratio {}", advert.level_ratio());
    assert!((advert.final_gain - 0.35).abs() < 0.01);

    let whisper = report(&reports, "stream-0", "whisper");
    assert!(whisper.level_ratio() > 1.4, "whisper ratio {}", whisper.level_ratio());

    // Streams are detached when the run ends
    assert!(controller.is_empty());
}

#[test]
fn test_disabled_run_leaves_levels_alone() {
    let config = SimConfig::default();
    let mut controller = StreamController::<RampedGain>::new();
    controller.set_enabled(false);

    let reports = run(&config, &mut controller, SimulationOptions::default()).unwrap();

    for r in reports.iter().filter(|r| r.input_rms > 0.0) {
        assert!(
            (r.level_ratio() - 1.0).abs() < 1e-3,
            "{} ratio {}",
            r.label,
            r.level_ratio()
        );
    }
}

#[test]
fn test_explicit_calibration_sets_baseline() {
    let config = SimConfig::default();
    let mut controller = StreamController::<RampedGain>::new();
    let options = SimulationOptions {
        calibrate_at_secs: Some(0.5),
    };

    let reports = run(&config, &mut controller, options).unwrap();

    // Mean instantaneous RMS of a 0.1 sine
    let expected = 0.1 / std::f32::consts::SQRT_2;
    let baseline = report(&reports, "stream-0", "advert").baseline.unwrap();
    assert!((baseline - expected).abs() < 1e-3, "baseline {}", baseline);
}

#[test]
fn test_multiple_streams_are_reported_separately() {
    let config = SimConfig {
        streams: 3,
        ..SimConfig::default()
    };
    let mut controller = StreamController::<RampedGain>::new();

    let reports = run(&config, &mut controller, SimulationOptions::default()).unwrap();
    assert_eq!(reports.len(), 3 * config.program.len());

    let quiet = report(&reports, "stream-0", "dialogue").baseline.unwrap();
    let loud = report(&reports, "stream-2", "dialogue").baseline.unwrap();
    assert!(loud > quiet * 1.9);

    for stream in ["stream-0", "stream-1", "stream-2"] {
        assert!(report(&reports, stream, "advert").level_ratio() < 0.6);
    }
}

#[test]
fn test_paused_segment_before_warmup_delays_baseline() {
    let config = SimConfig {
        program: vec![
            Segment::paused("intro", 2.0),
            Segment::new("speech", 0.1, 0.5),
            Segment::new("more speech", 0.1, 1.0),
        ],
        ..SimConfig::default()
    };
    let mut controller = StreamController::<RampedGain>::new();

    let reports = run(&config, &mut controller, SimulationOptions::default()).unwrap();

    assert!(report(&reports, "stream-0", "intro").baseline.is_none());
    assert!(report(&reports, "stream-0", "speech").baseline.is_none());
    assert!(report(&reports, "stream-0", "more speech").baseline.is_some());
}

#[test]
fn test_paused_segment_renders_silence() {
    let mut paused = Segment::new("muted advert", 0.5, 1.0);
    paused.playing = false;
    let config = SimConfig {
        program: vec![paused, Segment::new("speech", 0.1, 0.5)],
        ..SimConfig::default()
    };
    let mut controller = StreamController::<RampedGain>::new();

    let reports = run(&config, &mut controller, SimulationOptions::default()).unwrap();

    let muted = report(&reports, "stream-0", "muted advert");
    assert_eq!(muted.input_rms, 0.0);
    assert_eq!(muted.output_rms, 0.0);
    assert!(muted.baseline.is_none());
}

#[test]
fn test_slower_host_calibrates_on_the_same_schedule() {
    let config = SimConfig {
        tick_rate_hz: 30,
        program: vec![
            Segment::new("first second", 0.1, 0.9),
            Segment::new("after warm-up", 0.1, 0.5),
        ],
        ..SimConfig::default()
    };
    let (warmup_ticks, calibration_ticks) = config.calibration_windows();
    let mut controller = StreamController::<RampedGain>::new()
        .with_calibration_windows(warmup_ticks, calibration_ticks);

    let reports = run(&config, &mut controller, SimulationOptions::default()).unwrap();

    assert!(report(&reports, "stream-0", "first second").baseline.is_none());
    assert!(report(&reports, "stream-0", "after warm-up").baseline.is_some());
}

#[test]
fn test_persisted_settings_drive_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");

    {
        let mut controller =
            StreamController::<RampedGain>::with_store(JsonFileSettingsStore::new(&path));
        controller.set_enabled(false);
    }

    let mut controller =
        StreamController::<RampedGain>::with_store(JsonFileSettingsStore::new(&path));
    assert!(!controller.settings().enabled);

    let reports = run(&SimConfig::default(), &mut controller, SimulationOptions::default()).unwrap();
    let advert = report(&reports, "stream-0", "advert");
    assert!((advert.level_ratio() - 1.0).abs() < 1e-3);
}

#[test]
fn test_invalid_config_is_rejected() {
    let config = SimConfig {
        program: Vec::new(),
        ..SimConfig::default()
    };
    let mut controller = StreamController::<RampedGain>::new();

    assert!(run(&config, &mut controller, SimulationOptions::default()).is_err());
}
