/// AutoVolume simulator - drive the levelling engine from the command line
use autovolume_core::{
    EngineSettings, JsonFileSettingsStore, RampedGain, SettingsStore, StreamController, Target,
};
use autovolume_sim::{run, SegmentReport, SimConfig, SimulationOptions};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "autovolume-sim")]
#[command(about = "Simulate adaptive loudness levelling on synthetic streams", long_about = None)]
struct Cli {
    /// Configuration file path (defaults to ./autovolume.toml if present)
    #[arg(short, long, global = true, env = "AUTOVOLUME_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the configured program and report levels per segment
    Run {
        /// Number of concurrent streams (overrides config)
        #[arg(short, long)]
        streams: Option<usize>,

        /// Print reports as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run the program and trigger explicit calibration part-way through
    Calibrate {
        /// When to calibrate, in seconds from the start
        #[arg(long, default_value_t = 1.0)]
        at: f32,
    },
    /// Turn levelling on or off
    SetEnabled {
        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,
    },
    /// Set the attenuation threshold multiplier (invalid values fall back to 1.0)
    SetSensitivity {
        value: String,
    },
    /// Clear persisted settings
    Reset,
    /// Show persisted settings
    Show,
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "autovolume_sim=info,autovolume_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = SimConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run { streams, json } => {
            if let Some(streams) = streams {
                config.streams = streams;
            }
            let reports = simulate(&config, SimulationOptions::default())?;
            if json {
                println!("{}", serde_json::to_string_pretty(&reports)?);
            } else {
                print_reports(&reports);
            }
        }
        Commands::Calibrate { at } => {
            let options = SimulationOptions {
                calibrate_at_secs: Some(at),
            };
            let reports = simulate(&config, options)?;
            print_reports(&reports);
        }
        Commands::SetEnabled { enabled } => {
            let mut controller = controller(&config);
            controller.set_enabled(enabled);
            print_settings(controller.settings());
        }
        Commands::SetSensitivity { value } => {
            // Unparseable input is passed through as NaN and replaced by the default
            let sensitivity = value.trim().parse::<f32>().unwrap_or(f32::NAN);
            let mut controller = controller(&config);
            controller.set_sensitivity(sensitivity);
            print_settings(controller.settings());
        }
        Commands::Reset => {
            let mut controller = controller(&config);
            controller.reset(Target::All)?;
            print_settings(controller.settings());
        }
        Commands::Show => {
            let store = JsonFileSettingsStore::new(&config.settings_path);
            print_settings(store.load()?);
        }
    }

    Ok(())
}

fn controller(config: &SimConfig) -> StreamController<RampedGain> {
    let (warmup_ticks, calibration_ticks) = config.calibration_windows();
    StreamController::with_store(JsonFileSettingsStore::new(&config.settings_path))
        .with_calibration_windows(warmup_ticks, calibration_ticks)
}

fn simulate(config: &SimConfig, options: SimulationOptions) -> anyhow::Result<Vec<SegmentReport>> {
    let mut controller = controller(config);
    tracing::info!(settings = ?controller.settings(), "Loaded settings");
    Ok(run(config, &mut controller, options)?)
}

fn print_settings(settings: EngineSettings) {
    println!("{}", settings.to_json_value());
}

fn print_reports(reports: &[SegmentReport]) {
    println!(
        "{:<10} {:<12} {:>9} {:>9} {:>7} {:>9} {:>9}",
        "stream", "segment", "in rms", "out rms", "ratio", "mean gain", "baseline"
    );
    for report in reports {
        let baseline = report
            .baseline
            .map_or_else(|| "-".to_string(), |b| format!("{:.4}", b));
        println!(
            "{:<10} {:<12} {:>9.4} {:>9.4} {:>7.2} {:>9.2} {:>9}",
            report.stream,
            report.label,
            report.input_rms,
            report.output_rms,
            report.level_ratio(),
            report.mean_gain,
            baseline
        );
    }
}
