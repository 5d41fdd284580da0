use app::{spawn_stdin_reader, Pipeline};
use clap::Parser;
use fw_config::Config;
use fw_core::telemetry;
use fw_vision::LocalizerKind;
use std::path::PathBuf;
use std::process;
use tokio::sync::mpsc;

/// Concurrent camera motion pipeline
#[derive(Debug, Parser)]
#[command(name = "framewatch", version)]
struct Args {
    /// Configuration file (defaults to ./framewatch.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the configured localizer (blob or grid)
    #[arg(long)]
    localizer: Option<LocalizerKind>,

    /// Stop after this many primary captures
    #[arg(long)]
    frames: Option<u64>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Load configuration - exit with non-zero if invalid
    let mut config = match Config::load_from(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };
    if let Some(localizer) = args.localizer {
        config.motion.localizer = localizer;
    }

    telemetry::init_tracing(&config.telemetry.environment, "framewatch");
    tracing::info!("framewatch starting");
    tracing::debug!(?config, "Configuration loaded successfully");

    let pipeline = match Pipeline::new(config) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            tracing::error!("Failed to build pipeline: {}", e);
            process::exit(1);
        }
    };

    tracing::info!("Commands: 'b' + Enter sets the background, 'q' + Enter quits");
    let (tx, rx) = mpsc::channel(8);
    spawn_stdin_reader(tx);

    match pipeline.run(args.frames, rx).await {
        Ok(summary) if summary.worker_errors.is_empty() => {
            tracing::info!(frames = summary.frames_captured, "framewatch stopped");
            // The blocking stdin read cannot be cancelled, so do not wait for runtime shutdown
            process::exit(0);
        }
        Ok(summary) => {
            for error in &summary.worker_errors {
                tracing::error!("{}", error);
            }
            process::exit(1);
        }
        Err(e) => {
            tracing::error!("Pipeline error: {}", e);
            process::exit(1);
        }
    }
}
