//! Rover Backend - Main Entry Point

use std::path::PathBuf;

use api::{init_logging, run_server, RoverConfig};
use clap::Parser;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "rover-backend", version, about = "Spray rover control backend")]
struct Args {
    /// Configuration file (defaults to ./rover.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overrides server.bind
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = RoverConfig::load(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.server.bind = bind;
        config.validate()?;
    }

    init_logging(&config.logging);

    info!("=== Rover Backend v{} ===", env!("CARGO_PKG_VERSION"));
    info!(
        "Hardware: {:?}, camera: {:?}, model: {:?}",
        config.hardware.backend, config.camera.source, config.detector.model_path
    );

    run_server(config).await?;

    Ok(())
}
