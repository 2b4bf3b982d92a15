//! fsroute demo server.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────┐
//!                        │                    fsroute                    │
//!   routes root ─────────┼─▶ collector ─▶ path mapper ─▶ module loader  │
//!   (files on disk)      │                                    │          │
//!                        │                manifest ───────────┘          │
//!                        │                                    ▼          │
//!                        │                              registrar        │
//!                        │                                    │          │
//!   Client Request ──────┼─▶ trace ─▶ request id ─▶ cors ─▶ limits       │
//!                        │     ─▶ cookies ─▶ middleware ─▶ axum Router   │
//!                        │                                    │          │
//!   Client Response ◀────┼──────── result interpreter ◀─── handler      │
//!                        └──────────────────────────────────────────────┘
//! ```

#[path = "../demos/app.rs"]
mod demos;

use std::path::PathBuf;

use clap::Parser;

use fsroute::config::{load_config, AppConfig, Mode};
use fsroute::lifecycle;
use fsroute::middleware::MiddlewareMap;
use fsroute::observability::logging;

#[derive(Parser)]
#[command(name = "fsroute")]
#[command(about = "Serve a file-system routed application", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "fsroute.toml")]
    config: PathBuf,

    /// Override the configured mode
    #[arg(short, long)]
    mode: Option<Mode>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = if cli.config.exists() {
        load_config(&cli.config)?
    } else {
        AppConfig::default()
    };
    if let Some(mode) = cli.mode {
        config.mode = mode;
    }

    if let Err(e) = logging::init_logging(&config.observability) {
        eprintln!("Failed to initialize logging: {e}");
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        mode = ?config.mode,
        routes_root = %config.routes.root,
        "fsroute starting"
    );

    lifecycle::start(config, demos::manifest(), MiddlewareMap::new()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
