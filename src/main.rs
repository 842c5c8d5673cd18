// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};

mod cli;

#[derive(Parser)]
#[command(name = "camera-stream")]
#[command(about = "Capture-to-texture streaming pipeline demo")]
#[command(version)]
#[command(subcommand_required = false)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream synthetic camera frames into a logging GPU surface
    Run {
        /// Camera device identifier
        #[arg(short, long)]
        device: Option<String>,

        /// Capture width in pixels
        #[arg(long)]
        width: Option<u32>,

        /// Capture height in pixels
        #[arg(long)]
        height: Option<u32>,

        /// Streaming duration in seconds
        #[arg(short = 't', long, default_value = "30")]
        duration: u64,
    },

    /// Show resolution presets and the configuration path
    Info,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=camera_stream=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Run {
            device,
            width,
            height,
            duration,
        }) => cli::run_preview(device, width, height, duration),
        Some(Commands::Info) => cli::show_info(),
        None => cli::run_preview(None, None, None, 30),
    }
}
