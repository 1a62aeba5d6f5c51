// SPDX-License-Identifier: GPL-3.0-only

use arfuse::constants::build_info;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "arfuse")]
#[command(about = "Differential AR compositor for depth-camera feeds")]
#[command(version = build_info::version())]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render the synthetic demo scene and write image dumps
    Run {
        /// Number of frames to render
        #[arg(short = 'n', long, default_value = "30")]
        frames: u32,

        /// Render width in pixels
        #[arg(long, default_value = "640")]
        width: u32,

        /// Render height in pixels
        #[arg(long, default_value = "480")]
        height: u32,

        /// Output directory (default: ./arfuse-out)
        #[arg(short, long)]
        out_dir: Option<PathBuf>,

        /// Pipeline configuration JSON; built-in defaults when absent
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Also dump the filtered depth buffer as raw f32 data
        #[arg(long)]
        dump_raw: bool,

        /// Acquire sensor frames on a background loop instead of inline
        #[arg(short, long)]
        background: bool,
    },

    /// Print the effective configuration as JSON
    Info {
        /// Pipeline configuration JSON to load first
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=arfuse=debug, RUST_LOG=info
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
        Commands::Run {
            frames,
            width,
            height,
            out_dir,
            config,
            dump_raw,
            background,
        } => cli::run_demo(cli::RunOptions {
            frames,
            width,
            height,
            out_dir,
            config,
            dump_raw,
            background,
        }),
        Commands::Info { config } => cli::print_info(config),
    }
}
