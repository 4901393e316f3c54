// SPDX-FileCopyrightText: 2026 Voxrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Voxrelay operator CLI.
//!
//! Validates configuration and drives the media tooling the relay engine
//! uses for speed changes, without joining any call.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod commands;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use voxrelay_config::RelayConfig;
use voxrelay_core::SpeedFactor;
use voxrelay_media::FfmpegReencoder;

/// Voxrelay - multi-tenant live media relay.
#[derive(Parser, Debug)]
#[command(name = "voxrelay", version, about, long_about = None)]
struct Cli {
    /// Load configuration from this file instead of the XDG hierarchy.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate configuration and print the assistant roster.
    Check,
    /// Produce (or reuse) the speed-changed copy of a media file.
    Speed {
        file: PathBuf,
        /// One of 0.5, 0.75, 1.5, 2.0.
        #[arg(long)]
        factor: SpeedFactor,
    },
    /// Print the duration of a media file.
    Probe { file: PathBuf },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => voxrelay_config::load_and_validate_path(path),
        None => voxrelay_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            voxrelay_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.relay.log_level);

    if let Err(e) = run(cli.command, &config).await {
        eprintln!("voxrelay: {e}");
        std::process::exit(1);
    }
}

async fn run(
    command: Option<Commands>,
    config: &RelayConfig,
) -> Result<(), voxrelay_core::RelayError> {
    match command {
        Some(Commands::Check) => {
            println!("voxrelay: config ok (relay.name={})", config.relay.name);
            for line in commands::roster(config) {
                println!("  {line}");
            }
        }
        Some(Commands::Speed { file, factor }) => {
            let entry = commands::run_speed(config, reencoder(config), &file, factor).await?;
            println!(
                "{} ({})",
                entry.path.display(),
                voxrelay_core::timefmt::format_clock(entry.duration_secs)
            );
        }
        Some(Commands::Probe { file }) => {
            let secs = commands::run_probe(reencoder(config), &file).await?;
            println!("{}", voxrelay_core::timefmt::format_clock(secs));
        }
        None => {
            println!("voxrelay: use --help for available commands");
        }
    }
    Ok(())
}

fn reencoder(config: &RelayConfig) -> Arc<FfmpegReencoder> {
    Arc::new(FfmpegReencoder::new(
        &config.speed.ffmpeg_path,
        &config.speed.ffprobe_path,
    ))
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("voxrelay={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();
}
