// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! mnemo - a memory-augmented conversational service.
//!
//! Binary entry point: parses the CLI, loads and validates configuration,
//! and starts the service. Exits non-zero on startup validation failure.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

mod serve;

/// mnemo - a memory-augmented conversational service.
#[derive(Parser, Debug)]
#[command(name = "mnemo", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the mnemo service.
    Serve {
        /// Path to a mnemo.toml config file (default: XDG hierarchy + env).
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config } => {
            let config = match config {
                Some(path) => mnemo_config::load_config_from_path(&path),
                None => mnemo_config::load_config(),
            };
            let config = match config {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("error: failed to load configuration:\n{e}");
                    return ExitCode::FAILURE;
                }
            };

            let mut builder = tokio::runtime::Builder::new_multi_thread();
            builder.enable_all();
            if let Some(workers) = config.service.workers {
                builder.worker_threads(workers.max(1));
            }
            let runtime = match builder.build() {
                Ok(runtime) => runtime,
                Err(e) => {
                    eprintln!("error: failed to start runtime: {e}");
                    return ExitCode::FAILURE;
                }
            };

            match runtime.block_on(serve::run_serve(config)) {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    eprintln!("error: {e}");
                    ExitCode::FAILURE
                }
            }
        }
    }
}
