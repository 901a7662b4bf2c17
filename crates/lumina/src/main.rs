// SPDX-FileCopyrightText: 2026 Lumina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lumina - conversation control and escalation core.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod commands;
mod serve;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use lumina_config::model::LuminaConfig;

/// Lumina - conversation control and escalation core.
#[derive(Parser, Debug)]
#[command(name = "lumina", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the XDG hierarchy.
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the router, reaper, and HTTP gateway until SIGTERM/Ctrl+C.
    Serve,
    /// Run one reaper sweep and print what it did.
    Sweep,
    /// Resolve open escalations older than the threshold.
    Cleanup {
        /// Age threshold in hours.
        #[arg(long)]
        hours: u64,
    },
    /// Print escalation ledger statistics as JSON.
    Stats,
}

fn load_config(path: Option<&PathBuf>) -> LuminaConfig {
    let loaded = match path {
        Some(path) => lumina_config::load_and_validate_path(path),
        None => lumina_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => config,
        Err(errors) => {
            lumina_config::render_errors(&errors);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref());
    serve::init_tracing(&config.agent.log_level);

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::Sweep) => commands::run_sweep(&config).await,
        Some(Commands::Cleanup { hours }) => commands::run_cleanup(&config, hours).await,
        Some(Commands::Stats) => commands::run_stats(&config).await,
        None => {
            println!("lumina: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
