//! # STRATA Server
//!
//! Headless world host.
//!
//! ## Usage
//!
//! ```bash
//! strata_server --config strata.toml --seconds 60
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use strata::{init_logging, Engine, EngineConfig};
use tracing::{error, info};

fn print_usage() {
    println!("Usage: strata_server [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -c, --config <PATH>    TOML config file (default: built-in defaults)");
    println!("  -s, --seconds <SECS>   Run for N seconds then exit");
    println!("  -h, --help             Show this help");
}

fn main() -> ExitCode {
    // Parse command line arguments (simple parsing, no external deps)
    let args: Vec<String> = std::env::args().collect();
    let mut config_path: Option<PathBuf> = None;
    let mut seconds: Option<u64> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                config_path = args.get(i + 1).map(PathBuf::from);
                i += 1;
            }
            "--seconds" | "-s" => {
                seconds = args.get(i + 1).and_then(|s| s.parse().ok());
                i += 1;
            }
            "--help" | "-h" => {
                print_usage();
                return ExitCode::SUCCESS;
            }
            other => {
                eprintln!("unknown argument: {other}");
                print_usage();
                return ExitCode::FAILURE;
            }
        }
        i += 1;
    }

    let config = match &config_path {
        Some(path) => match EngineConfig::load(path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("{err}");
                return ExitCode::FAILURE;
            }
        },
        None => EngineConfig::default(),
    };
    init_logging(&config.logging.filter);
    info!(config = ?config_path, seconds, "starting strata server");

    let engine = match Engine::open(&config) {
        Ok(engine) => engine,
        Err(err) => {
            error!(%err, "failed to open world");
            return ExitCode::FAILURE;
        }
    };
    let world = engine.world().info();
    info!(name = %world.name, uuid = %world.uuid, seed = world.seed, "world ready");

    let result = engine.run(seconds.map(Duration::from_secs));
    engine.shutdown();
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "server stopped with an error");
            ExitCode::FAILURE
        }
    }
}
