#![deny(missing_docs)]
//! Logging setup shared by the ingest workspace.
//!
//! The library crates log through the `log` facade; this crate wires that
//! facade to `simplelog` terminal and file writers for the CLI, and offers
//! a safe no-op initializer for tests.

use std::fs::File;
use std::path::Path;

use log::LevelFilter;
use simplelog::{
    ColorChoice, CombinedLogger, Config, ConfigBuilder, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};

/// Destination for log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogDestination {
    /// Terminal only.
    Terminal,
    /// `ingest.log` in the current working directory.
    File,
    /// Both terminal and file.
    Both,
}

/// Initialize the global logger at the given level and destination.
///
/// Safe to call more than once; later calls are ignored. A file logger
/// that cannot be created is dropped with a warning on stderr rather than
/// failing startup.
pub fn initialize(destination: LogDestination, level: LevelFilter) {
    let config = build_config();

    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();
    if matches!(destination, LogDestination::Terminal | LogDestination::Both) {
        loggers.push(TermLogger::new(
            level,
            config.clone(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        ));
    }
    if matches!(destination, LogDestination::File | LogDestination::Both) {
        let path = Path::new("./ingest.log");
        match File::create(path) {
            Ok(file) => loggers.push(WriteLogger::new(level, config.clone(), file)),
            Err(err) => eprintln!("warning: could not create log file {path:?}: {err}"),
        }
    }

    if !loggers.is_empty() {
        let _ = CombinedLogger::init(loggers);
    }
}

/// Terminal logger for integration tests; no-ops if a logger is already set.
pub fn initialize_for_tests() {
    let level = if cfg!(debug_assertions) {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let _ = CombinedLogger::init(vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )]);
}

fn build_config() -> Config {
    ConfigBuilder::new()
        .set_time_format_rfc3339()
        .set_target_level(LevelFilter::Error)
        .build()
}
