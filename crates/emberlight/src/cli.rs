//! Command-line interface handling for the Emberlight host.
//!
//! This module provides command-line argument parsing using the `clap` crate
//! for robust argument handling.

use clap::{Arg, Command};
use std::path::PathBuf;

/// Command line arguments parsed from user input.
///
/// This structure holds all the command-line options that can be used to
/// override configuration file settings or provide runtime parameters.
#[derive(Debug, Clone)]
pub struct CliArgs {
    /// Path to the configuration file
    pub config_path: PathBuf,
    /// Optional override for log level
    pub log_level: Option<String>,
    /// Whether to force JSON log output
    pub json_logs: bool,
    /// Optional override for the engine heartbeat interval (milliseconds)
    pub tick_interval_ms: Option<u64>,
    /// Optional override for the autosave interval (seconds)
    pub autosave_interval_secs: Option<u64>,
}

impl CliArgs {
    /// Parses command line arguments using clap.
    ///
    /// Sets up the command-line interface with all available options and
    /// returns a structured representation of the parsed arguments.
    pub fn parse() -> Self {
        let matches = Command::new("Emberlight Engine")
            .version(env!("CARGO_PKG_VERSION"))
            .about("In-process game engine kernel with a dependency-ordered plugin runtime")
            .arg(
                Arg::new("config")
                    .short('c')
                    .long("config")
                    .value_name("FILE")
                    .help("Configuration file path")
                    .default_value("emberlight.toml"),
            )
            .arg(
                Arg::new("log-level")
                    .short('l')
                    .long("log-level")
                    .value_name("LEVEL")
                    .help("Log level (trace, debug, info, warn, error)"),
            )
            .arg(
                Arg::new("json-logs")
                    .long("json-logs")
                    .help("Output logs in JSON format")
                    .action(clap::ArgAction::SetTrue),
            )
            .arg(
                Arg::new("tick-interval")
                    .long("tick-interval")
                    .value_name("MILLIS")
                    .help("Engine heartbeat interval in milliseconds")
                    .value_parser(clap::value_parser!(u64)),
            )
            .arg(
                Arg::new("autosave-interval")
                    .long("autosave-interval")
                    .value_name("SECONDS")
                    .help("Autosave interval in seconds")
                    .value_parser(clap::value_parser!(u64)),
            )
            .get_matches();

        Self {
            config_path: PathBuf::from(
                matches
                    .get_one::<String>("config")
                    .expect("Default config path should always be set"),
            ),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
            tick_interval_ms: matches.get_one::<u64>("tick-interval").copied(),
            autosave_interval_secs: matches.get_one::<u64>("autosave-interval").copied(),
        }
    }
}
