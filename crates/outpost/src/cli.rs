//! Command-line interface for the Outpost world server.

use clap::{Arg, ArgAction, Command};
use std::path::PathBuf;

/// Command line arguments. Anything set here overrides the configuration file.
#[derive(Debug, Clone)]
pub struct CliArgs {
    /// Path to the configuration file
    pub config_path: PathBuf,
    /// Optional world seed file (TOML or JSON) replacing the configured one
    pub seed_path: Option<PathBuf>,
    /// Optional path the final world snapshot is written to on shutdown
    pub snapshot_path: Option<PathBuf>,
    /// Optional override for log level
    pub log_level: Option<String>,
    /// Whether to force JSON log output
    pub json_logs: bool,
}

impl CliArgs {
    pub fn parse() -> Self {
        Self::from_matches(Self::command().get_matches())
    }

    fn command() -> Command {
        Command::new("Outpost World Server")
            .version(env!("CARGO_PKG_VERSION"))
            .about("Authoritative world simulation for the Outpost survival game")
            .arg(
                Arg::new("config")
                    .short('c')
                    .long("config")
                    .value_name("FILE")
                    .help("Configuration file path")
                    .default_value("config.toml"),
            )
            .arg(
                Arg::new("seed")
                    .short('s')
                    .long("seed")
                    .value_name("FILE")
                    .help("World seed file (.toml or .json), defaults to the outbreak map"),
            )
            .arg(
                Arg::new("snapshot")
                    .long("snapshot")
                    .value_name("FILE")
                    .help("Write a JSON snapshot of the world here on shutdown"),
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
                    .action(ArgAction::SetTrue),
            )
    }

    fn from_matches(matches: clap::ArgMatches) -> Self {
        Self {
            config_path: matches
                .get_one::<String>("config")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("config.toml")),
            seed_path: matches.get_one::<String>("seed").map(PathBuf::from),
            snapshot_path: matches.get_one::<String>("snapshot").map(PathBuf::from),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
        }
    }
}
