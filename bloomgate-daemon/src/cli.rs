//! CLI argument definitions for bloomgate-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// Bloomgate bridge daemon.
///
/// Subscribes to threat indicators on the bus and forwards the values
/// of allow-listed point patterns into a probabilistic sink.
#[derive(Parser, Debug)]
#[command(name = "bloomgate-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to bloomgate.toml configuration file.
    #[arg(short, long, default_value = "/etc/bloomgate/bloomgate.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate configuration file and exit without starting the daemon.
    #[arg(long)]
    pub validate: bool,
}
