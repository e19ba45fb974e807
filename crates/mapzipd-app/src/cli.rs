//! Command line interface for the daemon binary.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use mapzipd_telemetry::LogFormat;

/// Arguments accepted by the `mapzipd` binary.
#[derive(Debug, Parser)]
#[command(
    name = "mapzipd",
    about = "Watches game server map directories and mirrors bzip2 artifacts into fastdownload trees"
)]
pub struct Cli {
    /// Path to the JSON watch-rule configuration file.
    #[arg(long, value_name = "PATH", env = "MAPZIPD_CONFIG")]
    pub config: PathBuf,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormatArg::Auto)]
    pub log_format: LogFormatArg,
}

/// Log format selection exposed on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    /// Pretty in debug builds, JSON otherwise.
    Auto,
    /// Machine-readable JSON lines.
    Json,
    /// Human-readable multi-line output.
    Pretty,
}

impl LogFormatArg {
    /// Resolve the argument to a concrete logging format.
    #[must_use]
    pub const fn resolve(self) -> LogFormat {
        match self {
            Self::Auto => LogFormat::infer(),
            Self::Json => LogFormat::Json,
            Self::Pretty => LogFormat::Pretty,
        }
    }
}
