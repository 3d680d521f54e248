//! Command-line argument definitions for `logpipe`.
//!
//! Uses [`clap`] derive macros for argument parsing.

use std::path::PathBuf;

use clap::Parser;
use clap_complete::Shell;

/// Tail a log file and append its lines as typed JSON events.
///
/// Each line is matched against a regular expression with named capture
/// groups; every group becomes one field, typed as timestamp, integer,
/// boolean, float, or text. A group named `uri` also contributes its query
/// parameters as fields.
#[derive(Debug, Parser)]
#[command(name = "logpipe", version, about, long_about = None)]
pub struct Cli {
    /// Log file to follow.
    #[arg(required_unless_present = "completions")]
    pub input: Option<PathBuf>,

    /// Path to configuration file.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Line pattern with named capture groups, e.g. `^(?P<ip>\S+) (?P<status>\d+)$`.
    #[arg(short = 'p', long)]
    pub pattern: Option<String>,

    /// File that events are appended to.
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// Read the file from the start instead of only new lines.
    #[arg(short = 'b', long)]
    pub from_beginning: bool,

    /// Reopen the file when it is rotated.
    #[arg(short = 'r', long)]
    pub reopen: bool,

    /// Fields to drop from every event (comma-separated).
    #[arg(short = 'i', long, value_delimiter = ',')]
    pub ignore: Option<Vec<String>>,

    /// Extra timestamp format (strptime syntax), tried before the built-ins.
    ///
    /// May be given several times; formats are tried in order.
    #[arg(short = 't', long)]
    pub time_pattern: Vec<String>,

    /// Maximum number of events buffered between the reader and the writer.
    #[arg(long)]
    pub queue_capacity: Option<usize>,

    /// How often to poll the input for new data, in milliseconds.
    #[arg(long)]
    pub poll_interval_ms: Option<u64>,

    /// Diagnostic verbosity when `RUST_LOG` is unset.
    #[arg(short = 'l', long, default_value = "info", value_parser = parse_level_arg)]
    pub log_level: String,

    /// Print a shell completion script and exit.
    #[arg(long, value_enum)]
    pub completions: Option<Shell>,
}

/// Parse level argument as case-insensitive string.
fn parse_level_arg(s: &str) -> Result<String, String> {
    let lower = s.to_lowercase();
    match lower.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" | "off" => Ok(lower),
        _ => Err(format!(
            "invalid level '{s}': expected one of trace, debug, info, warn, error, off"
        )),
    }
}
