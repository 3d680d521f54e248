//! Error types for `logpipe`.
//!
//! Uses [`thiserror`] for ergonomic error derivation.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in `logpipe`.
///
/// Per-line and per-event variants ([`NoMatch`](Self::NoMatch),
/// [`Serialize`](Self::Serialize), [`Write`](Self::Write)) are recovered by
/// the workers. The binary maps [`Config`](Self::Config),
/// [`Toml`](Self::Toml) and [`PatternCompile`](Self::PatternCompile) to
/// exit 1 and the I/O variants to exit 2.
#[derive(Debug, Error)]
pub enum LogpipeError {
    /// Configuration error (invalid flag combination, unreadable config file).
    #[error("configuration error: {0}")]
    Config(String),

    /// TOML deserialization error.
    #[error("config file error: {0}")]
    Toml(#[from] toml::de::Error),

    /// I/O error outside of the source and sink paths.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The line pattern is not a valid regular expression.
    #[error("invalid line pattern: {0}")]
    PatternCompile(#[from] regex::Error),

    /// A line did not match the configured pattern.
    #[error("line did not match pattern")]
    NoMatch,

    /// The input file could not be opened when tailing started.
    #[error("cannot open input {}: {source}", path.display())]
    SourceOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An event could not be encoded as JSON.
    #[error("cannot serialize event: {0}")]
    Serialize(#[from] serde_json::Error),

    /// An event could not be written to the output file.
    #[error("cannot write to {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A worker was asked to run after it had already stopped.
    #[error("worker has already stopped and cannot be restarted")]
    AlreadyStopped,
}

impl LogpipeError {
    /// Process exit code for an error that ends the binary.
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) | Self::Toml(_) | Self::PatternCompile(_) => 1,
            _ => 2,
        }
    }
}
