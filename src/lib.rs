//! `logpipe`: tail a log file and turn its lines into typed JSON events.
//!
//! This library provides the line parser, type inference, and the two
//! workers behind the `logpipe` CLI: a [`PipelineWorker`] that follows a
//! file and parses each line, and a [`SinkWorker`] that appends the
//! resulting events to a JSON-lines file. The two are connected by a
//! bounded [`flume`] queue.
//!
//! # Example
//!
//! ```
//! use logpipe::{Value, parser::{FieldRules, LineParser}};
//!
//! let pattern = r"^(?P<ip>\S+) (?P<method>\S+) (?P<uri>\S+) (?P<status>\d+)$";
//! let parser = LineParser::with_rules(pattern, FieldRules::default()).unwrap();
//!
//! let event = parser.parse("10.0.0.1 GET /search?q=5&lang=en 200").unwrap();
//! assert_eq!(event.get("status"), Some(&Value::Integer(200)));
//! assert_eq!(event.get("q"), Some(&Value::Integer(5)));
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod event;
pub mod infer;
pub mod keys;
pub mod logging;
pub mod parser;
pub mod pipeline;
pub mod query;
pub mod sink;
pub mod tail;

// Re-export primary API types for convenience.
pub use config::{Config, OutputPath};
pub use error::LogpipeError;
pub use event::{Event, Timestamp, Value};
pub use infer::infer;
pub use keys::unique_name;
pub use parser::LineParser;
pub use pipeline::{PipelineHandle, PipelineWorker};
pub use sink::{FileSink, Sink, SinkHandle, SinkWorker};
pub use tail::{StopHandle, TailOptions, Tailer};
