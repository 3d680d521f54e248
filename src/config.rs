//! Configuration management with TOML file support.
//!
//! Merges settings from three sources (highest precedence first):
//! 1. CLI flags
//! 2. Config file (`~/.config/logpipe/config.toml` or `$XDG_CONFIG_HOME/logpipe/config.toml`)
//! 3. Built-in defaults
//!
//! The resulting [`Config`] is immutable once built, except for the output
//! path, which lives in a shared [`OutputPath`] handle so it can be changed
//! while the sink is running.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde::Deserialize;

use crate::cli::Cli;
use crate::error::LogpipeError;
use crate::parser::FieldRules;
use crate::tail::TailOptions;

/// Default line pattern: the nginx/Apache "combined" access log format.
pub const DEFAULT_PATTERN: &str = concat!(
    r#"^(?P<remote_addr>\S+) \S+ (?P<remote_user>\S+) \[(?P<time_local>[^\]]+)\] "#,
    r#""(?P<method>\S+) (?P<uri>\S+) (?P<protocol>[^"]*)" "#,
    r#"(?P<status>\d{3}) (?P<body_bytes_sent>\d+|-)"#,
    r#"(?: "(?P<http_referer>[^"]*)" "(?P<http_user_agent>[^"]*)")?$"#,
);

/// Default output file, relative to the working directory.
pub const DEFAULT_OUTPUT: &str = "output.jsonl";

/// Default bound of the queue between the pipeline and the sink.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Shared, live-updatable output file path.
///
/// Clones refer to the same path; the sink re-reads it before every write.
#[derive(Debug, Clone)]
pub struct OutputPath(Arc<RwLock<PathBuf>>);

impl OutputPath {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(Arc::new(RwLock::new(path.into())))
    }

    pub fn get(&self) -> PathBuf {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Point every holder of this handle at a new file.
    pub fn set(&self, path: impl Into<PathBuf>) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = path.into();
    }
}

/// Runtime configuration merged from defaults, config file, and CLI arguments.
///
/// Use [`Config::from_cli`] to build from parsed CLI arguments, or
/// [`Config::default`] for built-in defaults (useful in tests and benchmarks).
#[derive(Debug, Clone)]
pub struct Config {
    /// Regular expression with named capture groups, one group per field.
    pub pattern: String,
    /// Field names dropped from every event.
    pub keys_to_ignore: HashSet<String>,
    /// Time formats (strptime syntax) tried before the built-in fallbacks.
    pub time_patterns: Vec<String>,
    /// Tailing behavior.
    pub tail: TailOptions,
    /// Where the sink appends events.
    pub output: OutputPath,
    /// Bound of the pipeline → sink queue.
    pub queue_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pattern: DEFAULT_PATTERN.to_string(),
            keys_to_ignore: HashSet::new(),
            time_patterns: Vec::new(),
            tail: TailOptions::default(),
            output: OutputPath::new(DEFAULT_OUTPUT),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl Config {
    /// Build a [`Config`] from CLI arguments, loading the config file if present.
    ///
    /// Merge precedence: CLI flags > config file > defaults.
    pub fn from_cli(cli: &Cli) -> Result<Self, LogpipeError> {
        let mut config = Self::default();

        // An explicit --config must exist; the default location is optional.
        match cli.config {
            Some(ref path) => config.apply_file_config(FileConfig::load(path)?),
            None => {
                let path = Self::default_config_path();
                if path.exists() {
                    config.apply_file_config(FileConfig::load(&path)?);
                }
            }
        }

        // CLI overrides
        if let Some(ref pattern) = cli.pattern {
            config.pattern.clone_from(pattern);
        }
        if let Some(ref ignore) = cli.ignore {
            config.keys_to_ignore = ignore.iter().cloned().collect();
        }
        if !cli.time_pattern.is_empty() {
            config.time_patterns.clone_from(&cli.time_pattern);
        }
        if let Some(ref output) = cli.output {
            config.output = OutputPath::new(output.clone());
        }
        if cli.from_beginning {
            config.tail.from_beginning = true;
        }
        if cli.reopen {
            config.tail.reopen = true;
        }
        if let Some(ms) = cli.poll_interval_ms {
            config.tail.poll_interval = Duration::from_millis(ms);
        }
        if let Some(capacity) = cli.queue_capacity {
            config.queue_capacity = capacity;
        }

        config.validate()?;
        Ok(config)
    }

    /// The field rules the line parser applies.
    pub fn field_rules(&self) -> FieldRules {
        FieldRules {
            keys_to_ignore: self.keys_to_ignore.clone(),
            time_patterns: self.time_patterns.clone(),
        }
    }

    fn validate(&self) -> Result<(), LogpipeError> {
        if self.queue_capacity == 0 {
            return Err(LogpipeError::Config(
                "queue capacity must be at least 1".to_string(),
            ));
        }
        if self.tail.poll_interval.is_zero() {
            return Err(LogpipeError::Config(
                "poll interval must be at least 1ms".to_string(),
            ));
        }
        Ok(())
    }

    /// Default config file path: `$XDG_CONFIG_HOME/logpipe/config.toml` or `~/.config/logpipe/config.toml`.
    fn default_config_path() -> PathBuf {
        if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(xdg).join("logpipe").join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("logpipe")
                .join("config.toml")
        } else {
            PathBuf::from(".config/logpipe/config.toml")
        }
    }

    /// Apply settings from a parsed config file.
    fn apply_file_config(&mut self, file: FileConfig) {
        if let Some(pattern) = file.pattern {
            self.pattern = pattern;
        }
        if let Some(keys) = file.keys_to_ignore {
            self.keys_to_ignore = keys.into_iter().collect();
        }
        if let Some(patterns) = file.time_patterns {
            self.time_patterns = patterns;
        }

        if let Some(tail) = file.tail {
            if let Some(from_beginning) = tail.from_beginning {
                self.tail.from_beginning = from_beginning;
            }
            if let Some(reopen) = tail.reopen {
                self.tail.reopen = reopen;
            }
            if let Some(ms) = tail.poll_interval_ms {
                self.tail.poll_interval = Duration::from_millis(ms);
            }
        }

        if let Some(output) = file.file.and_then(|f| f.output) {
            self.output = OutputPath::new(output);
        }

        if let Some(capacity) = file.queue.and_then(|q| q.capacity) {
            self.queue_capacity = capacity;
        }
    }
}

/// Config file structure (TOML deserialization).
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    pattern: Option<String>,
    keys_to_ignore: Option<Vec<String>>,
    time_patterns: Option<Vec<String>>,
    tail: Option<TailFileConfig>,
    file: Option<OutputFileConfig>,
    queue: Option<QueueFileConfig>,
}

#[derive(Debug, Deserialize)]
struct TailFileConfig {
    from_beginning: Option<bool>,
    reopen: Option<bool>,
    poll_interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct OutputFileConfig {
    output: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct QueueFileConfig {
    capacity: Option<usize>,
}

impl FileConfig {
    fn load(path: &Path) -> Result<Self, LogpipeError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            LogpipeError::Config(format!("cannot read config file {}: {e}", path.display()))
        })?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }
}
