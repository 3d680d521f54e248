//! Regex-driven line parser.
//!
//! A [`LineParser`] applies a pattern with named capture groups to each log
//! line. Every named group becomes one field of the resulting [`Event`],
//! with its type inferred by [`crate::infer::infer`]. A group named `uri` is
//! additionally decomposed into its query parameters.

use std::collections::HashSet;

use regex::Regex;
use tracing::{debug, trace};

use crate::config::Config;
use crate::error::LogpipeError;
use crate::event::{Event, Value};
use crate::infer::infer;
use crate::keys::unique_name;
use crate::query::{self, ExpandOutcome};

/// Name of the capture group whose query string is expanded into fields.
pub const URI_FIELD: &str = "uri";

/// Field-level rules shared by the top-level fields and URI expansion.
#[derive(Debug, Clone, Default)]
pub struct FieldRules {
    /// Field names dropped from every event.
    pub keys_to_ignore: HashSet<String>,
    /// Time formats tried before the built-in fallbacks.
    pub time_patterns: Vec<String>,
}

impl FieldRules {
    /// Empty names are never stored.
    pub fn should_ignore(&self, key: &str) -> bool {
        key.is_empty() || self.keys_to_ignore.contains(key)
    }

    pub fn infer(&self, raw: &str) -> Value {
        infer(raw, &self.time_patterns)
    }
}

/// Result of [`LineParser::parse_detailed`].
#[derive(Debug)]
pub struct ParsedLine {
    pub event: Event,
    /// Outcome of `uri` expansion, if the pattern has a `uri` group.
    pub uri: Option<ExpandOutcome>,
}

/// Compiled line pattern plus field rules.
#[derive(Debug, Clone)]
pub struct LineParser {
    regex: Regex,
    rules: FieldRules,
}

impl LineParser {
    /// Compile the configured pattern.
    pub fn new(config: &Config) -> Result<Self, LogpipeError> {
        Self::with_rules(&config.pattern, config.field_rules())
    }

    pub fn with_rules(pattern: &str, rules: FieldRules) -> Result<Self, LogpipeError> {
        let regex = Regex::new(pattern)?;
        Ok(Self { regex, rules })
    }

    /// Parse one line into an [`Event`].
    ///
    /// Fails with [`LogpipeError::NoMatch`] when the pattern does not match.
    pub fn parse(&self, line: &str) -> Result<Event, LogpipeError> {
        self.parse_detailed(line).map(|parsed| parsed.event)
    }

    /// Like [`parse`](Self::parse), also reporting what happened to the
    /// `uri` field.
    pub fn parse_detailed(&self, line: &str) -> Result<ParsedLine, LogpipeError> {
        let Some(caps) = self.regex.captures(line) else {
            debug!(line, "line did not match pattern");
            return Err(LogpipeError::NoMatch);
        };

        let mut event = Event::new();
        let mut uri = None;

        for (index, name) in self.regex.capture_names().enumerate() {
            let Some(name) = name else {
                continue;
            };
            // Groups that took no part in the match read as empty text.
            let text = caps.get(index).map_or("", |m| m.as_str());

            if !self.rules.should_ignore(name) {
                let key = unique_name(name, &event);
                let value = self.rules.infer(text);
                trace!(field = %key, kind = value.kind(), "captured field");
                event.insert(key, value);
            }
            if name == URI_FIELD {
                uri = Some(query::expand(text, &mut event, &self.rules));
            }
        }

        Ok(ParsedLine { event, uri })
    }
}
