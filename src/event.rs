//! Structured events produced from log lines.
//!
//! An [`Event`] is a small ordered mapping from field name to a typed
//! [`Value`]. Fields keep the order in which they were inserted so that the
//! serialized JSON is deterministic.

use std::collections::HashMap;
use std::fmt;

use serde::ser::{Error as _, SerializeMap};
use serde::{Serialize, Serializer};

/// A point in time inferred from a log field.
///
/// Keeps the UTC offset that was literally written in the source text so
/// the serialized form round-trips what the log said (`+00:00` when the
/// format carried no zone).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    /// The instant.
    pub value: jiff::Timestamp,
    /// Offset the instant was written with.
    pub offset: jiff::tz::Offset,
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value.display_with_offset(self.offset))
    }
}

/// The inferred type of a single field.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Timestamp(Timestamp),
}

impl Value {
    /// Short type name, used in diagnostics.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::Boolean(_) => "boolean",
            Self::Timestamp(_) => "timestamp",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Text(s) => serializer.serialize_str(s),
            Self::Integer(i) => serializer.serialize_i64(*i),
            // JSON has no representation for infinities.
            Self::Float(f) if !f.is_finite() => {
                Err(S::Error::custom(format!("unsupported float value {f}")))
            }
            Self::Float(f) => serializer.serialize_f64(*f),
            Self::Boolean(b) => serializer.serialize_bool(*b),
            Self::Timestamp(ts) => serializer.collect_str(ts),
        }
    }
}

/// One structured record built from a single log line.
///
/// Keys are unique; [`insert`](Self::insert) replaces the value of an
/// existing key in place. Lookups go through a key index so that lines
/// with many fields stay linear to build.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Event {
    fields: Vec<(String, Value)>,
    index: HashMap<String, usize>,
}

impl Event {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a field, replacing the value if the key already exists.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        if let Some(&slot) = self.index.get(&key) {
            self.fields[slot].1 = value;
        } else {
            self.index.insert(key.clone(), self.fields.len());
            self.fields.push((key, value));
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.index.get(key).map(|&slot| &self.fields[slot].1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate fields in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.iter().map(|(k, _)| k)
    }
}

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (key, value) in self.iter() {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}
