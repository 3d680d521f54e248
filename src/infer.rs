//! Type inference for raw field text.
//!
//! Every captured field goes through [`infer`], which tries progressively
//! less specific interpretations and keeps the first one that fits:
//! user time formats, the built-in [`FALLBACK_TIME_FORMATS`], integer,
//! boolean, float, and finally plain text.

use jiff::fmt::strtime;
use jiff::fmt::temporal::{Pieces, PiecesOffset};
use jiff::tz::Offset;

use crate::event::{Timestamp, Value};

/// Built-in timestamp formats tried after the configured ones.
///
/// jiff cannot parse zone abbreviations, so formats that carry a named zone
/// are listed once per accepted literal (`UTC`, `GMT`).
pub const FALLBACK_TIME_FORMATS: &[&str] = &[
    // nginx / Apache access log
    "%d/%b/%Y:%H:%M:%S %z",
    // ANSI C
    "%a %b %e %H:%M:%S %Y",
    // Unix date
    "%a %b %e %H:%M:%S UTC %Y",
    "%a %b %e %H:%M:%S GMT %Y",
    // Ruby date
    "%a %b %d %H:%M:%S %z %Y",
    // RFC 822
    "%d %b %y %H:%M UTC",
    "%d %b %y %H:%M GMT",
    "%d %b %y %H:%M %z",
    // RFC 850
    "%A, %d-%b-%y %H:%M:%S UTC",
    "%A, %d-%b-%y %H:%M:%S GMT",
    // RFC 1123
    "%a, %d %b %Y %H:%M:%S UTC",
    "%a, %d %b %Y %H:%M:%S GMT",
    "%a, %d %b %Y %H:%M:%S %z",
    // RFC 3339
    "%Y-%m-%dT%H:%M:%SZ",
    "%Y-%m-%dT%H:%M:%S%:z",
    "%Y-%m-%dT%H:%M:%S%.fZ",
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    // YYYY-MM-DD HH:MM:SS[.fff], no zone
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
];

/// Infer the most specific typed [`Value`] for `raw`.
///
/// Resolution order (first success wins):
/// 1. each of `time_formats`, in order
/// 2. [`FALLBACK_TIME_FORMATS`], then any other ISO 8601 instant
/// 3. signed 64-bit integer
/// 4. boolean (`t`, `true`, `TRUE`, `True` and the `f` equivalents)
/// 5. 64-bit float, where NaN becomes `0.0`
/// 6. the original text
///
/// Never fails.
pub fn infer(raw: &str, time_formats: &[String]) -> Value {
    if let Some(ts) = parse_timestamp(raw, time_formats) {
        return Value::Timestamp(ts);
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Value::Integer(i);
    }
    if let Some(b) = parse_bool(raw) {
        return Value::Boolean(b);
    }
    if let Ok(f) = raw.parse::<f64>() {
        // "NaN" still reads as a number, but must not leak downstream.
        return Value::Float(if f.is_nan() { 0.0 } else { f });
    }
    Value::Text(raw.to_string())
}

/// Try the configured formats, then the fallbacks.
fn parse_timestamp(raw: &str, time_formats: &[String]) -> Option<Timestamp> {
    if raw.is_empty() {
        return None;
    }

    let configured = time_formats.iter().map(String::as_str);
    for format in configured.chain(FALLBACK_TIME_FORMATS.iter().copied()) {
        if let Some(ts) = parse_with_format(format, raw) {
            return Some(ts);
        }
    }

    parse_iso8601(raw)
}

/// Remaining ISO 8601 shapes jiff understands natively, such as a space
/// separator, an hour-only offset, or a comma before the fraction.
fn parse_iso8601(raw: &str) -> Option<Timestamp> {
    let value = raw.parse::<jiff::Timestamp>().ok()?;
    let offset = match Pieces::parse(raw).ok()?.offset() {
        Some(PiecesOffset::Numeric(numeric)) => numeric.offset(),
        // `Z` and the unknown offset `-00:00`.
        _ => Offset::UTC,
    };
    Some(Timestamp { value, offset })
}

/// Parse `raw` with a single strptime-style format.
///
/// The whole input must be consumed. Formats without a numeric offset are
/// read as UTC. A weekday only has to be spelled correctly; it is not
/// checked against the date.
fn parse_with_format(format: &str, raw: &str) -> Option<Timestamp> {
    let mut tm = strtime::parse(format, raw).ok()?;
    tm.set_weekday(None);
    let datetime = tm.to_datetime().ok()?;
    let offset = tm.offset().unwrap_or(Offset::UTC);
    let value = offset.to_timestamp(datetime).ok()?;
    Some(Timestamp { value, offset })
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw {
        "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}
