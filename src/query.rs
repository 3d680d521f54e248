//! Expansion of a `uri` field's query string into sibling event fields.

use std::collections::HashSet;
use std::sync::LazyLock;

use url::Url;

use crate::event::Event;
use crate::keys::unique_name;
use crate::parser::FieldRules;

/// Base used to resolve relative request targets such as `/search?q=5`.
static BASE: LazyLock<Option<Url>> = LazyLock::new(|| Url::parse("http://localhost/").ok());

/// What [`expand`] did with a URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpandOutcome {
    /// The URI was empty; nothing to do.
    Empty,
    /// The URI could not be parsed; the event is unchanged.
    Malformed,
    /// The query string was merged; holds the number of fields added.
    Expanded(usize),
}

/// Merge the query parameters of `uri` into `event`.
///
/// Parameters are visited in order of first appearance. Only the first value
/// of a repeated parameter is kept. Each name is made unique against the
/// event before the ignore list is consulted.
pub fn expand(uri: &str, event: &mut Event, rules: &FieldRules) -> ExpandOutcome {
    if uri.is_empty() {
        return ExpandOutcome::Empty;
    }

    let Some(parsed) = Url::options().base_url((*BASE).as_ref()).parse(uri).ok() else {
        return ExpandOutcome::Malformed;
    };

    // First appearance fixes both the order and the value of a key.
    let mut seen = HashSet::new();
    let mut params = Vec::new();
    for (key, value) in parsed.query_pairs() {
        if seen.insert(key.clone()) {
            params.push((key, value));
        }
    }

    let mut added = 0;
    for (key, value) in params {
        let name = unique_name(&key, event);
        if rules.should_ignore(&name) {
            continue;
        }
        event.insert(name, rules.infer(&value));
        added += 1;
    }

    ExpandOutcome::Expanded(added)
}
