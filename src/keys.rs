//! Collision-free field naming.

use crate::event::Event;

/// Return `candidate`, or the shortest `_`-prefixed variant of it that is not
/// already a key of `existing`.
///
/// `user` → `_user` → `__user` → …
pub fn unique_name(candidate: &str, existing: &Event) -> String {
    let mut name = candidate.to_string();
    while existing.contains_key(&name) {
        name.insert(0, '_');
    }
    name
}
