//! Recursive deep merge for partial feed updates.
//!
//! Feed payloads are free-form JSON trees. A partial update names only the
//! keys that changed, so applying one must never drop keys the update leaves
//! out. The rule is small:
//!
//! - map into map: recurse key by key
//! - anything else: the incoming value replaces the existing one outright,
//!   including a scalar replacing a map and a map replacing a scalar
//!
//! Lists are treated as scalars (replaced whole), matching how the feed
//! resends complete arrays rather than array patches.

use serde_json::{Map, Value};

/// Merge `incoming` into `existing`, returning the merged value.
///
/// This is the pure form of [`merge_into`]: neither argument is shared with
/// the result.
///
/// ```rust
/// use paddock::types::value::merge;
/// use serde_json::json;
///
/// let merged = merge(
///     json!({"Position": "1", "Sectors": {"0": {"Value": "28.1"}}}),
///     json!({"Sectors": {"1": {"Value": "31.4"}}}),
/// );
/// assert_eq!(
///     merged,
///     json!({"Position": "1", "Sectors": {"0": {"Value": "28.1"}, "1": {"Value": "31.4"}}})
/// );
/// ```
pub fn merge(existing: Value, incoming: Value) -> Value {
    match (existing, incoming) {
        (Value::Object(mut target), Value::Object(patch)) => {
            merge_into(&mut target, patch);
            Value::Object(target)
        }
        (_, incoming) => incoming,
    }
}

/// Merge `patch` into `target` in place.
///
/// Keys absent from `patch` are left untouched.
pub fn merge_into(target: &mut Map<String, Value>, patch: Map<String, Value>) {
    for (key, value) in patch {
        match value {
            Value::Object(nested) => {
                if let Some(Value::Object(existing)) = target.get_mut(&key) {
                    merge_into(existing, nested);
                } else {
                    target.insert(key, Value::Object(nested));
                }
            }
            other => {
                target.insert(key, other);
            }
        }
    }
}
