//! Field-by-field merging of configuration tiers.

use serde_json::Value;

/// Overlay `upper` onto `lower`.
///
/// Maps merge key by key; any other value in `upper` replaces `lower`,
/// except `null`, which leaves `lower` untouched. Lists are replaced whole.
pub fn deep_merge(lower: Value, upper: Value) -> Value {
    match (lower, upper) {
        (Value::Object(mut merged), Value::Object(upper)) => {
            for (key, value) in upper {
                let next = match merged.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                merged.insert(key, next);
            }
            Value::Object(merged)
        }
        (lower, Value::Null) => lower,
        (_, upper) => upper,
    }
}

/// Merge tiers lowest-priority first.
pub fn deep_merge_all(tiers: impl IntoIterator<Item = Value>) -> Value {
    tiers.into_iter().fold(Value::Null, deep_merge)
}
