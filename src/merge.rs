//! Merge rule for `merge_item`
//!
//! Values taking part in a merge are JSON objects. The delta is merged into
//! the existing object recursively: where both sides hold an object under the
//! same key the two objects are merged, anything else in the delta replaces
//! what was there.

use serde_json::{Map, Value};

use crate::error::{BurrowError, Result};

/// Merge `delta` into `existing`, returning the serialized result
pub fn merge_json(existing: &str, delta: &str) -> Result<String> {
    let mut base = parse_object(existing, "existing value")?;
    let delta = parse_object(delta, "delta")?;

    deep_merge(&mut base, delta);

    serde_json::to_string(&Value::Object(base))
        .map_err(|e| BurrowError::InvalidMerge(format!("failed to serialize merged value: {}", e)))
}

fn parse_object(raw: &str, what: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(BurrowError::InvalidMerge(format!(
            "{} is not a JSON object (found {})",
            what,
            kind(&other)
        ))),
        Err(e) => Err(BurrowError::InvalidMerge(format!(
            "{} is not valid JSON: {}",
            what, e
        ))),
    }
}

fn deep_merge(base: &mut Map<String, Value>, delta: Map<String, Value>) {
    for (key, incoming) in delta {
        match incoming {
            Value::Object(nested) => {
                if let Some(Value::Object(current)) = base.get_mut(&key) {
                    deep_merge(current, nested);
                } else {
                    base.insert(key, Value::Object(nested));
                }
            }
            other => {
                base.insert(key, other);
            }
        }
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
