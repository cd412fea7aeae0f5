//! Key normalization for externally-sourced payloads.
//!
//! Raw feed payloads may carry mapping keys that are illegal as document
//! field names: a literal `.` (path separator) or the reserved `$` operator
//! sigil. Both are stripped from every key before a payload is persisted.
//! Values are never altered.

use serde_json::{Map, Value};

/// Strip `$` and `.` from every mapping key, recursively.
///
/// Scalars pass through untouched, sequences are mapped element-wise, and
/// nested mappings are recursed into. Two keys that collide after
/// sanitization resolve to the later entry.
pub fn sanitize_keys(value: Value) -> Value {
    match value {
        Value::Object(entries) => {
            let mut clean = Map::with_capacity(entries.len());
            for (key, entry) in entries {
                clean.insert(sanitize_key(&key), sanitize_keys(entry));
            }
            Value::Object(clean)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize_keys).collect()),
        scalar => scalar,
    }
}

fn sanitize_key(key: &str) -> String {
    key.chars().filter(|c| *c != '$' && *c != '.').collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strips_reserved_characters_from_keys() {
        let sanitized = sanitize_keys(json!({
            "job.id": "ext-1",
            "$set": "nope",
            "a.b.$c": 3,
        }));

        assert_eq!(
            sanitized,
            json!({
                "jobid": "ext-1",
                "set": "nope",
                "abc": 3,
            })
        );
    }

    #[test]
    fn values_are_untouched() {
        let sanitized = sanitize_keys(json!({
            "link": "https://example.com/a.b?x=$y",
            "count": 2,
        }));

        assert_eq!(sanitized["link"], "https://example.com/a.b?x=$y");
        assert_eq!(sanitized["count"], 2);
    }

    #[test]
    fn recurses_through_mappings_and_sequences() {
        let sanitized = sanitize_keys(json!({
            "meta.data": {
                "$inner": [{"deep.key": true}, "plain", 1]
            }
        }));

        assert_eq!(
            sanitized,
            json!({
                "metadata": {
                    "inner": [{"deepkey": true}, "plain", 1]
                }
            })
        );
    }

    #[test]
    fn scalars_pass_through() {
        assert_eq!(sanitize_keys(json!("a.b$c")), json!("a.b$c"));
        assert_eq!(sanitize_keys(json!(null)), json!(null));
    }
}
