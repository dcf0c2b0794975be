use serde_json::Value;

use archiver_api::resolve_path;

/// Partition key used when a document has no usable key.
pub const UNDEF: &str = "undef";

/// Read the partition key at `path` (dotted, numeric array indexes, `\.` for
/// a literal dot) out of a JSON document.
///
/// Returns `None` when the document is not JSON, the field is missing, or the
/// value is `null`, an empty string, an object or an array. Callers fall back
/// to [`UNDEF`].
pub fn extract_key(doc: &[u8], path: &str) -> Option<String> {
    let value: Value = serde_json::from_slice(doc).ok()?;
    resolve_path(&value, path).and_then(render_scalar)
}

fn render_scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_render_as_text() {
        let doc = br#"{"account":{"uid":"a-1","n":42,"f":1.5,"ok":true}}"#;
        assert_eq!(extract_key(doc, "account.uid").as_deref(), Some("a-1"));
        assert_eq!(extract_key(doc, "account.n").as_deref(), Some("42"));
        assert_eq!(extract_key(doc, "account.f").as_deref(), Some("1.5"));
        assert_eq!(extract_key(doc, "account.ok").as_deref(), Some("true"));
    }

    #[test]
    fn array_indexes_and_escaped_dots() {
        let doc = br#"{"items":[{"id":"x"},{"id":"y"}],"a.b":"dotted"}"#;
        assert_eq!(extract_key(doc, "items.1.id").as_deref(), Some("y"));
        assert_eq!(extract_key(doc, "a\\.b").as_deref(), Some("dotted"));
    }

    #[test]
    fn unusable_values_yield_none() {
        let doc = br#"{"a":1,"nil":null,"empty":"","obj":{},"arr":[1]}"#;
        for path in ["missing.path", "nil", "empty", "obj", "arr", ""] {
            assert_eq!(extract_key(doc, path), None, "path {path}");
        }
        assert_eq!(extract_key(b"not json", "a"), None);
    }
}
