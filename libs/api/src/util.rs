use serde_json::Value;

/// Resolve a dot-notation path in a `serde_json::Value`.
///
/// Supports nested field access and numeric array indexes:
/// - `"uuid"` → `value["uuid"]`
/// - `"account.uid"` → `value["account"]["uid"]`
/// - `"items.0.id"` → `value["items"][0]["id"]`
/// - `"a\.b"` → `value["a.b"]` (escaped dot)
///
/// Returns `None` if any segment is missing or the path is empty.
pub fn resolve_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }
    let mut current = value;
    for segment in split_path(path) {
        current = match current {
            Value::Object(map) => map.get(&segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn split_path(path: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut segment = String::new();
    let mut chars = path.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(next) => segment.push(next),
                None => segment.push('\\'),
            },
            '.' => segments.push(std::mem::take(&mut segment)),
            _ => segment.push(c),
        }
    }
    segments.push(segment);
    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolves_nested_fields_and_indexes() {
        let doc = json!({"account": {"uid": "a-1"}, "items": [{"id": 7}, {"id": 8}]});
        assert_eq!(resolve_path(&doc, "account.uid"), Some(&json!("a-1")));
        assert_eq!(resolve_path(&doc, "items.1.id"), Some(&json!(8)));
        assert_eq!(resolve_path(&doc, "items.5.id"), None);
        assert_eq!(resolve_path(&doc, "items.x"), None);
        assert_eq!(resolve_path(&doc, "account.uid.deeper"), None);
        assert_eq!(resolve_path(&doc, ""), None);
    }

    #[test]
    fn escaped_dot_is_a_literal() {
        let doc = json!({"a.b": 1, "a": {"b": 2}});
        assert_eq!(resolve_path(&doc, "a\\.b"), Some(&json!(1)));
        assert_eq!(resolve_path(&doc, "a.b"), Some(&json!(2)));
    }
}
