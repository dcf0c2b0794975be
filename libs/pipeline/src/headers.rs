use serde_json::{Map, Value};

use crate::error::MergeError;

/// Field the selected headers are stored under.
pub const HEADERS_FIELD: &str = "headers";

/// Merge the configured subset of message headers into `doc` and return the
/// compacted document.
///
/// `selected` names are matched case-insensitively and stored lower-cased;
/// the first occurrence of a header wins. An existing `headers` field is
/// overwritten. With nothing selected the document is only compacted.
pub fn merge_headers(
    selected: &[String],
    headers: &[(String, String)],
    doc: &[u8],
) -> Result<Vec<u8>, MergeError> {
    let mut value: Value =
        serde_json::from_slice(doc).map_err(|e| MergeError::InvalidDocument(e.to_string()))?;
    let Some(object) = value.as_object_mut() else {
        return Err(MergeError::InvalidDocument(format!(
            "expected a JSON object, got {}",
            kind(&value)
        )));
    };

    if !selected.is_empty() {
        let mut picked = Map::new();
        for (name, val) in headers {
            if selected.iter().any(|s| s.eq_ignore_ascii_case(name)) {
                picked
                    .entry(name.to_ascii_lowercase())
                    .or_insert_with(|| Value::String(val.clone()));
            }
        }
        object.insert(HEADERS_FIELD.to_string(), Value::Object(picked));
    }

    serde_json::to_vec(&value).map_err(|e| MergeError::InvalidDocument(e.to_string()))
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

#[cfg(test)]
mod tests {
    use super::*;

    fn hdrs(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn selected(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn selects_case_insensitively_and_lowercases() {
        let out = merge_headers(
            &selected(&["X-Trace-Id", "priority"]),
            &hdrs(&[("x-trace-id", "t1"), ("Priority", "4"), ("other", "no")]),
            br#"{ "a" : 1 }"#,
        )
        .unwrap();
        assert_eq!(out, br#"{"a":1,"headers":{"x-trace-id":"t1","priority":"4"}}"#);
    }

    #[test]
    fn first_occurrence_wins() {
        let out = merge_headers(
            &selected(&["id"]),
            &hdrs(&[("ID", "first"), ("id", "second")]),
            b"{}",
        )
        .unwrap();
        assert_eq!(out, br#"{"headers":{"id":"first"}}"#);
    }

    #[test]
    fn existing_headers_field_is_overwritten() {
        let out = merge_headers(&selected(&["a"]), &hdrs(&[("a", "1")]), br#"{"headers":[1,2]}"#)
            .unwrap();
        assert_eq!(out, br#"{"headers":{"a":"1"}}"#);
    }

    #[test]
    fn nothing_selected_only_compacts() {
        let out = merge_headers(&[], &hdrs(&[("a", "1")]), b"{\n  \"one\": 1,\n  \"two\": 2\n}").unwrap();
        assert_eq!(out, br#"{"one":1,"two":2}"#);
    }

    #[test]
    fn number_text_is_kept_verbatim() {
        let doc = br#"{"id":123456789012345678901234567890,"x":1e5,"y":1.10,"z":-0}"#;
        assert_eq!(merge_headers(&[], &[], doc).unwrap(), doc.to_vec());

        let out = merge_headers(&selected(&["a"]), &hdrs(&[("a", "1")]), br#"{ "n" : 2.50E-3 }"#)
            .unwrap();
        assert_eq!(out, br#"{"n":2.50E-3,"headers":{"a":"1"}}"#);
    }

    #[test]
    fn non_object_documents_are_rejected() {
        for doc in [&b"[1,2]"[..], b"\"text\"", b"42", b"{broken"] {
            let err = merge_headers(&[], &[], doc).unwrap_err();
            assert!(matches!(err, MergeError::InvalidDocument(_)));
        }
    }
}
