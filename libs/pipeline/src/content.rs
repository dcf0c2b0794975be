use std::borrow::Cow;
use std::collections::HashMap;
use std::io::{Cursor, Read};

use base64::Engine;

use crate::error::ContentError;

/// Tag for a pkzip archive whose first entry holds the JSON document.
pub const ZIP_JSON: &str = "zip;json";
/// Tag for a base64-encoded [`ZIP_JSON`] payload.
pub const B64_ZIP_JSON: &str = "b64;zip;json";

/// Raw message body → JSON bytes.
pub trait ContentDecoder: Send + Sync {
    fn decode(&self, raw: &[u8]) -> Result<Vec<u8>, ContentError>;
}

// ═══════════════════════════════════════════════════════════════
//  Registry
// ═══════════════════════════════════════════════════════════════

/// Content-type tag → decoder. Filled at startup, read-only once shared.
pub struct DecoderRegistry {
    decoders: HashMap<String, Box<dyn ContentDecoder>>,
}

impl std::fmt::Debug for DecoderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut tags: Vec<_> = self.decoders.keys().collect();
        tags.sort();
        f.debug_struct("DecoderRegistry").field("tags", &tags).finish()
    }
}

impl Default for DecoderRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(ZIP_JSON, ZipJson);
        registry.register(B64_ZIP_JSON, Base64ZipJson);
        registry
    }
}

impl DecoderRegistry {
    /// Registry with no decoders: only untagged payloads pass.
    pub fn empty() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Add (or replace) the decoder for `tag`.
    pub fn register(&mut self, tag: impl Into<String>, decoder: impl ContentDecoder + 'static) {
        self.decoders.insert(tag.into(), Box::new(decoder));
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.decoders.contains_key(tag)
    }

    /// Decode `raw` according to `tag`. Untagged payloads are returned as-is.
    pub fn decode<'a>(&self, tag: Option<&str>, raw: &'a [u8]) -> Result<Cow<'a, [u8]>, ContentError> {
        let Some(tag) = tag else {
            return Ok(Cow::Borrowed(raw));
        };
        let decoder = self
            .decoders
            .get(tag.trim())
            .ok_or_else(|| ContentError::UnsupportedContentType(tag.to_string()))?;
        decoder.decode(raw).map(Cow::Owned)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Built-in decoders
// ═══════════════════════════════════════════════════════════════

/// `zip;json`: contents of the first archive entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipJson;

impl ContentDecoder for ZipJson {
    fn decode(&self, raw: &[u8]) -> Result<Vec<u8>, ContentError> {
        let mut archive = zip::ZipArchive::new(Cursor::new(raw))
            .map_err(|e| ContentError::MalformedArchive(e.to_string()))?;
        if archive.is_empty() {
            return Err(ContentError::NoEntriesFound);
        }
        let mut entry = archive
            .by_index(0)
            .map_err(|e| ContentError::MalformedArchive(e.to_string()))?;
        let mut out = Vec::with_capacity(usize::try_from(entry.size()).unwrap_or(0));
        entry
            .read_to_end(&mut out)
            .map_err(|e| ContentError::MalformedArchive(format!("{}: {e}", entry.name())))?;
        Ok(out)
    }
}

/// `b64;zip;json`: standard base64 (whitespace tolerated) wrapping `zip;json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Base64ZipJson;

impl ContentDecoder for Base64ZipJson {
    fn decode(&self, raw: &[u8]) -> Result<Vec<u8>, ContentError> {
        let compact: Vec<u8> = raw
            .iter()
            .copied()
            .filter(|b| !b.is_ascii_whitespace())
            .collect();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&compact)
            .map_err(|e| ContentError::MalformedEncoding(e.to_string()))?;
        ZipJson.decode(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn zipped(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(body.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn untagged_payload_passes_through() {
        let reg = DecoderRegistry::default();
        let out = reg.decode(None, b"{\"a\":1}").unwrap();
        assert!(matches!(out, Cow::Borrowed(_)));
        assert_eq!(&*out, b"{\"a\":1}");
    }

    #[test]
    fn unknown_tag_is_unsupported() {
        let reg = DecoderRegistry::default();
        let err = reg.decode(Some("gzip;json"), b"x").unwrap_err();
        assert!(matches!(err, ContentError::UnsupportedContentType(t) if t == "gzip;json"));
    }

    #[test]
    fn zip_returns_first_entry_only() {
        let raw = zipped(&[("a.json", r#"{"one":1}"#), ("b.json", r#"{"two":2}"#)]);
        let out = DecoderRegistry::default().decode(Some(ZIP_JSON), &raw).unwrap();
        assert_eq!(&*out, br#"{"one":1}"#);
    }

    #[test]
    fn empty_zip_has_no_entries() {
        let raw = zipped(&[]);
        let err = ZipJson.decode(&raw).unwrap_err();
        assert!(matches!(err, ContentError::NoEntriesFound));
    }

    #[test]
    fn corrupt_zip_is_malformed() {
        let err = ZipJson.decode(b"definitely not a zip").unwrap_err();
        assert!(matches!(err, ContentError::MalformedArchive(_)));
    }

    #[test]
    fn base64_wrapping_decodes_to_same_document() {
        let raw = zipped(&[("doc.json", r#"{"one":1,"two":2}"#)]);
        let mut encoded = base64::engine::general_purpose::STANDARD.encode(&raw);
        encoded.insert(8, '\n');
        let out = DecoderRegistry::default()
            .decode(Some(B64_ZIP_JSON), encoded.as_bytes())
            .unwrap();
        assert_eq!(&*out, br#"{"one":1,"two":2}"#);
    }

    #[test]
    fn bad_base64_is_malformed_encoding() {
        let err = Base64ZipJson.decode(b"***not base64***").unwrap_err();
        assert!(matches!(err, ContentError::MalformedEncoding(_)));
    }

    #[test]
    fn custom_decoders_can_be_registered() {
        struct Upper;
        impl ContentDecoder for Upper {
            fn decode(&self, raw: &[u8]) -> Result<Vec<u8>, ContentError> {
                Ok(raw.to_ascii_uppercase())
            }
        }

        let mut reg = DecoderRegistry::empty();
        assert!(!reg.contains(ZIP_JSON));
        reg.register("upper", Upper);
        assert_eq!(&*reg.decode(Some("upper"), b"\"x\"").unwrap(), b"\"X\"");
    }
}
