use std::fmt::Write;
use std::path::{Path, PathBuf};

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Utc};

use crate::config::ArchiveConfig;
use crate::error::ArchiveError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    Topic,
    DateTime,
    Key,
    Index,
}

const PLACEHOLDERS: [(&str, Token); 4] = [
    ("<TOPIC>", Token::Topic),
    ("<DATETIME>", Token::DateTime),
    ("<KEY>", Token::Key),
    ("<INDEX>", Token::Index),
];

/// Canonical filename computation for archives.
///
/// The rendered path is a pure function of (topic, key, time bucket, index).
/// Topic and key are escaped so that distinct pairs never render the same
/// name: every byte outside `[A-Za-z0-9.-]` becomes `%XX`, as does a value
/// made only of dots.
#[derive(Debug, Clone)]
pub struct FilenameTemplate {
    base: PathBuf,
    tokens: Vec<Token>,
    datetime_format: String,
    bucket_secs: i64,
}

impl FilenameTemplate {
    pub fn from_config(config: &ArchiveConfig) -> Result<Self, ArchiveError> {
        Self::new(
            &config.path,
            &config.template,
            &config.datetime_format,
            config.bucket_secs,
        )
    }

    pub fn new(
        base: &Path,
        template: &str,
        datetime_format: &str,
        bucket_secs: u64,
    ) -> Result<Self, ArchiveError> {
        let tokens = parse(template);
        validate_tokens(template, &tokens)?;

        if StrftimeItems::new(datetime_format).any(|item| matches!(item, Item::Error)) {
            return Err(ArchiveError::Config(format!(
                "invalid datetime_format '{datetime_format}'"
            )));
        }
        let bucket_secs = i64::try_from(bucket_secs)
            .ok()
            .filter(|s| *s > 0)
            .ok_or_else(|| ArchiveError::Config(format!("invalid bucket_secs {bucket_secs}")))?;

        Ok(Self {
            base: base.to_path_buf(),
            tokens,
            datetime_format: datetime_format.to_string(),
            bucket_secs,
        })
    }

    /// Start of the time bucket containing `now`.
    pub fn bucket_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let secs = now.timestamp();
        let start = secs - secs.rem_euclid(self.bucket_secs);
        DateTime::from_timestamp(start, 0).unwrap_or(now)
    }

    pub fn render(&self, topic: &str, key: &str, now: DateTime<Utc>, index: u32) -> PathBuf {
        let datetime = self.format_bucket(now);
        let mut name = String::new();
        for token in &self.tokens {
            match token {
                Token::Literal(s) => name.push_str(s),
                Token::Topic => name.push_str(&escape_component(topic)),
                Token::Key => name.push_str(&escape_component(key)),
                Token::DateTime => name.push_str(&datetime),
                Token::Index => {
                    let _ = write!(name, "{index:02}");
                }
            }
        }
        self.base.join(name)
    }

    fn format_bucket(&self, now: DateTime<Utc>) -> String {
        let start = self.bucket_start(now);
        let mut out = String::new();
        if write!(out, "{}", start.format(&self.datetime_format)).is_err() {
            // Unreachable after validation; keep names unique per bucket anyway.
            out = start.timestamp().to_string();
        }
        out
    }
}

fn parse(template: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut literal = String::new();
    let mut rest = template;

    'outer: while !rest.is_empty() {
        for (name, token) in &PLACEHOLDERS {
            if let Some(after) = rest.strip_prefix(name) {
                if !literal.is_empty() {
                    tokens.push(Token::Literal(std::mem::take(&mut literal)));
                }
                tokens.push(token.clone());
                rest = after;
                continue 'outer;
            }
        }
        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            literal.push(c);
        }
        rest = chars.as_str();
    }
    if !literal.is_empty() {
        tokens.push(Token::Literal(literal));
    }
    tokens
}

fn validate_tokens(template: &str, tokens: &[Token]) -> Result<(), ArchiveError> {
    for (name, token) in &PLACEHOLDERS {
        if !tokens.contains(token) {
            return Err(ArchiveError::Config(format!(
                "template '{template}' is missing {name}"
            )));
        }
    }

    // Two values side by side could be split at more than one position,
    // so every pair needs a separator that escaping never produces.
    for pair in tokens.windows(2) {
        if !matches!(pair[0], Token::Literal(_)) && !matches!(pair[1], Token::Literal(_)) {
            return Err(ArchiveError::Config(format!(
                "template '{template}': placeholders must be separated"
            )));
        }
    }
    for triple in tokens.windows(3) {
        let [a, Token::Literal(s), b] = triple else {
            continue;
        };
        let between_placeholders =
            !matches!(a, Token::Literal(_)) && !matches!(b, Token::Literal(_));
        if between_placeholders && s.chars().all(is_escape_output) {
            return Err(ArchiveError::Config(format!(
                "template '{template}': separator '{s}' can appear inside escaped values"
            )));
        }
    }
    Ok(())
}

fn is_passthrough(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'.' || b == b'-'
}

fn is_escape_output(c: char) -> bool {
    c.is_ascii() && (is_passthrough(c as u8) || c == '%')
}

/// Escape a topic or key for use inside a filename.
pub fn escape_component(value: &str) -> String {
    if !value.is_empty() && value.bytes().all(|b| b == b'.') {
        return "%2E".repeat(value.len());
    }
    let mut out = String::with_capacity(value.len());
    for b in value.bytes() {
        if is_passthrough(b) {
            out.push(b as char);
        } else {
            let _ = write!(out, "%{b:02X}");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const DEFAULT: &str = "topic=<TOPIC>_dt=<DATETIME>_accountUID=<KEY>_part=<INDEX>.log";

    fn template(t: &str) -> Result<FilenameTemplate, ArchiveError> {
        FilenameTemplate::new(Path::new("/archive"), t, "%Y-%m-%dT%H:00Z", 3600)
    }

    #[test]
    fn renders_hour_bucket_and_padded_index() {
        let t = template(DEFAULT).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 10, 42, 7).unwrap();
        assert_eq!(
            t.render("Test", "a1", now, 3),
            PathBuf::from("/archive/topic=Test_dt=2024-03-01T10:00Z_accountUID=a1_part=03.log")
        );
    }

    #[test]
    fn same_bucket_same_name_next_bucket_differs() {
        let t = template(DEFAULT).unwrap();
        let a = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2024, 3, 1, 10, 59, 59).unwrap();
        let c = Utc.with_ymd_and_hms(2024, 3, 1, 11, 0, 0).unwrap();
        assert_eq!(t.render("t", "k", a, 0), t.render("t", "k", b, 0));
        assert_ne!(t.render("t", "k", b, 0), t.render("t", "k", c, 0));
    }

    #[test]
    fn narrower_buckets_use_bucket_start() {
        let t = FilenameTemplate::new(Path::new("/a"), DEFAULT, "%Y%m%dT%H%M", 900).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 10, 44, 0).unwrap();
        let name = t.render("t", "k", now, 0);
        assert!(name.to_string_lossy().contains("dt=20240301T1030_"));
    }

    #[test]
    fn escaping_keeps_distinct_pairs_apart() {
        let t = template(DEFAULT).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        let pairs = [
            ("a_b", "c"),
            ("a", "b_c"),
            ("a", "b/c"),
            ("a", "b%2Fc"),
            ("a", ".."),
            ("a", "%2E%2E"),
        ];
        let names: std::collections::HashSet<_> =
            pairs.iter().map(|(topic, key)| t.render(topic, key, now, 0)).collect();
        assert_eq!(names.len(), pairs.len());
    }

    #[test]
    fn escaped_values_stay_in_base_dir() {
        let t = template("<TOPIC>/<KEY>/<DATETIME>_<INDEX>.log").unwrap();
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        let path = t.render("t", "../../etc", now, 0);
        assert_eq!(path.parent().and_then(|p| p.parent()), Some(Path::new("/archive/t")));
        assert_eq!(escape_component(".."), "%2E%2E");
        assert_eq!(escape_component("a.b-c"), "a.b-c");
        assert_eq!(escape_component("a b"), "a%20b");
    }

    #[test]
    fn rejects_incomplete_or_ambiguous_templates() {
        assert!(template("<TOPIC>_<DATETIME>_<KEY>.log").is_err());
        assert!(template("<TOPIC><KEY>_<DATETIME>_<INDEX>").is_err());
        assert!(template("<TOPIC>-<KEY>_<DATETIME>_<INDEX>").is_err());
        assert!(template("<TOPIC>/<KEY>/<DATETIME>_<INDEX>.log").is_ok());
    }

    #[test]
    fn rejects_bad_datetime_format() {
        let err = FilenameTemplate::new(Path::new("/a"), DEFAULT, "%Y-%Q", 3600);
        assert!(matches!(err, Err(ArchiveError::Config(_))));
    }
}
