//! Documents, metadata and the corpus snapshot used to build the sparse index

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Scalar metadata value attached to a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl MetadataValue {
    /// Parse a command-line style scalar: booleans, then integers, then floats, else text
    pub fn parse_scalar(raw: &str) -> Self {
        if let Ok(b) = raw.parse::<bool>() {
            return Self::Bool(b);
        }
        if let Ok(i) = raw.parse::<i64>() {
            return Self::Int(i);
        }
        if let Ok(f) = raw.parse::<f64>() {
            return Self::Float(f);
        }
        Self::Text(raw.to_string())
    }

    /// Exact-match comparison used by metadata filters.
    ///
    /// Integers and floats compare numerically so that `confidence = 1` matches a
    /// stored `1.0`.
    pub fn matches(&self, other: &MetadataValue) -> bool {
        match (self, other) {
            (Self::Int(a), Self::Float(b)) | (Self::Float(b), Self::Int(a)) => (*a as f64) == *b,
            _ => self == other,
        }
    }

    fn is_blank(&self) -> bool {
        matches!(self, Self::Text(s) if s.trim().is_empty())
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Document metadata, ordered by key for stable output
pub type Metadata = BTreeMap<String, MetadataValue>;

/// A feedback snippet as stored in both indices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Document {
    /// Create a document with a generated id
    pub fn new(text: impl Into<String>) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), text)
    }

    /// Create a document with a caller-assigned id
    pub fn with_id(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata: Metadata::new(),
        }
    }

    /// Attach a metadata field
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Exact-match conjunction over metadata fields.
///
/// Blank string values are dropped on construction and impose no constraint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataFilter {
    fields: BTreeMap<String, MetadataValue>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a filter from key/value pairs, skipping blank values
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<MetadataValue>,
    {
        let mut filter = Self::new();
        for (key, value) in pairs {
            filter = filter.with(key, value);
        }
        filter
    }

    /// Add a constraint; blank values are ignored
    pub fn with(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        let value = value.into();
        if !value.is_blank() {
            self.fields.insert(key.into(), value);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &MetadataValue)> {
        self.fields.iter()
    }

    /// Whether a document's metadata satisfies every constraint
    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.fields.iter().all(|(key, expected)| {
            metadata
                .get(key)
                .map(|actual| actual.matches(expected))
                .unwrap_or(false)
        })
    }
}

/// The full `(id, text)` corpus used to build the sparse index
#[derive(Debug, Clone, Default)]
pub struct CorpusSnapshot {
    entries: Vec<(String, String)>,
}

impl CorpusSnapshot {
    pub fn new(entries: Vec<(String, String)>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(id, _)| id.as_str())
    }

    /// BLAKE3 fingerprint of the ordered `(id, text)` pairs
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for (id, text) in &self.entries {
            hasher.update(id.as_bytes());
            hasher.update(&[0]);
            hasher.update(text.as_bytes());
            hasher.update(&[0xff]);
        }
        hasher.finalize().to_hex().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scalar() {
        assert_eq!(MetadataValue::parse_scalar("true"), MetadataValue::Bool(true));
        assert_eq!(MetadataValue::parse_scalar("42"), MetadataValue::Int(42));
        assert_eq!(MetadataValue::parse_scalar("0.5"), MetadataValue::Float(0.5));
        assert_eq!(
            MetadataValue::parse_scalar("ID.4"),
            MetadataValue::Text("ID.4".to_string())
        );
    }

    #[test]
    fn test_filter_conjunction() {
        let doc = Document::with_id("a", "text")
            .with_meta("label", "battery")
            .with_meta("market", "DE");

        let filter = MetadataFilter::new().with("label", "battery");
        assert!(filter.matches(&doc.metadata));

        let filter = filter.with("market", "US");
        assert!(!filter.matches(&doc.metadata));

        // Missing field on the document never matches
        let filter = MetadataFilter::new().with("style", "voice");
        assert!(!filter.matches(&doc.metadata));
    }

    #[test]
    fn test_blank_filter_values_are_dropped() {
        let filter = MetadataFilter::from_pairs([("label", ""), ("market", "DE")]);
        assert_eq!(filter.fields().count(), 1);
        assert!(MetadataFilter::from_pairs([("label", "  ")]).is_empty());
    }

    #[test]
    fn test_numeric_match() {
        let doc = Document::with_id("a", "text").with_meta("confidence", 1.0);
        let filter = MetadataFilter::new().with("confidence", 1i64);
        assert!(filter.matches(&doc.metadata));
    }

    #[test]
    fn test_fingerprint_changes_with_content() {
        let a = CorpusSnapshot::new(vec![("1".into(), "battery".into())]);
        let b = CorpusSnapshot::new(vec![("1".into(), "battery".into())]);
        let c = CorpusSnapshot::new(vec![("2".into(), "battery".into())]);

        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(Document::new("x").id, Document::new("x").id);
    }
}
