//! JSONL feedback corpus loading

use crate::document::Document;
use crate::error::{FeedsearchError, Result};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use tracing::{debug, warn};

/// One line of a feedback export
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    /// Defaults to the record's position in the file
    #[serde(default)]
    pub id: Option<String>,
    pub text: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub length_bucket: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub source_type: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub vehicle_model: Option<String>,
    #[serde(default)]
    pub market: Option<String>,
}

impl FeedbackRecord {
    /// Convert to a document; absent or blank fields become no metadata
    pub fn into_document(self, position: usize) -> Document {
        let id = self
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| position.to_string());

        let mut document = Document::with_id(id, self.text);

        let text_fields = [
            ("label", self.label),
            ("style", self.style),
            ("length_bucket", self.length_bucket),
            ("source_type", self.source_type),
            ("language", self.language),
            ("timestamp", self.timestamp),
            ("vehicle_model", self.vehicle_model),
            ("market", self.market),
        ];
        for (key, value) in text_fields {
            if let Some(value) = value.filter(|v| !v.is_empty()) {
                document = document.with_meta(key, value);
            }
        }

        if let Some(confidence) = self.confidence {
            document = document.with_meta("confidence", confidence);
        }

        document
    }
}

/// Read feedback records, one JSON object per line
///
/// Blank lines are ignored and records with blank text are skipped; any
/// malformed line fails the whole load with its 1-based line number.
pub fn read_jsonl<R: Read>(reader: R) -> Result<Vec<Document>> {
    let mut documents = Vec::new();

    for (index, line) in BufReader::new(reader).lines().enumerate() {
        let line_no = index + 1;
        let line = line.map_err(|e| FeedsearchError::Io {
            source: e,
            context: format!("Failed to read corpus line {}", line_no),
        })?;

        if line.trim().is_empty() {
            continue;
        }

        let record: FeedbackRecord =
            serde_json::from_str(&line).map_err(|e| FeedsearchError::InvalidRecord {
                line: line_no,
                message: e.to_string(),
            })?;

        if record.text.trim().is_empty() {
            warn!("Skipping corpus line {}: empty text", line_no);
            continue;
        }

        let position = documents.len();
        documents.push(record.into_document(position));
    }

    debug!("Parsed {} feedback records", documents.len());
    Ok(documents)
}

/// Load a JSONL corpus file
pub fn load_jsonl(path: &Path) -> Result<Vec<Document>> {
    let file = std::fs::File::open(path).map_err(|e| FeedsearchError::Io {
        source: e,
        context: format!("Failed to open corpus: {:?}", path),
    })?;
    read_jsonl(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::MetadataValue;

    #[test]
    fn test_reads_records_and_metadata() {
        let input = r#"{"id": "fb-1", "text": "Akku entlädt sich", "label": "BATTERY", "confidence": 0.92, "market": "DE"}

{"text": "Navigation freezes", "market": "", "vehicle_model": "ID.4"}
"#;
        let docs = read_jsonl(input.as_bytes()).unwrap();

        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id, "fb-1");
        assert_eq!(docs[0].metadata["label"], MetadataValue::from("BATTERY"));
        assert_eq!(docs[0].metadata["confidence"], MetadataValue::Float(0.92));

        // Missing id falls back to position, blank fields are dropped
        assert_eq!(docs[1].id, "1");
        assert!(!docs[1].metadata.contains_key("market"));
        assert_eq!(docs[1].metadata["vehicle_model"], MetadataValue::from("ID.4"));
    }

    #[test]
    fn test_invalid_line_reports_number() {
        let input = "{\"text\": \"ok\"}\n{not json}\n";
        let err = read_jsonl(input.as_bytes()).unwrap_err();
        assert!(matches!(err, FeedsearchError::InvalidRecord { line: 2, .. }));
    }

    #[test]
    fn test_blank_text_skipped() {
        let input = "{\"text\": \"   \"}\n{\"text\": \"Seat heating slow\"}\n";
        let docs = read_jsonl(input.as_bytes()).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, "0");
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_jsonl(Path::new("/nonexistent/corpus.jsonl")).unwrap_err();
        assert!(matches!(err, FeedsearchError::Io { .. }));
    }
}
