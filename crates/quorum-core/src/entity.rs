//! System entities recognised by the numeric extraction service.

use serde::{Deserialize, Serialize};

/// One recognised span of an input string.
///
/// `start` and `end` are character offsets into the original input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    #[serde(rename = "type")]
    pub entity_type: String,
    pub value: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub start: usize,
    pub end: usize,
    pub confidence: f64,
    pub source_text: String,
    pub extractor_id: String,
}

impl ExtractionResult {
    /// Span length in characters.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}
