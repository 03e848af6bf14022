//! Per-document batch records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::line_item::LineItem;

/// Outcome status of one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Success,
    Error,
}

/// Result of extracting one document within a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentResult {
    pub vendor_name: String,
    pub vendor_code: String,
    pub filename: String,
    pub status: DocumentStatus,
    #[serde(default)]
    pub data: Vec<LineItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Seconds spent on the document.
    pub processing_time: f64,
    #[serde(default = "Utc::now")]
    pub completed_at: DateTime<Utc>,
}

impl DocumentResult {
    pub fn is_success(&self) -> bool {
        self.status == DocumentStatus::Success
    }
}

/// Overall batch state written to the status file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchState {
    Processing,
    Completed,
}

/// Progress snapshot rewritten after every completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStatus {
    pub status: BatchState,
    pub completed: usize,
    pub total: usize,
}

impl BatchStatus {
    pub fn new(completed: usize, total: usize) -> Self {
        let status = if completed >= total {
            BatchState::Completed
        } else {
            BatchState::Processing
        };
        Self {
            status,
            completed,
            total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_status_state() {
        assert_eq!(BatchStatus::new(3, 5).status, BatchState::Processing);
        assert_eq!(BatchStatus::new(5, 5).status, BatchState::Completed);
    }

    #[test]
    fn test_document_result_json() {
        let json = r#"{
            "vendor_name": "Glen Rose Meat Company",
            "vendor_code": "glen_rose",
            "filename": "glen.pdf",
            "status": "error",
            "error": "all extraction strategies failed",
            "processing_time": 1.5
        }"#;
        let result: DocumentResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.status, DocumentStatus::Error);
        assert!(result.data.is_empty());
        assert!(!result.is_success());

        let text = serde_json::to_string(&result).unwrap();
        assert!(text.contains(r#""status":"error""#));
    }
}
