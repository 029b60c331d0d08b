//! Common types shared across the upload client.
//!
//! # Categories
//!
//! - **File Types** - immutable file snapshots
//! - **Session Types** - server-side session identifiers
//! - **Preview Types** - structured preview returned after finalize

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::analysis::ColumnType;

// =============================================================================
// File Types
// =============================================================================

/// Mime types accepted as CSV regardless of the file name.
pub const CSV_MIME_TYPES: &[&str] = &[
    "text/csv",
    "application/csv",
    "text/comma-separated-values",
    "text/x-csv",
];

/// Immutable snapshot of a file, taken once per upload attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    /// File name as presented by the user (no directory).
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// Mime type, possibly empty when unknown.
    pub mime_type: String,
}

impl FileInfo {
    pub fn new(name: impl Into<String>, size: u64, mime_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size,
            mime_type: mime_type.into(),
        }
    }

    /// True when the name ends in `.csv` or the mime type is a CSV type.
    pub fn looks_like_csv(&self) -> bool {
        let by_name = self.name.to_lowercase().ends_with(".csv");
        let mime = self.mime_type.to_lowercase();
        let by_mime = CSV_MIME_TYPES.iter().any(|m| mime.starts_with(m));
        by_name || by_mime
    }
}

// =============================================================================
// Session Types
// =============================================================================

/// Server-assigned identifier correlating the chunks of one file.
pub type SessionId = String;

// =============================================================================
// Preview Types
// =============================================================================

/// A parsed row: column name -> raw string value. Missing keys mean empty.
pub type Row = HashMap<String, String>;

/// Structured preview of a finalized upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preview {
    pub session_id: SessionId,
    /// Column names in file order.
    pub columns: Vec<String>,
    /// Types inferred by the server over every row of the file.
    pub column_types: HashMap<String, ColumnType>,
    /// The first rows of the file.
    pub rows: Vec<Row>,
    /// Number of data rows in the whole file.
    pub total_rows: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_detection_by_name_or_mime() {
        assert!(FileInfo::new("data.CSV", 10, "").looks_like_csv());
        assert!(FileInfo::new("export", 10, "text/csv; charset=utf-8").looks_like_csv());
        assert!(!FileInfo::new("data.json", 10, "application/json").looks_like_csv());
    }

    #[test]
    fn test_preview_deserialization() {
        let json = r#"{
            "sessionId": "abc",
            "columns": ["id", "name"],
            "columnTypes": { "id": "number", "name": "string" },
            "rows": [{ "id": "1", "name": "Alice" }],
            "totalRows": 1
        }"#;

        let preview: Preview = serde_json::from_str(json).unwrap();
        assert_eq!(preview.columns, vec!["id", "name"]);
        assert_eq!(preview.column_types["id"], ColumnType::Number);
        assert_eq!(preview.rows[0]["name"], "Alice");
    }
}
