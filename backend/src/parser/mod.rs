//! CSV parsing of assembled uploads, with encoding and delimiter auto-detection.
//!
//! Rows are maps from column name to the raw (trimmed) value. Missing trailing
//! values become empty strings; extra values are dropped. Content the structural
//! validator would not upload is rejected before parsing.

use chunkload::validation::{detect_delimiter, is_uploadable, validate_content, ValidationResult};
use chunkload::{infer_type, ColumnType, Preview, Row};
use std::collections::HashMap;
use std::path::Path;

use crate::error::{CsvError, CsvResult};

/// Result of parsing with metadata
#[derive(Debug, Clone)]
pub struct ParseResult {
    /// Column headers, in file order
    pub headers: Vec<String>,
    /// Parsed rows
    pub rows: Vec<Row>,
    /// Detected encoding
    pub encoding: String,
    /// Detected delimiter
    pub delimiter: char,
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    // Normalize charset names
    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" | "" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        other => other.to_string(),
    }
}

/// Decode bytes to a string using the specified encoding.
///
/// Unknown encodings are looked up by label and fall back to lossy UTF-8.
pub fn decode_content(bytes: &[u8], encoding: &str) -> String {
    let label = match encoding.to_lowercase().as_str() {
        "utf-8" | "utf8" | "ascii" => return String::from_utf8_lossy(bytes).into_owned(),
        "iso-8859-1" | "latin-1" | "latin1" => "iso-8859-15".to_string(),
        other => other.to_string(),
    };

    match encoding_rs::Encoding::for_label(label.as_bytes()) {
        Some(encoding) => encoding.decode(bytes).0.into_owned(),
        None => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// Decode with auto-detected encoding. Returns the text and the encoding used.
pub fn decode_auto(bytes: &[u8]) -> (String, String) {
    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding);
    let content = match content.strip_prefix('\u{feff}') {
        Some(stripped) => stripped.to_string(),
        None => content,
    };
    (content, encoding)
}

/// Parse CSV text with an explicit delimiter.
pub fn parse_str(content: &str, delimiter: u8) -> CsvResult<(Vec<String>, Vec<Row>)> {
    if content.trim().is_empty() {
        return Err(CsvError::EmptyFile);
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();
    if headers.iter().all(|h| h.is_empty()) {
        return Err(CsvError::NoHeaders);
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row: Row = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.clone(), record.get(i).unwrap_or("").trim().to_string()))
            .collect();
        rows.push(row);
    }

    Ok((headers, rows))
}

/// Decode, validate and parse CSV bytes with auto-detection of encoding and delimiter.
pub fn parse_bytes_auto(bytes: &[u8]) -> CsvResult<ParseResult> {
    let (content, encoding) = decode_auto(bytes);

    let validation = validate_content(&content);
    if !is_uploadable(&validation) {
        let reason = match &validation {
            ValidationResult::Invalid { error } => error.clone(),
            ValidationResult::Valid { .. } => "no data rows".to_string(),
        };
        return Err(CsvError::Rejected(reason));
    }

    let first_line = content.lines().next().unwrap_or("");
    let delimiter = detect_delimiter(first_line).unwrap_or(b',');
    let (headers, rows) = parse_str(&content, delimiter)?;

    Ok(ParseResult {
        headers,
        rows,
        encoding,
        delimiter: delimiter as char,
    })
}

/// Parse a CSV file with auto-detection of encoding and delimiter.
///
/// Blocking: reads the whole file.
pub fn parse_csv_file_auto<P: AsRef<Path>>(path: P) -> CsvResult<ParseResult> {
    let bytes = std::fs::read(path.as_ref())?;
    parse_bytes_auto(&bytes)
}

// =============================================================================
// Preview
// =============================================================================

impl ParseResult {
    /// Type every column over all rows and keep the first `preview_rows` rows.
    pub fn into_preview(self, session_id: &str, preview_rows: usize) -> Preview {
        let column_types: HashMap<String, ColumnType> = self
            .headers
            .iter()
            .map(|h| {
                let values = self.rows.iter().map(|r| r.get(h).map(String::as_str).unwrap_or(""));
                (h.clone(), infer_type(values))
            })
            .collect();

        let total_rows = self.rows.len();
        let rows = self.rows.into_iter().take(preview_rows).collect();

        Preview {
            session_id: session_id.to_string(),
            columns: self.headers,
            column_types,
            rows,
            total_rows,
        }
    }
}
