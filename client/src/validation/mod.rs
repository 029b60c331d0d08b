//! Structural CSV validation.
//!
//! Decides from the head of a file whether it is usable tabular data, and flags
//! borderline content with warnings instead of rejecting it. Only the first
//! [`VALIDATION_HEAD_BYTES`] are read, whatever the file size.

use futures::future::join_all;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;

use crate::config::{VALIDATION_HEAD_BYTES, VALIDATION_MAX_ROWS};
use crate::upload::FileSource;

/// Plain decimal literal. ASCII digits only, so every match parses as `f64`.
pub(crate) static NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[-+]?[0-9]+(\.[0-9]+)?$").expect("valid number regex"));

pub(crate) static BOOLEAN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(true|false)$").expect("valid boolean regex"));

/// Characters that never appear in a real header but always in JSON or markup.
const STRUCTURAL_CHARS: &[char] = &['{', '}', '[', ']', '<', '>'];

/// Delimiters tried on the first line, in order of preference on ties.
const DELIMITERS: &[u8] = b",;\t|";

// =============================================================================
// Results
// =============================================================================

/// A quality concern that does not make the file invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValidationWarning {
    /// The first row looks like data.
    NoHeader,
    /// No data rows, or only blank values.
    NoData,
    /// The raw header line repeats a name.
    DuplicateColumns,
    /// A column mixes numbers, booleans and text.
    MixedTypes,
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ValidationWarning::NoHeader => "no-header",
            ValidationWarning::NoData => "no-data",
            ValidationWarning::DuplicateColumns => "duplicate-columns",
            ValidationWarning::MixedTypes => "mixed-types",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ValidationResult {
    Valid { warnings: BTreeSet<ValidationWarning> },
    Invalid { error: String },
}

impl ValidationResult {
    fn invalid(error: impl Into<String>) -> Self {
        ValidationResult::Invalid { error: error.into() }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid { .. })
    }

    pub fn has_warning(&self, warning: ValidationWarning) -> bool {
        match self {
            ValidationResult::Valid { warnings } => warnings.contains(&warning),
            ValidationResult::Invalid { .. } => false,
        }
    }

    pub fn warnings(&self) -> impl Iterator<Item = ValidationWarning> + '_ {
        let warnings = match self {
            ValidationResult::Valid { warnings } => Some(warnings),
            ValidationResult::Invalid { .. } => None,
        };
        warnings.into_iter().flatten().copied()
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ValidationResult::Invalid { error } => Some(error),
            ValidationResult::Valid { .. } => None,
        }
    }
}

/// Valid and not flagged `no-data`. Other warnings never block an upload.
pub fn is_uploadable(result: &ValidationResult) -> bool {
    result.is_valid() && !result.has_warning(ValidationWarning::NoData)
}

// =============================================================================
// Content validation
// =============================================================================

/// Detect the delimiter by counting occurrences in the first line.
///
/// `None` when no candidate occurs, i.e. a single-column file.
pub fn detect_delimiter(first_line: &str) -> Option<u8> {
    let mut best: Option<(u8, usize)> = None;

    for &sep in DELIMITERS {
        let count = first_line.bytes().filter(|&b| b == sep).count();
        if count > best.map_or(0, |(_, c)| c) {
            best = Some((sep, count));
        }
    }

    best.map(|(sep, _)| sep)
}

fn looks_like_literal(value: &str) -> bool {
    NUMBER_RE.is_match(value) || BOOLEAN_RE.is_match(value)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ValueKind {
    Number,
    Boolean,
    Text,
}

fn value_kind(value: &str) -> ValueKind {
    if NUMBER_RE.is_match(value) {
        ValueKind::Number
    } else if BOOLEAN_RE.is_match(value) {
        ValueKind::Boolean
    } else {
        ValueKind::Text
    }
}

/// Validate decoded CSV text (a whole file or its head).
pub fn validate_content(content: &str) -> ValidationResult {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    if content.trim().is_empty() {
        return ValidationResult::invalid("File is empty");
    }

    let first_line = content.lines().next().unwrap_or("");
    let delimiter = detect_delimiter(first_line).unwrap_or(b',');

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(false)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = match reader.headers() {
        Ok(headers) => headers.iter().map(|h| h.trim().to_string()).collect(),
        Err(e) => return ValidationResult::invalid(format!("Could not parse CSV: {}", e)),
    };

    let mut rows: Vec<Vec<String>> = Vec::new();
    for record in reader.records().take(VALIDATION_MAX_ROWS) {
        match record {
            Ok(record) => rows.push(record.iter().map(str::to_string).collect()),
            Err(e) => return ValidationResult::invalid(format!("Could not parse CSV: {}", e)),
        }
    }

    if headers.iter().all(|h| h.is_empty()) {
        return ValidationResult::invalid("No columns found");
    }
    if headers.len() == 1 && rows.is_empty() {
        return ValidationResult::invalid("A single column without data rows is not usable");
    }
    if let Some(header) = headers.iter().find(|h| h.contains(STRUCTURAL_CHARS)) {
        return ValidationResult::invalid(format!(
            "Content does not look like CSV (unexpected header {:?})",
            header
        ));
    }

    let mut warnings = BTreeSet::new();

    if headers.iter().any(|h| looks_like_literal(h)) {
        warnings.insert(ValidationWarning::NoHeader);
    }

    // Checked on the raw line: a parser may rename duplicates.
    let raw_names: Vec<&str> = first_line.split(',').map(str::trim).collect();
    let unique: HashSet<&str> = raw_names.iter().copied().collect();
    if unique.len() < raw_names.len() {
        warnings.insert(ValidationWarning::DuplicateColumns);
    }

    let all_blank = rows.iter().flatten().all(|v| v.trim().is_empty());
    if rows.is_empty() || all_blank {
        warnings.insert(ValidationWarning::NoData);
    }

    if rows.len() >= 2 && has_mixed_types(&headers, &rows) {
        warnings.insert(ValidationWarning::MixedTypes);
    }

    ValidationResult::Valid { warnings }
}

fn has_mixed_types(headers: &[String], rows: &[Vec<String>]) -> bool {
    (0..headers.len()).any(|col| {
        let kinds: HashSet<ValueKind> = rows
            .iter()
            .filter_map(|row| row.get(col))
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(value_kind)
            .collect();
        kinds.len() > 1
    })
}

/// Validate raw bytes. When `truncated`, the partial last line is dropped first.
pub fn validate_bytes(bytes: &[u8], truncated: bool) -> ValidationResult {
    let bytes = if truncated {
        match bytes.iter().rposition(|&b| b == b'\n') {
            Some(pos) => &bytes[..=pos],
            None => bytes,
        }
    } else {
        bytes
    };

    validate_content(&String::from_utf8_lossy(bytes))
}

// =============================================================================
// File validation
// =============================================================================

/// Validate the head of a file.
pub async fn validate_source<F: FileSource + ?Sized>(source: &F) -> ValidationResult {
    let size = source.info().size;
    let end = size.min(VALIDATION_HEAD_BYTES);

    match source.read_range(0..end).await {
        Ok(head) => validate_bytes(&head, end < size),
        Err(e) => ValidationResult::invalid(e.to_string()),
    }
}

/// Keep the uploadable files, in their original order.
///
/// Files are validated concurrently.
pub async fn filter_uploadable<F: FileSource>(files: &[F]) -> Vec<&F> {
    let results = join_all(files.iter().map(validate_source)).await;

    files
        .iter()
        .zip(results)
        .filter(|(file, result)| {
            if !is_uploadable(result) {
                log::info!("Skipping {}: {:?}", file.info().name, result);
            }
            is_uploadable(result)
        })
        .map(|(file, _)| file)
        .collect()
}
