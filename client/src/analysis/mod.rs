//! Column statistics for human review.
//!
//! Works on already-parsed rows (column name -> raw string value). An empty or
//! whitespace-only value, or a missing key, counts as absent.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use crate::error::{ClientError, ClientResult};
use crate::types::Row;
use crate::validation::{detect_delimiter, BOOLEAN_RE, NUMBER_RE};

/// Maximum number of sample values kept per column.
pub const MAX_SAMPLE_VALUES: usize = 5;

/// Share of empty values above which a column gets a warning.
pub const EMPTY_RATIO_THRESHOLD: f64 = 0.2;

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d/%m/%Y",
    "%m/%d/%Y",
    "%d.%m.%Y",
    "%d-%m-%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d %B %Y",
    "%d %b %Y",
];

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

// =============================================================================
// Types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Number,
    Boolean,
    Date,
    String,
    Unknown,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ColumnType::Number => "number",
            ColumnType::Boolean => "boolean",
            ColumnType::Date => "date",
            ColumnType::String => "string",
            ColumnType::Unknown => "unknown",
        };
        f.pad(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NumericRange {
    pub min: f64,
    pub max: f64,
}

/// Statistics of one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnStats {
    pub name: String,
    pub inferred_type: ColumnType,
    pub empty_count: usize,
    pub total_count: usize,
    /// Distinct non-empty values, first-seen order.
    pub sample_values: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numeric_range: Option<NumericRange>,
    pub warnings: Vec<String>,
}

impl ColumnStats {
    pub fn empty_ratio(&self) -> f64 {
        if self.total_count == 0 {
            0.0
        } else {
            self.empty_count as f64 / self.total_count as f64
        }
    }
}

// =============================================================================
// Inference
// =============================================================================

fn parse_date(value: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.date_naive());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|dt| dt.date())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        })
}

fn is_date(value: &str) -> bool {
    value.chars().count() >= 8
        && parse_date(value).is_some_and(|d| (1900..=2100).contains(&d.year()))
}

/// Infer the type of a column from its values. Empty values are ignored.
///
/// Checks run in order: number, boolean, date, then string.
pub fn infer_type<'a, I>(values: I) -> ColumnType
where
    I: IntoIterator<Item = &'a str>,
{
    let values: Vec<&str> = values
        .into_iter()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .collect();

    if values.is_empty() {
        ColumnType::Unknown
    } else if values.iter().all(|v| NUMBER_RE.is_match(v)) {
        ColumnType::Number
    } else if values.iter().all(|v| BOOLEAN_RE.is_match(v)) {
        ColumnType::Boolean
    } else if values.iter().all(|v| is_date(v)) {
        ColumnType::Date
    } else {
        ColumnType::String
    }
}

// =============================================================================
// Analysis
// =============================================================================

/// Statistics for one column over all rows.
pub fn analyze_column(name: &str, rows: &[Row]) -> ColumnStats {
    let values: Vec<&str> = rows
        .iter()
        .map(|row| row.get(name).map(|v| v.trim()).unwrap_or(""))
        .collect();

    let empty_count = values.iter().filter(|v| v.is_empty()).count();
    let total_count = rows.len();
    let inferred_type = infer_type(values.iter().copied());

    let mut seen = HashSet::new();
    let sample_values: Vec<String> = values
        .iter()
        .filter(|v| !v.is_empty() && seen.insert(**v))
        .take(MAX_SAMPLE_VALUES)
        .map(|v| v.to_string())
        .collect();

    let numeric_range = if inferred_type == ColumnType::Number {
        values
            .iter()
            .filter_map(|v| v.parse::<f64>().ok())
            .fold(None, |range: Option<NumericRange>, n| {
                Some(match range {
                    None => NumericRange { min: n, max: n },
                    Some(r) => NumericRange {
                        min: r.min.min(n),
                        max: r.max.max(n),
                    },
                })
            })
    } else {
        None
    };

    let mut stats = ColumnStats {
        name: name.to_string(),
        inferred_type,
        empty_count,
        total_count,
        sample_values,
        numeric_range,
        warnings: Vec::new(),
    };

    if stats.empty_ratio() > EMPTY_RATIO_THRESHOLD {
        stats.warnings.push(format!(
            "{}% of values are empty",
            (stats.empty_ratio() * 100.0).round()
        ));
    }

    stats
}

/// Statistics for every column, in column order.
pub fn analyze_columns(columns: &[String], rows: &[Row]) -> Vec<ColumnStats> {
    columns.iter().map(|c| analyze_column(c, rows)).collect()
}

// =============================================================================
// Local tables
// =============================================================================

/// A CSV file read into memory.
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

/// Parse CSV text with delimiter auto-detection. Short rows leave keys missing.
pub fn parse_table(content: &str) -> ClientResult<Table> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let first_line = content.lines().next().unwrap_or("");
    let delimiter = detect_delimiter(first_line).unwrap_or(b',');

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(content.as_bytes());

    let columns: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row: Row = columns
            .iter()
            .zip(record.iter())
            .map(|(c, v)| (c.clone(), v.to_string()))
            .collect();
        rows.push(row);
    }

    Ok(Table { columns, rows })
}

/// Read and parse a local CSV file.
pub async fn read_table(path: impl AsRef<Path>) -> ClientResult<Table> {
    let bytes = tokio::fs::read(path.as_ref())
        .await
        .map_err(|e| ClientError::Source(e.into()))?;
    parse_table(&String::from_utf8_lossy(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(column: &str, values: &[&str]) -> Vec<Row> {
        values
            .iter()
            .map(|v| Row::from([(column.to_string(), v.to_string())]))
            .collect()
    }

    #[test]
    fn test_number_column_with_range() {
        let stats = analyze_column("amount", &rows("amount", &["100.50", "200", "-30.5"]));
        assert_eq!(stats.inferred_type, ColumnType::Number);
        assert_eq!(
            stats.numeric_range,
            Some(NumericRange { min: -30.5, max: 200.0 })
        );
        assert!(stats.warnings.is_empty());
    }

    #[test]
    fn test_non_ascii_digits_are_not_numbers() {
        let stats = analyze_column("n", &rows("n", &["١٢", "٣"]));
        assert_eq!(stats.inferred_type, ColumnType::String);
        assert_eq!(stats.numeric_range, None);

        // A number column always gets a range.
        let stats = analyze_column("n", &rows("n", &["+7", "", "12"]));
        assert_eq!(stats.inferred_type, ColumnType::Number);
        assert_eq!(stats.numeric_range, Some(NumericRange { min: 7.0, max: 12.0 }));
    }

    #[test]
    fn test_empty_ratio_warning() {
        let stats = analyze_column("note", &rows("note", &["", "x", " ", ""]));
        assert_eq!(stats.empty_count, 3);
        assert_eq!(stats.total_count, 4);
        assert_eq!(stats.warnings, vec!["75% of values are empty".to_string()]);
    }

    #[test]
    fn test_ratio_at_threshold_does_not_warn() {
        let stats = analyze_column("c", &rows("c", &["", "a", "b", "c", "d"]));
        assert_eq!(stats.empty_count, 1);
        assert!(stats.warnings.is_empty());
    }

    #[test]
    fn test_missing_key_counts_as_empty() {
        let data = vec![
            Row::from([("a".to_string(), "1".to_string())]),
            Row::new(),
        ];
        let stats = analyze_column("a", &data);
        assert_eq!(stats.empty_count, 1);
        assert_eq!(stats.total_count, 2);
    }

    #[test]
    fn test_type_inference_order() {
        assert_eq!(infer_type(["1", "2"]), ColumnType::Number);
        assert_eq!(infer_type(["true", "FALSE"]), ColumnType::Boolean);
        assert_eq!(infer_type(["2024-01-15", "1999/12/31"]), ColumnType::Date);
        assert_eq!(infer_type(["15/01/2024", "2024-01-15T10:30:00Z"]), ColumnType::Date);
        assert_eq!(infer_type(["1", "abc"]), ColumnType::String);
        assert_eq!(infer_type(["", "  "]), ColumnType::Unknown);
        assert_eq!(infer_type(std::iter::empty()), ColumnType::Unknown);
    }

    #[test]
    fn test_dates_need_length_and_plausible_year() {
        assert_eq!(infer_type(["1/2/2024"]), ColumnType::Date);
        // Too short.
        assert_eq!(infer_type(["1/2/24"]), ColumnType::String);
        assert_eq!(infer_type(["1850-01-01"]), ColumnType::String);
        assert_eq!(infer_type(["2200-01-01"]), ColumnType::String);
    }

    #[test]
    fn test_samples_are_distinct_and_bounded() {
        let stats = analyze_column(
            "c",
            &rows("c", &["a", "b", "a", "", "c", "d", "e", "f", "g"]),
        );
        assert_eq!(stats.sample_values, vec!["a", "b", "c", "d", "e"]);
        assert_eq!(stats.inferred_type, ColumnType::String);
        assert_eq!(stats.numeric_range, None);
    }

    #[test]
    fn test_parse_table() {
        let table = parse_table("id;name\n1;Alice\n2\n").unwrap();
        assert_eq!(table.columns, vec!["id", "name"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[1].get("name"), None);

        let stats = analyze_columns(&table.columns, &table.rows);
        assert_eq!(stats[0].inferred_type, ColumnType::Number);
        assert_eq!(stats[1].empty_count, 1);
        assert_eq!(stats[1].warnings, vec!["50% of values are empty".to_string()]);
    }

    #[test]
    fn test_column_type_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&ColumnType::Number).unwrap(), "\"number\"");
        assert_eq!(ColumnType::Unknown.to_string(), "unknown");
    }
}
