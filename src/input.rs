//! Producer input: labeled text tables read from delimited files.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::errors::StoreError;
use crate::types::{DateText, Label, RowIdx, SourceName};

/// One labeled text example from a source table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceRow {
    /// Position of the row in its source table.
    pub idx: RowIdx,
    /// ISO date when parseable, raw text otherwise, empty when absent.
    pub date: DateText,
    /// Raw post text.
    pub text: String,
    /// Source/author identifier.
    pub name: SourceName,
    /// Class label.
    pub label: Label,
    /// Extra numeric columns (LIWC scores), in header order.
    #[serde(default)]
    pub scores: Vec<f32>,
}

/// Delimited-file parsing options.
#[derive(Clone, Debug)]
pub struct CsvOptions {
    /// Field delimiter byte.
    pub delimiter: u8,
    /// Whether double quotes delimit fields.
    pub quoting: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quoting: true,
        }
    }
}

const DATE_COLUMN: &str = "date";
const TEXT_COLUMN: &str = "text";
const NAME_COLUMN: &str = "name";
const LABEL_COLUMN: &str = "label";

/// Read a `date,text,name,label[,score...]` table from `path`.
pub fn read_rows_csv(path: &Path, options: &CsvOptions) -> Result<Vec<SourceRow>, StoreError> {
    let file = File::open(path)?;
    rows_from_reader(file, options)
        .map_err(|err| match err {
            StoreError::Input(msg) => StoreError::Input(format!("{}: {msg}", path.display())),
            other => other,
        })
}

/// Parse a table from any reader. Columns other than the four named ones are
/// parsed as `f32` scores.
pub fn rows_from_reader<R: Read>(reader: R, options: &CsvOptions) -> Result<Vec<SourceRow>, StoreError> {
    let mut reader = ReaderBuilder::new()
        .delimiter(options.delimiter)
        .quoting(options.quoting)
        .has_headers(true)
        .from_reader(reader);

    let headers = reader.headers().map_err(csv_err)?.clone();
    let position = |name: &str| headers.iter().position(|header| header.trim() == name);
    let text_at = position(TEXT_COLUMN)
        .ok_or_else(|| StoreError::Input(format!("missing '{TEXT_COLUMN}' column")))?;
    let label_at = position(LABEL_COLUMN)
        .ok_or_else(|| StoreError::Input(format!("missing '{LABEL_COLUMN}' column")))?;
    let date_at = position(DATE_COLUMN);
    let name_at = position(NAME_COLUMN);
    let score_at: Vec<usize> = headers
        .iter()
        .enumerate()
        .filter(|(_, header)| {
            !matches!(
                header.trim(),
                DATE_COLUMN | TEXT_COLUMN | NAME_COLUMN | LABEL_COLUMN
            ) && !header.trim().is_empty()
        })
        .map(|(at, _)| at)
        .collect();

    let mut rows = Vec::new();
    for (row_no, record) in reader.records().enumerate() {
        let record = record.map_err(csv_err)?;
        let field = |at: Option<usize>| at.and_then(|at| record.get(at)).unwrap_or("");
        let label = parse_label(field(Some(label_at)))
            .ok_or_else(|| StoreError::Input(format!("row {row_no}: invalid label")))?;
        let scores = score_at
            .iter()
            .map(|at| {
                let raw = field(Some(*at)).trim();
                raw.parse::<f32>().map_err(|_| {
                    StoreError::Input(format!(
                        "row {row_no}: score column '{}' is not numeric: '{raw}'",
                        &headers[*at]
                    ))
                })
            })
            .collect::<Result<Vec<f32>, StoreError>>()?;
        rows.push(SourceRow {
            idx: row_no as RowIdx,
            date: normalize_date(field(date_at)),
            text: field(Some(text_at)).to_string(),
            name: field(name_at).trim().to_string(),
            label,
            scores,
        });
    }
    Ok(rows)
}

/// Normalize a date cell to `YYYY-MM-DD` when it parses; missing dates become `""`.
pub fn normalize_date(raw: &str) -> DateText {
    let value = raw.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("nan") || value.eq_ignore_ascii_case("none")
    {
        return String::new();
    }
    if let Ok(date) = DateTime::parse_from_rfc3339(value) {
        return date.date_naive().format("%Y-%m-%d").to_string();
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(date) = NaiveDateTime::parse_from_str(value, format) {
            return date.date().format("%Y-%m-%d").to_string();
        }
    }
    for format in ["%Y-%m-%d", "%d.%m.%Y", "%m/%d/%Y", "%b %d, %Y", "%B %d, %Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return date.format("%Y-%m-%d").to_string();
        }
    }
    value.to_string()
}

fn parse_label(raw: &str) -> Option<Label> {
    match raw.trim() {
        "0" | "0.0" => Some(0),
        "1" | "1.0" => Some(1),
        _ => None,
    }
}

fn csv_err(err: csv::Error) -> StoreError {
    StoreError::Input(err.to_string())
}
