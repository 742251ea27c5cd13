// Dataset module
// In-memory tabular data with pandas-style column type inference

#[cfg(test)]
mod tests;

use std::collections::HashSet;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::Utc;
use serde_json::{Map, Value as JsonValue, json};
use thiserror::Error;
use tracing::debug;

/// Cell contents treated as missing when reading CSV input
const NA_TOKENS: &[&str] = &[
    "", "NA", "N/A", "n/a", "NaN", "nan", "-NaN", "-nan", "null", "NULL", "None", "#N/A", "<NA>",
];

/// `inf` and `NaN` spellings parse as floats but have no JSON form
fn parse_finite(cell: &str) -> Option<f64> {
    cell.trim().parse::<f64>().ok().filter(|number| number.is_finite())
}

/// A single scalar cell value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Number(f64),
    Missing,
}

impl Value {
    #[inline]
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    #[inline]
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    #[inline]
    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text(_))
    }

    /// JSON form used by metadata and exports; missing values become `null`
    #[inline]
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Text(text) => JsonValue::String(text.clone()),
            Self::Number(number) => serde_json::Number::from_f64(*number)
                .map_or(JsonValue::Null, JsonValue::Number),
            Self::Missing => JsonValue::Null,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Number(number) => write!(f, "{number}"),
            Self::Missing => Ok(()),
        }
    }
}

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Row {row} has {actual} values but the dataset has {expected} columns")]
    RaggedRow {
        row: usize,
        expected: usize,
        actual: usize,
    },
    #[error("Duplicate column name: {0}")]
    DuplicateColumn(String),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Ordered rows sharing one ordered column set
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Dataset {
    #[inline]
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self, DatasetError> {
        let mut seen = HashSet::with_capacity(columns.len());
        for column in &columns {
            if !seen.insert(column.as_str()) {
                return Err(DatasetError::DuplicateColumn(column.clone()));
            }
        }

        for (row, values) in rows.iter().enumerate() {
            if values.len() != columns.len() {
                return Err(DatasetError::RaggedRow {
                    row,
                    expected: columns.len(),
                    actual: values.len(),
                });
            }
        }

        Ok(Self { columns, rows })
    }

    /// Parse CSV with a header row.
    ///
    /// A column becomes numeric only when every non-missing cell parses as a
    /// finite float; otherwise all of its cells are kept as text.
    #[inline]
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, DatasetError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(reader);

        let columns: Vec<String> = csv_reader.headers()?.iter().map(String::from).collect();

        let mut raw_rows: Vec<Vec<Option<String>>> = Vec::new();
        for record in csv_reader.records() {
            let record = record?;
            raw_rows.push(
                record
                    .iter()
                    .map(|cell| (!NA_TOKENS.contains(&cell)).then(|| cell.to_string()))
                    .collect(),
            );
        }

        let numeric_columns: Vec<bool> = (0..columns.len())
            .map(|col| {
                raw_rows
                    .iter()
                    .filter_map(|row| row.get(col).and_then(Option::as_ref))
                    .all(|cell| parse_finite(cell).is_some())
            })
            .collect();

        let rows = raw_rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .zip(numeric_columns.iter())
                    .map(|(cell, &numeric)| match cell {
                        None => Value::Missing,
                        Some(cell) if numeric => {
                            parse_finite(&cell).map_or(Value::Text(cell), Value::Number)
                        }
                        Some(cell) => Value::Text(cell),
                    })
                    .collect()
            })
            .collect::<Vec<Vec<Value>>>();

        debug!(
            "Parsed CSV dataset with {} columns and {} rows",
            columns.len(),
            rows.len()
        );

        Self::new(columns, rows)
    }

    #[inline]
    pub fn from_csv_path<P: AsRef<Path>>(path: P) -> Result<Self, DatasetError> {
        let file = File::open(path.as_ref())?;
        Self::from_csv_reader(file)
    }

    #[inline]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[inline]
    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    #[inline]
    pub fn row(&self, index: usize) -> Option<&[Value]> {
        self.rows.get(index).map(Vec::as_slice)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Iterate the values of one column, top to bottom
    #[inline]
    pub fn column_values(&self, column: usize) -> impl Iterator<Item = &Value> {
        self.rows.iter().filter_map(move |row| row.get(column))
    }

    /// The row as an ordered JSON object keyed by column name
    #[inline]
    pub fn record_map(&self, row: usize) -> Option<Map<String, JsonValue>> {
        let values = self.rows.get(row)?;
        Some(
            self.columns
                .iter()
                .zip(values)
                .map(|(column, value)| (column.clone(), value.to_json()))
                .collect(),
        )
    }

    /// First `n` rows as a new dataset
    #[inline]
    pub fn head(&self, n: usize) -> Self {
        Self {
            columns: self.columns.clone(),
            rows: self.rows.iter().take(n).cloned().collect(),
        }
    }

    /// Same columns, different rows; rows must already match the column count
    pub(crate) fn with_rows(&self, rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns: self.columns.clone(),
            rows,
        }
    }

    #[inline]
    pub fn to_csv_string(&self) -> Result<String, DatasetError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row.iter().map(ToString::to_string))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| DatasetError::Io(e.into_error()))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    #[inline]
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<(), DatasetError> {
        let content = self.to_csv_string()?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Download-style JSON document with dataset info and row objects
    #[inline]
    pub fn to_json_export(&self) -> JsonValue {
        let data: Vec<JsonValue> = (0..self.len())
            .filter_map(|row| self.record_map(row))
            .map(JsonValue::Object)
            .collect();

        json!({
            "dataset_info": {
                "rows": self.len(),
                "columns": self.width(),
                "processing_date": Utc::now().format("%Y-%m-%d").to_string(),
            },
            "data": data,
        })
    }
}
