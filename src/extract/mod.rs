// Record extraction
// Reduces each dataset row to one text string for embedding


use itertools::Itertools;
use thiserror::Error;
use tracing::{debug, info};

use crate::dataset::{Dataset, Value};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("No text columns found in the dataset")]
    NoTextualData,
}

/// A dataset row reduced to the text that gets embedded
#[derive(Debug, Clone, PartialEq)]
pub struct TextRecord<'a> {
    pub row: usize,
    pub text: String,
    pub source: &'a [Value],
}

/// Result of extracting text records from a dataset
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction<'a> {
    pub records: Vec<TextRecord<'a>>,
    pub textual_columns: Vec<String>,
    /// Row indices whose textual values were all missing
    pub skipped_rows: Vec<usize>,
    pub row_count: usize,
}

impl Extraction<'_> {
    #[inline]
    pub fn skipped_count(&self) -> usize {
        self.skipped_rows.len()
    }

    #[inline]
    pub fn texts(&self) -> Vec<String> {
        self.records.iter().map(|record| record.text.clone()).collect()
    }
}

/// Indices of columns holding at least one non-missing text value
#[inline]
pub fn textual_column_indices(dataset: &Dataset) -> Vec<usize> {
    (0..dataset.width())
        .filter(|&column| dataset.column_values(column).any(Value::is_text))
        .collect()
}

/// Extract one text record per row that has textual content.
///
/// Non-missing values of the textual columns are joined with a single space
/// in column order. The dataset is only read.
#[inline]
pub fn extract_text_records(dataset: &Dataset) -> Result<Extraction<'_>, ExtractError> {
    let columns = textual_column_indices(dataset);
    if columns.is_empty() {
        info!(
            "No textual columns among {} columns, nothing to extract",
            dataset.width()
        );
        return Err(ExtractError::NoTextualData);
    }

    let mut records = Vec::with_capacity(dataset.len());
    let mut skipped_rows = Vec::new();

    for (row, values) in dataset.rows().iter().enumerate() {
        let text = columns
            .iter()
            .filter_map(|&column| values.get(column))
            .filter(|value| !value.is_missing())
            .join(" ");

        if text.trim().is_empty() {
            debug!("Skipping row {} with no textual content", row);
            skipped_rows.push(row);
        } else {
            records.push(TextRecord {
                row,
                text,
                source: values,
            });
        }
    }

    let textual_columns = columns
        .iter()
        .map(|&column| dataset.columns()[column].clone())
        .collect();

    debug!(
        "Extracted {} text records, skipped {} rows",
        records.len(),
        skipped_rows.len()
    );

    Ok(Extraction {
        records,
        textual_columns,
        skipped_rows,
        row_count: dataset.len(),
    })
}
