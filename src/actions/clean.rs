use std::collections::HashSet;

use crate::dataset::{Dataset, Value};

/// Row counts before and after cleaning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanSummary {
    pub initial_rows: usize,
    pub duplicates_removed: usize,
    pub missing_removed: usize,
    pub final_rows: usize,
}

#[derive(Debug, PartialEq, Eq, Hash)]
enum CellKey<'a> {
    Text(&'a str),
    Number(u64),
    Missing,
}

impl<'a> From<&'a Value> for CellKey<'a> {
    fn from(value: &'a Value) -> Self {
        match value {
            Value::Text(text) => Self::Text(text),
            // -0.0 and 0.0 compare equal, so they must hash equal
            Value::Number(number) if *number == 0.0 => Self::Number(0.0_f64.to_bits()),
            Value::Number(number) => Self::Number(number.to_bits()),
            Value::Missing => Self::Missing,
        }
    }
}

/// Drop exact duplicate rows, keeping the first occurrence, then drop rows
/// with any missing value
#[inline]
pub fn clean_dataset(dataset: &Dataset) -> (Dataset, CleanSummary) {
    let initial_rows = dataset.len();

    let mut seen = HashSet::with_capacity(initial_rows);
    let unique: Vec<&Vec<Value>> = dataset
        .rows()
        .iter()
        .filter(|row| seen.insert(row.iter().map(CellKey::from).collect::<Vec<_>>()))
        .collect();
    let duplicates_removed = initial_rows - unique.len();

    let complete: Vec<Vec<Value>> = unique
        .into_iter()
        .filter(|row| !row.iter().any(Value::is_missing))
        .cloned()
        .collect();
    let missing_removed = initial_rows - duplicates_removed - complete.len();

    let summary = CleanSummary {
        initial_rows,
        duplicates_removed,
        missing_removed,
        final_rows: complete.len(),
    };
    (dataset.with_rows(complete), summary)
}
