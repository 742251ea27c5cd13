use std::fmt::Write;

pub const DEFAULT_COUNT: usize = 10;
/// Upper bound on rows produced without a text-generation model
pub const FALLBACK_ROW_LIMIT: usize = 15;

const HEADER: &str = "Name,Age,City,Occupation";

const CLEAN_ROWS: [&str; 5] = [
    "John Doe,29,New York,Engineer",
    "Jane Smith,34,London,Doctor",
    "Bob Johnson,41,Paris,Teacher",
    "Alice Brown,27,Tokyo,Designer",
    "Charlie Davis,38,Sydney,Accountant",
];

const NOISY_ROWS: [&str; 5] = [
    "John Doe,29,New York,Engineer",
    "Jane Smith,34,London,Doctor",
    "Bob Johnson,41,Paris,Teacher",
    "Alice Brown,27, noisy Tokyo,Designer",
    "Charlie Davis,38,Sydney, noisy Accountant",
];

/// Deterministic sample rows as CSV, used when no model can generate data.
///
/// Always holds the five template rows, plus filler rows up to
/// `min(count, FALLBACK_ROW_LIMIT)`.
#[inline]
pub fn fallback_rows(count: usize, noisy: bool) -> String {
    let template = if noisy { &NOISY_ROWS } else { &CLEAN_ROWS };

    let mut csv = String::with_capacity(64 * FALLBACK_ROW_LIMIT);
    csv.push_str(HEADER);
    csv.push('\n');
    for row in template {
        csv.push_str(row);
        csv.push('\n');
    }

    for i in template.len()..count.min(FALLBACK_ROW_LIMIT) {
        let _ = writeln!(
            csv,
            "Example Person {i},{},City {i},Occupation {i}",
            20 + i
        );
    }

    csv
}
