use super::*;
use tempfile::TempDir;

const PEOPLE_CSV: &str = "\
Name,Age,City,Occupation
John Doe,29,New York,Engineer
Jane Smith,34,London,Doctor
Bob Johnson,,Paris,NA
";

#[test]
fn csv_column_type_inference() {
    let dataset = Dataset::from_csv_reader(PEOPLE_CSV.as_bytes()).expect("csv should parse");

    assert_eq!(dataset.columns(), ["Name", "Age", "City", "Occupation"]);
    assert_eq!(dataset.len(), 3);
    assert_eq!(dataset.rows()[0][0], Value::text("John Doe"));
    assert_eq!(dataset.rows()[0][1], Value::Number(29.0));
    assert_eq!(dataset.rows()[2][1], Value::Missing);
    assert_eq!(dataset.rows()[2][3], Value::Missing);
}

#[test]
fn mixed_column_stays_text() {
    let csv = "code,count\nA1,3\n42,4\n";
    let dataset = Dataset::from_csv_reader(csv.as_bytes()).expect("csv should parse");

    assert_eq!(dataset.rows()[1][0], Value::text("42"));
    assert_eq!(dataset.rows()[1][1], Value::Number(4.0));
}

#[test]
fn ragged_rows_are_rejected() {
    let result = Dataset::new(
        vec!["a".to_string(), "b".to_string()],
        vec![vec![Value::text("x")]],
    );
    assert!(matches!(
        result,
        Err(DatasetError::RaggedRow {
            row: 0,
            expected: 2,
            actual: 1
        })
    ));

    let csv = "a,b\n1,2\n3\n";
    assert!(Dataset::from_csv_reader(csv.as_bytes()).is_err());
}

#[test]
fn duplicate_columns_are_rejected() {
    let result = Dataset::new(vec!["a".to_string(), "a".to_string()], Vec::new());
    assert!(matches!(result, Err(DatasetError::DuplicateColumn(name)) if name == "a"));
}

#[test]
fn number_display_is_shortest_form() {
    assert_eq!(Value::Number(29.0).to_string(), "29");
    assert_eq!(Value::Number(1.5).to_string(), "1.5");
    assert_eq!(Value::Missing.to_string(), "");
}

#[test]
fn record_map_preserves_column_order() {
    let dataset = Dataset::from_csv_reader(PEOPLE_CSV.as_bytes()).expect("csv should parse");
    let record = dataset.record_map(2).expect("row exists");

    let keys: Vec<&str> = record.keys().map(String::as_str).collect();
    assert_eq!(keys, ["Name", "Age", "City", "Occupation"]);
    assert_eq!(record["Age"], JsonValue::Null);
    assert_eq!(record["City"], json!("Paris"));
    assert!(dataset.record_map(3).is_none());
}

#[test]
fn csv_export_round_trips() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("people.csv");

    let dataset = Dataset::from_csv_reader(PEOPLE_CSV.as_bytes()).expect("csv should parse");
    dataset.write_csv(&path).expect("should write csv");

    let reloaded = Dataset::from_csv_path(&path).expect("should reload csv");
    assert_eq!(dataset, reloaded);
}

#[test]
fn json_export_shape() {
    let dataset = Dataset::from_csv_reader(PEOPLE_CSV.as_bytes()).expect("csv should parse");
    let export = dataset.head(2).to_json_export();

    assert_eq!(export["dataset_info"]["rows"], json!(2));
    assert_eq!(export["dataset_info"]["columns"], json!(4));
    assert_eq!(export["data"][1]["Name"], json!("Jane Smith"));
    assert_eq!(export["data"][1]["Age"], json!(34.0));
}

#[test]
fn non_finite_cells_keep_column_as_text() {
    let csv = "score,ratio\n1.5,inf\n2,0.25\n-Infinity,1\n";
    let dataset = Dataset::from_csv_reader(csv.as_bytes()).expect("csv should parse");

    assert_eq!(dataset.rows()[0][1], Value::text("inf"));
    assert_eq!(dataset.rows()[1][1], Value::text("0.25"));
    assert_eq!(dataset.rows()[2][0], Value::text("-Infinity"));

    let record = dataset.record_map(0).expect("row 0");
    assert_eq!(record["ratio"], serde_json::json!("inf"));
    assert_eq!(record["score"], serde_json::json!("1.5"));
}
