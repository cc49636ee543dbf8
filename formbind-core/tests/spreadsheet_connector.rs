//! Spreadsheet connector tests against CSV and XLSX files on disk.

#![cfg(feature = "spreadsheet")]
#![allow(clippy::unwrap_used)]

use formbind_core::{Connector, FieldDescriptor};
use serde_json::json;
use std::path::Path;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn source(path: &Path) -> serde_json::Value {
    json!({ "filePath": path.to_string_lossy() })
}

fn write_workbook(path: &Path) {
    let mut workbook = rust_xlsxwriter::Workbook::new();
    let people = workbook.add_worksheet();
    people.set_name("People").unwrap();
    people.write_string(0, 0, "Col1").unwrap();
    people.write_string(0, 1, "Col2").unwrap();
    people.write_string(1, 0, "abc").unwrap();
    people.write_number(1, 1, 42).unwrap();
    people.write_string(2, 0, "def").unwrap();
    people.write_number(2, 1, 7).unwrap();

    let orders = workbook.add_worksheet();
    orders.set_name("Orders").unwrap();
    orders.write_string(0, 0, "order").unwrap();
    orders.write_string(1, 0, "A-1").unwrap();

    workbook.save(path).unwrap();
}

#[tokio::test]
async fn test_csv_connection_marks_every_column_selected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("people.csv");
    std::fs::write(&path, "Col1,Col2\nabc,42\n").unwrap();

    let result = Connector::default()
        .test_connection("spreadsheet-file", &source(&path))
        .await;

    assert!(result.success, "unexpected failure: {:?}", result.error);
    assert_eq!(result.tables, Some(Vec::new()));
    assert_eq!(result.info.unwrap().row_count, Some(1));

    let fields = result.fields.unwrap();
    assert_eq!(
        fields["Sheet1"],
        vec![
            FieldDescriptor::with_selected("Col1", "text", true),
            FieldDescriptor::with_selected("Col2", "number", true),
        ]
    );
}

#[tokio::test]
async fn test_csv_rows_match_their_field_types() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("addresses.csv");
    std::fs::write(&path, "zip,code,qty\n02134,abc,3\n00501,42,n/a\n").unwrap();
    let connector = Connector::default();

    let result = connector
        .test_connection("spreadsheet-file", &source(&path))
        .await;
    let fields = result.fields.unwrap();
    let types: Vec<&str> = fields["Sheet1"].iter().map(|f| f.data_type.as_str()).collect();
    assert_eq!(types, ["text", "text", "number"]);

    // A sheet name means nothing to delimited text and is ignored.
    let result = connector
        .execute_query("spreadsheet-file", &source(&path), "Sheet7")
        .await;
    assert!(result.is_success(), "unexpected error: {:?}", result.error);
    assert_eq!(
        result.rows,
        vec![
            json!({"zip": "02134", "code": "abc", "qty": 3}),
            json!({"zip": "00501", "code": "42", "qty": "n/a"}),
        ]
    );
    for row in &result.rows {
        assert!(row["zip"].is_string());
        assert!(row["code"].is_string());
    }
}

#[tokio::test]
async fn test_xlsx_connection_describes_first_sheet() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("people.xlsx");
    write_workbook(&path);

    let result = Connector::default()
        .test_connection("spreadsheet-file", &source(&path))
        .await;

    assert!(result.success, "unexpected failure: {:?}", result.error);
    assert_eq!(result.message, "Spreadsheet connection successful (people.xlsx)");
    let fields = result.fields.unwrap();
    assert_eq!(fields.len(), 1);
    assert_eq!(
        fields["People"],
        vec![
            FieldDescriptor::with_selected("Col1", "text", true),
            FieldDescriptor::with_selected("Col2", "number", true),
        ]
    );
}

#[tokio::test]
async fn test_xlsx_query_selects_sheet_by_name() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("people.xlsx");
    write_workbook(&path);
    let connector = Connector::default();

    let result = connector
        .execute_query("spreadsheet-file", &source(&path), "")
        .await;
    assert!(result.is_success(), "unexpected error: {:?}", result.error);
    assert_eq!(
        result.rows,
        vec![
            json!({"Col1": "abc", "Col2": 42.0}),
            json!({"Col1": "def", "Col2": 7.0}),
        ]
    );

    let result = connector
        .execute_query("spreadsheet-file", &source(&path), "orders")
        .await;
    assert_eq!(result.rows, vec![json!({"order": "A-1"})]);

    let result = connector
        .execute_query("spreadsheet-file", &source(&path), "Missing")
        .await;
    assert!(result.rows.is_empty());
    assert!(result.error.unwrap().contains("sheet 'Missing' does not exist"));
}

#[tokio::test]
async fn test_empty_file_fails() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("empty.csv");
    std::fs::write(&path, "").unwrap();

    let result = Connector::default()
        .test_connection("spreadsheet-file", &source(&path))
        .await;

    assert!(!result.success);
    assert!(result.message.starts_with("Spreadsheet connection failed"));
    assert!(result.fields.is_none());
}

#[tokio::test]
async fn test_missing_file_fails() {
    let dir = TempDir::new().unwrap();

    let result = Connector::default()
        .execute_query(
            "spreadsheet-file",
            &source(&dir.path().join("absent.xlsx")),
            "",
        )
        .await;

    assert!(result.rows.is_empty());
    assert!(result.error.unwrap().starts_with("Spreadsheet query failed"));
}

#[tokio::test]
async fn test_unreachable_remote_file_fails() {
    let started = Instant::now();

    let result = Connector::default()
        .test_connection(
            "spreadsheet-file",
            &json!({"fileUrl": "http://127.0.0.1:9/exports/people.csv"}),
        )
        .await;

    assert!(!result.success);
    assert!(result.message.starts_with("Spreadsheet connection failed"));
    assert!(result.fields.is_none());
    assert!(started.elapsed() < Duration::from_secs(10));
}
