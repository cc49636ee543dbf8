//! Spreadsheet and delimited-text adapter.
//!
//! A source is one sheet: the first row names the columns and the second
//! row decides each column's type. Workbooks (xlsx, xlsm, xls, xlsb, ods)
//! are read with calamine, delimited text with csv. Files come from a local
//! path or an http(s) URL; parsing runs on the blocking pool.
//!
//! The query text selects a sheet by name; a blank query reads the
//! configured sheet, or the first one.

use super::{SourceAdapter, bounded};
use crate::{
    Result,
    config::{ConnectorSettings, SpreadsheetConfig, SpreadsheetLocation},
    error::ConnectorError,
    models::{ConnectionInfo, Engine, FieldDescriptor, QueryOutput, SchemaSnapshot, TableFields},
    normalize::{float_to_json, infer_cell_type, rows_from_matrix, typed_cell, unique_headers},
};
use async_trait::async_trait;
use calamine::{Data, Reader};
use serde_json::Value as JsonValue;
use std::io::Cursor;

/// Table name reported for delimited text, which has no sheets.
const DELIMITED_SHEET_NAME: &str = "Sheet1";

/// Why a file could not be read as a sheet.
#[derive(Debug, thiserror::Error)]
pub enum SheetError {
    /// The file has no header row
    #[error("file contains no rows")]
    Empty,

    /// The workbook has no sheets at all
    #[error("workbook contains no sheets")]
    NoSheets,

    /// The requested sheet is not in the workbook
    #[error("sheet '{0}' does not exist")]
    MissingSheet(String),

    /// A remote file answered with a non-success status
    #[error("server answered HTTP {0}")]
    Status(reqwest::StatusCode),

    /// Malformed delimited text
    #[error(transparent)]
    Delimited(#[from] csv::Error),

    /// Unreadable workbook
    #[error(transparent)]
    Workbook(#[from] calamine::Error),
}

/// One sheet, split into header and data rows.
#[derive(Debug, Clone, PartialEq)]
struct SheetData {
    name: String,
    headers: Vec<String>,
    /// Type label per column, taken from the first data row
    types: Vec<&'static str>,
    rows: Vec<Vec<JsonValue>>,
}

impl SheetData {
    fn fields(&self) -> Vec<FieldDescriptor> {
        self.headers
            .iter()
            .enumerate()
            .map(|(index, name)| {
                let data_type = self.types.get(index).copied().unwrap_or("text");
                FieldDescriptor::with_selected(name, data_type, true)
            })
            .collect()
    }
}

/// Adapter for a single spreadsheet or delimited text file.
#[derive(Debug, Clone)]
pub struct SpreadsheetAdapter {
    config: SpreadsheetConfig,
    settings: ConnectorSettings,
}

impl SpreadsheetAdapter {
    /// Creates an adapter; the file is not read until a call.
    pub const fn new(config: SpreadsheetConfig, settings: ConnectorSettings) -> Self {
        Self { config, settings }
    }

    /// Reads the raw file bytes from disk or over HTTP.
    async fn load(&self) -> Result<Vec<u8>> {
        let name = self.config.location.display_name();

        match &self.config.location {
            SpreadsheetLocation::File(path) => tokio::fs::read(path).await.map_err(|e| {
                ConnectorError::connection_failed(format!("Failed to open spreadsheet '{name}'"), e)
            }),
            SpreadsheetLocation::Remote(url) => {
                let client = reqwest::Client::builder()
                    .connect_timeout(self.settings.connect_timeout)
                    .timeout(self.settings.query_timeout)
                    .user_agent(concat!("formbind/", env!("CARGO_PKG_VERSION")))
                    .build()
                    .map_err(|e| {
                        ConnectorError::connection_failed("Failed to build HTTP client", e)
                    })?;

                let response = client.get(url.clone()).send().await.map_err(|e| {
                    ConnectorError::connection_failed(
                        format!("Failed to download spreadsheet '{name}'"),
                        e.without_url(),
                    )
                })?;
                if !response.status().is_success() {
                    return Err(ConnectorError::connection_failed(
                        format!("Failed to download spreadsheet '{name}'"),
                        SheetError::Status(response.status()),
                    ));
                }

                let bytes = response.bytes().await.map_err(|e| {
                    ConnectorError::connection_failed(
                        format!("Failed to download spreadsheet '{name}'"),
                        e.without_url(),
                    )
                })?;
                tracing::debug!("Downloaded {} bytes for spreadsheet {}", bytes.len(), name);
                Ok(bytes.to_vec())
            }
        }
    }

    /// Loads and parses one sheet. Parse failures are returned separately so
    /// callers can classify them.
    async fn read_sheet(
        &self,
        sheet: Option<String>,
    ) -> Result<std::result::Result<SheetData, SheetError>> {
        let bytes = self.load().await?;
        let delimiter = delimiter_for(self.config.location.extension().as_deref());

        bounded("Spreadsheet parse", self.settings.query_timeout, async move {
            tokio::task::spawn_blocking(move || match delimiter {
                Some(delimiter) => parse_delimited(&bytes, delimiter),
                None => parse_workbook(bytes, sheet.as_deref()),
            })
            .await
            .map_err(|e| ConnectorError::query_failed("Spreadsheet worker task failed", e))
        })
        .await
    }
}

#[async_trait]
impl SourceAdapter for SpreadsheetAdapter {
    fn engine(&self) -> Engine {
        Engine::Spreadsheet
    }

    async fn test(&self) -> Result<SchemaSnapshot> {
        let file_name = self.config.location.display_name();
        let sheet = self
            .read_sheet(self.config.sheet.clone())
            .await?
            .map_err(|e| {
                ConnectorError::introspection_failed(format!("Failed to read '{file_name}'"), e)
            })?;

        let mut fields = TableFields::new();
        fields.insert(sheet.name.clone(), sheet.fields());

        Ok(SchemaSnapshot {
            info: ConnectionInfo {
                file: Some(file_name),
                row_count: Some(sheet.rows.len() as u64),
                ..Default::default()
            },
            tables: Vec::new(),
            fields,
        })
    }

    async fn query(&self, query: &str) -> Result<QueryOutput> {
        let requested = query.trim();
        if !requested.is_empty()
            && delimiter_for(self.config.location.extension().as_deref()).is_some()
        {
            tracing::debug!(
                "Ignoring sheet name '{}': delimited text has a single sheet",
                requested
            );
        }
        let sheet_name = if requested.is_empty() {
            self.config.sheet.clone()
        } else {
            Some(requested.to_string())
        };

        let sheet = self
            .read_sheet(sheet_name)
            .await?
            .map_err(|e| ConnectorError::query_failed("Failed to read sheet", e))?;

        let fields = sheet.fields();
        let limit = usize::try_from(self.settings.row_limit).unwrap_or(usize::MAX);
        let rows = sheet.rows.into_iter().take(limit).collect();

        Ok(QueryOutput {
            rows: rows_from_matrix(&sheet.headers, rows),
            fields: Some(fields),
        })
    }
}

/// Delimiter for text formats; `None` means the file is a workbook.
fn delimiter_for(extension: Option<&str>) -> Option<u8> {
    match extension {
        Some("csv" | "txt") => Some(b','),
        Some("tsv" | "tab") => Some(b'\t'),
        _ => None,
    }
}

fn parse_delimited(bytes: &[u8], delimiter: u8) -> std::result::Result<SheetData, SheetError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(bytes);

    let mut records = Vec::new();
    for record in reader.records() {
        let record = record?;
        records.push(record.iter().map(ToString::to_string).collect::<Vec<_>>());
    }

    let mut records = records.into_iter();
    let header = records.next().ok_or(SheetError::Empty)?;
    let rows: Vec<Vec<String>> = records.collect();

    let types: Vec<&'static str> = header
        .iter()
        .enumerate()
        .map(|(index, _)| {
            rows.first()
                .and_then(|row| row.get(index))
                .map_or("text", |cell| infer_cell_type(cell))
        })
        .collect();

    let rows = rows
        .iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .map(|(index, cell)| typed_cell(cell, types.get(index).copied().unwrap_or("text")))
                .collect()
        })
        .collect();

    Ok(SheetData {
        name: DELIMITED_SHEET_NAME.to_string(),
        headers: unique_headers(&header),
        types,
        rows,
    })
}

fn parse_workbook(
    bytes: Vec<u8>,
    sheet: Option<&str>,
) -> std::result::Result<SheetData, SheetError> {
    let mut workbook = calamine::open_workbook_auto_from_rs(Cursor::new(bytes))?;
    let names = workbook.sheet_names();

    let name = match sheet {
        Some(wanted) => names
            .iter()
            .find(|name| name.eq_ignore_ascii_case(wanted))
            .cloned()
            .ok_or_else(|| SheetError::MissingSheet(wanted.to_string()))?,
        None => names.first().cloned().ok_or(SheetError::NoSheets)?,
    };

    let range = workbook.worksheet_range(&name)?;
    let mut rows = range.rows();
    let header = rows.next().ok_or(SheetError::Empty)?;
    let header: Vec<String> = header.iter().map(ToString::to_string).collect();
    let data: Vec<Vec<JsonValue>> = rows.map(|row| row.iter().map(cell_to_json).collect()).collect();

    let first = range.rows().nth(1);
    let types = (0..header.len())
        .map(|index| first.and_then(|row| row.get(index)).map_or("text", cell_type))
        .collect();

    Ok(SheetData {
        name,
        headers: unique_headers(&header),
        types,
        rows: data,
    })
}

const fn cell_type(cell: &Data) -> &'static str {
    match cell {
        Data::Int(_) | Data::Float(_) => "number",
        Data::DateTime(_) | Data::DateTimeIso(_) => "datetime",
        Data::Bool(_) => "boolean",
        _ => "text",
    }
}

fn cell_to_json(cell: &Data) -> JsonValue {
    match cell {
        Data::Int(v) => JsonValue::from(*v),
        Data::Float(v) => float_to_json(*v),
        Data::Bool(v) => JsonValue::Bool(*v),
        Data::String(v) | Data::DateTimeIso(v) | Data::DurationIso(v) => JsonValue::String(v.clone()),
        Data::DateTime(v) => v.as_datetime().map_or_else(
            || float_to_json(v.as_f64()),
            |d| JsonValue::String(d.format("%Y-%m-%dT%H:%M:%S").to_string()),
        ),
        Data::Error(_) | Data::Empty => JsonValue::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_delimited_header_and_types() {
        let sheet = parse_delimited(b"Col1,Col2\nabc,42\ndef,7\n", b',').unwrap();

        assert_eq!(sheet.name, "Sheet1");
        assert_eq!(sheet.headers, ["Col1", "Col2"]);
        assert_eq!(
            sheet.fields(),
            vec![
                FieldDescriptor::with_selected("Col1", "text", true),
                FieldDescriptor::with_selected("Col2", "number", true),
            ]
        );
        assert_eq!(sheet.rows[0], vec![json!("abc"), json!(42)]);
    }

    #[test]
    fn test_delimited_cells_follow_column_type() {
        let sheet = parse_delimited(b"zip,code,qty\n02134,abc,3\n00501,42,n/a\n", b',').unwrap();

        assert_eq!(sheet.types, ["text", "text", "number"]);
        assert_eq!(sheet.rows[0], vec![json!("02134"), json!("abc"), json!(3)]);
        assert_eq!(sheet.rows[1], vec![json!("00501"), json!("42"), json!("n/a")]);
    }

    #[test]
    fn test_delimited_without_data_rows_defaults_to_text() {
        let sheet = parse_delimited(b"when,flag\n", b',').unwrap();
        assert_eq!(sheet.types, ["text", "text"]);
        assert!(sheet.rows.is_empty());
    }

    #[test]
    fn test_empty_file_is_an_error() {
        assert!(matches!(parse_delimited(b"", b','), Err(SheetError::Empty)));
    }

    #[test]
    fn test_duplicate_and_blank_headers() {
        let sheet = parse_delimited(b"id,id,\n1,2,3\n", b',').unwrap();
        assert_eq!(sheet.headers, ["id", "id_2", "Column3"]);
    }

    #[test]
    fn test_workbook_sheet_selection() {
        let mut workbook = rust_xlsxwriter::Workbook::new();
        let first = workbook.add_worksheet();
        first.set_name("People").unwrap();
        first.write_string(0, 0, "name").unwrap();
        first.write_string(0, 1, "age").unwrap();
        first.write_string(1, 0, "Ada").unwrap();
        first.write_number(1, 1, 36).unwrap();
        let second = workbook.add_worksheet();
        second.set_name("Flags").unwrap();
        second.write_string(0, 0, "enabled").unwrap();
        second.write_boolean(1, 0, true).unwrap();
        let bytes = workbook.save_to_buffer().unwrap();

        let sheet = parse_workbook(bytes.clone(), None).unwrap();
        assert_eq!(sheet.name, "People");
        assert_eq!(sheet.types, ["text", "number"]);
        assert_eq!(sheet.rows[0][1], json!(36.0));

        let sheet = parse_workbook(bytes.clone(), Some("flags")).unwrap();
        assert_eq!(sheet.name, "Flags");
        assert_eq!(sheet.types, ["boolean"]);

        assert!(matches!(
            parse_workbook(bytes, Some("Missing")),
            Err(SheetError::MissingSheet(_))
        ));
    }

    #[test]
    fn test_delimiter_for_extension() {
        assert_eq!(delimiter_for(Some("csv")), Some(b','));
        assert_eq!(delimiter_for(Some("tsv")), Some(b'\t'));
        assert_eq!(delimiter_for(Some("xlsx")), None);
        assert_eq!(delimiter_for(None), None);
    }
}
