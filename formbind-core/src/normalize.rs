//! Conversion of engine-native result shapes into the uniform model.
//!
//! Catalog engines report schema as a flat list of `(table, column, type)`
//! rows; header-row sources report a matrix whose first row names the
//! columns. Both end up as rows of JSON objects plus field descriptors.

use crate::models::{FieldDescriptor, TableFields};
use base64::Engine as _;
use serde_json::{Map, Value as JsonValue};
use std::collections::{HashMap, HashSet};

/// One column as read from an engine's metadata catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogColumn {
    /// Owning table
    pub table: String,
    /// Column name
    pub name: String,
    /// Declared type
    pub data_type: String,
}

impl CatalogColumn {
    /// Creates a catalog column.
    pub fn new(
        table: impl Into<String>,
        name: impl Into<String>,
        data_type: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// Groups catalog columns by table.
///
/// Returns the table names in the order they first appear, and a mapping
/// from table name to its fields in the engine's own column order.
pub fn group_by_table(columns: Vec<CatalogColumn>) -> (Vec<String>, TableFields) {
    let mut tables = Vec::new();
    let mut fields = TableFields::new();

    for column in columns {
        let entry = fields.entry(column.table.clone()).or_insert_with(|| {
            tables.push(column.table.clone());
            Vec::new()
        });
        entry.push(FieldDescriptor::new(column.name, column.data_type));
    }

    (tables, fields)
}

/// Makes header names usable as unique field names.
///
/// Blank headers become `Column<n>` (1-based position); repeated names get a
/// `_2`, `_3`, ... suffix.
pub fn unique_headers<S: AsRef<str>>(headers: &[S]) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut counters: HashMap<String, usize> = HashMap::new();
    let mut result = Vec::with_capacity(headers.len());

    for (index, header) in headers.iter().enumerate() {
        let trimmed = header.as_ref().trim();
        let base = if trimmed.is_empty() {
            format!("Column{}", index + 1)
        } else {
            trimmed.to_string()
        };

        let mut candidate = base.clone();
        while seen.contains(&candidate) {
            let counter = counters.entry(base.clone()).or_insert(1);
            *counter += 1;
            candidate = format!("{base}_{counter}");
        }
        seen.insert(candidate.clone());
        result.push(candidate);
    }

    result
}

/// Turns a header-less matrix into row objects keyed by `headers`.
///
/// Short rows are padded with `null`; cells beyond the last header are
/// dropped.
pub fn rows_from_matrix(headers: &[String], rows: Vec<Vec<JsonValue>>) -> Vec<JsonValue> {
    rows.into_iter()
        .map(|row| {
            let mut cells = row.into_iter();
            let object: Map<String, JsonValue> = headers
                .iter()
                .map(|header| (header.clone(), cells.next().unwrap_or(JsonValue::Null)))
                .collect();
            JsonValue::Object(object)
        })
        .collect()
}

/// Infers a synthetic type label for a text cell.
///
/// Returns one of `number`, `boolean`, `datetime`, or `text`. Digits with a
/// leading zero (postal codes, account numbers) are text.
pub fn infer_cell_type(text: &str) -> &'static str {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return "text";
    }
    if is_numeric(trimmed) {
        return "number";
    }
    if trimmed.eq_ignore_ascii_case("true") || trimmed.eq_ignore_ascii_case("false") {
        return "boolean";
    }
    if looks_like_datetime(trimmed) {
        return "datetime";
    }
    "text"
}

fn is_numeric(text: &str) -> bool {
    !has_leading_zero(text) && text.parse::<f64>().is_ok_and(f64::is_finite)
}

fn has_leading_zero(text: &str) -> bool {
    let digits = text.strip_prefix(['-', '+']).unwrap_or(text);
    let mut chars = digits.chars();
    chars.next() == Some('0') && chars.next().is_some_and(|c| c.is_ascii_digit())
}

fn looks_like_datetime(text: &str) -> bool {
    const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%m/%d/%Y %H:%M"];
    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%d.%m.%Y"];

    chrono::DateTime::parse_from_rfc3339(text).is_ok()
        || DATETIME_FORMATS
            .iter()
            .any(|format| chrono::NaiveDateTime::parse_from_str(text, format).is_ok())
        || DATE_FORMATS
            .iter()
            .any(|format| chrono::NaiveDate::parse_from_str(text, format).is_ok())
}

/// Converts a text cell to the JSON value of its column's type.
///
/// Only `number` and `boolean` columns convert; a cell that does not fit
/// its column stays a string. Empty cells are `null`.
pub fn typed_cell(text: &str, column_type: &str) -> JsonValue {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return JsonValue::Null;
    }

    match column_type {
        "number" if is_numeric(trimmed) => trimmed
            .parse::<i64>()
            .map(JsonValue::from)
            .or_else(|_| trimmed.parse::<f64>().map(float_to_json))
            .unwrap_or_else(|_| JsonValue::String(text.to_string())),
        "boolean" if trimmed.eq_ignore_ascii_case("true") => JsonValue::Bool(true),
        "boolean" if trimmed.eq_ignore_ascii_case("false") => JsonValue::Bool(false),
        _ => JsonValue::String(text.to_string()),
    }
}

/// Field descriptors for the columns reported alongside query rows.
pub fn fields_from_columns<I, N, T>(columns: I) -> Vec<FieldDescriptor>
where
    I: IntoIterator<Item = (N, T)>,
    N: Into<String>,
    T: Into<String>,
{
    columns
        .into_iter()
        .map(|(name, data_type)| FieldDescriptor::new(name, data_type))
        .collect()
}

/// Encodes binary column values as `base64:<data>`.
pub fn binary_to_json(bytes: &[u8]) -> JsonValue {
    JsonValue::String(format!(
        "base64:{}",
        base64::engine::general_purpose::STANDARD.encode(bytes)
    ))
}

/// Converts a float to JSON, mapping NaN and infinities to `null`.
pub fn float_to_json(value: f64) -> JsonValue {
    serde_json::Number::from_f64(value).map_or(JsonValue::Null, JsonValue::Number)
}
