//! SQLite adapter for embedded database files.
//!
//! The file is opened per call with `create_if_missing(false)`, so a wrong
//! path is a connection failure instead of a silently created empty
//! database.
//!
//! Statements starting with `SELECT` (any case) return rows; everything else
//! is executed and reports `rows: []` on success.

use super::{EngineSession, SourceAdapter, connect_with_timeout, with_session};
use crate::{
    Result,
    config::{ConnectorSettings, SqliteConfig},
    error::ConnectorError,
    models::{ConnectionInfo, Engine, QueryOutput, SchemaSnapshot},
    normalize::{CatalogColumn, binary_to_json, fields_from_columns, float_to_json, group_by_table},
};
use async_trait::async_trait;
use futures::FutureExt;
use serde_json::{Map, Value as JsonValue};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{Column, ConnectOptions, Connection, Row, TypeInfo};

/// Catalog query listing every user table column in declaration order.
const COLUMNS_QUERY: &str = r"
    SELECT m.name AS table_name, p.name AS column_name, p.type AS data_type
    FROM sqlite_master m
    JOIN pragma_table_info(m.name) p
    WHERE m.type = 'table' AND m.name NOT LIKE 'sqlite_%'
    ORDER BY m.name, p.cid
    LIMIT ?1
";

#[async_trait]
impl EngineSession for SqliteConnection {
    async fn release(self) {
        if let Err(e) = self.close().await {
            tracing::warn!("Failed to close SQLite connection cleanly: {}", e);
        }
    }
}

/// Adapter for a single SQLite database file.
#[derive(Debug, Clone)]
pub struct SqliteAdapter {
    config: SqliteConfig,
    settings: ConnectorSettings,
}

impl SqliteAdapter {
    /// Creates an adapter; the file is not touched until a call.
    pub const fn new(config: SqliteConfig, settings: ConnectorSettings) -> Self {
        Self { config, settings }
    }

    fn file_name(&self) -> String {
        self.config.path.file_name().map_or_else(
            || self.config.path.display().to_string(),
            |name| name.to_string_lossy().into_owned(),
        )
    }

    async fn connect(&self) -> Result<SqliteConnection> {
        let options = SqliteConnectOptions::new()
            .filename(&self.config.path)
            .create_if_missing(false);
        let file_name = self.file_name();

        connect_with_timeout(self.settings.connect_timeout, async move {
            options.connect().await.map_err(|e| {
                ConnectorError::connection_failed(
                    format!("Failed to open SQLite database '{file_name}'"),
                    e,
                )
            })
        })
        .await
    }
}

#[async_trait]
impl SourceAdapter for SqliteAdapter {
    fn engine(&self) -> Engine {
        Engine::Sqlite
    }

    async fn test(&self) -> Result<SchemaSnapshot> {
        let connection = self.connect().await?;
        let column_limit = i64::from(self.settings.introspection_column_limit);
        let file_name = self.file_name();

        with_session(
            connection,
            "Schema introspection",
            Some(self.settings.query_timeout),
            move |conn| {
                async move {
                    let version: String = sqlx::query_scalar("SELECT sqlite_version()")
                        .fetch_one(&mut *conn)
                        .await
                        .map_err(|e| {
                            ConnectorError::introspection_failed("Failed to read SQLite version", e)
                        })?;

                    let rows = sqlx::query(COLUMNS_QUERY)
                        .bind(column_limit)
                        .fetch_all(&mut *conn)
                        .await
                        .map_err(|e| {
                            ConnectorError::introspection_failed("Failed to read table columns", e)
                        })?;

                    let columns = rows
                        .iter()
                        .map(|row| -> std::result::Result<CatalogColumn, sqlx::Error> {
                            let data_type: String = row.try_get("data_type")?;
                            Ok(CatalogColumn::new(
                                row.try_get::<String, _>("table_name")?,
                                row.try_get::<String, _>("column_name")?,
                                declared_type(&data_type),
                            ))
                        })
                        .collect::<std::result::Result<Vec<_>, _>>()
                        .map_err(|e| {
                            ConnectorError::introspection_failed("Unexpected catalog row", e)
                        })?;

                    tracing::debug!(
                        "Read {} SQLite columns from {}",
                        columns.len(),
                        file_name
                    );
                    let (tables, fields) = group_by_table(columns);

                    Ok(SchemaSnapshot {
                        info: ConnectionInfo {
                            file: Some(file_name),
                            version: Some(version),
                            ..Default::default()
                        },
                        tables,
                        fields,
                    })
                }
                .boxed()
            },
        )
        .await
    }

    async fn query(&self, query: &str) -> Result<QueryOutput> {
        let connection = self.connect().await?;
        let statement = query.to_string();

        with_session(
            connection,
            "Query",
            Some(self.settings.query_timeout),
            move |conn| {
                async move {
                    if !is_select(&statement) {
                        let done = sqlx::query(&statement)
                            .execute(&mut *conn)
                            .await
                            .map_err(|e| ConnectorError::query_failed("Statement was rejected", e))?;
                        tracing::debug!("SQLite statement affected {} rows", done.rows_affected());
                        return Ok(QueryOutput {
                            rows: Vec::new(),
                            fields: None,
                        });
                    }

                    let rows = sqlx::query(&statement)
                        .fetch_all(&mut *conn)
                        .await
                        .map_err(|e| ConnectorError::query_failed("Statement was rejected", e))?;

                    let fields = rows.first().map_or_else(Vec::new, |row| {
                        fields_from_columns(
                            row.columns()
                                .iter()
                                .map(|c| (c.name().to_string(), c.type_info().name().to_string())),
                        )
                    });

                    Ok(QueryOutput {
                        rows: rows.iter().map(row_to_json).collect(),
                        fields: Some(fields),
                    })
                }
                .boxed()
            },
        )
        .await
    }
}

/// Returns true for statements that produce rows.
fn is_select(statement: &str) -> bool {
    statement
        .trim_start()
        .get(..6)
        .is_some_and(|keyword| keyword.eq_ignore_ascii_case("select"))
}

/// Columns declared without a type have BLOB affinity.
fn declared_type(declared: &str) -> String {
    if declared.trim().is_empty() {
        "BLOB".to_string()
    } else {
        declared.to_string()
    }
}

fn row_to_json(row: &SqliteRow) -> JsonValue {
    let map: Map<String, JsonValue> = row
        .columns()
        .iter()
        .map(|column| (column.name().to_string(), column_value(row, column.ordinal())))
        .collect();
    JsonValue::Object(map)
}

/// SQLite is dynamically typed, so each value is tried against the types
/// it may hold in order of likelihood.
fn column_value(row: &SqliteRow, index: usize) -> JsonValue {
    if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
        return v.map_or(JsonValue::Null, JsonValue::from);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
        return v.map_or(JsonValue::Null, float_to_json);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(index) {
        return v.map_or(JsonValue::Null, JsonValue::String);
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(index) {
        return v.map_or(JsonValue::Null, |bytes| binary_to_json(&bytes));
    }
    JsonValue::Null
}
