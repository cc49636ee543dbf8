//! MySQL and MariaDB adapter.
//!
//! The schema scope is the configured database, or the connection's
//! default database when none is given. Catalog text columns are cast to
//! `CHAR` because MySQL 8 reports some `information_schema` columns as
//! binary strings.

use super::{EngineSession, SourceAdapter, connect_with_timeout, with_session};
use crate::{
    Result,
    config::{ConnectionTarget, ConnectorSettings, SqlConfig},
    error::ConnectorError,
    models::{ConnectionInfo, Engine, QueryOutput, SchemaSnapshot},
    normalize::{CatalogColumn, binary_to_json, fields_from_columns, float_to_json, group_by_table},
};
use async_trait::async_trait;
use futures::FutureExt;
use serde_json::{Map, Value as JsonValue};
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::{Column, ConnectOptions, Connection, Row, TypeInfo};

const COLUMNS_QUERY: &str = r"
    SELECT
        CAST(TABLE_NAME AS CHAR) AS table_name,
        CAST(COLUMN_NAME AS CHAR) AS column_name,
        CAST(COLUMN_TYPE AS CHAR) AS data_type
    FROM information_schema.COLUMNS
    WHERE TABLE_SCHEMA = COALESCE(?, DATABASE())
    ORDER BY TABLE_NAME, ORDINAL_POSITION
    LIMIT ?
";

#[async_trait]
impl EngineSession for MySqlConnection {
    async fn release(self) {
        if let Err(e) = self.close().await {
            tracing::warn!("Failed to close MySQL connection cleanly: {}", e);
        }
    }
}

/// Adapter for MySQL-compatible servers.
#[derive(Debug, Clone)]
pub struct MySqlAdapter {
    config: SqlConfig,
    settings: ConnectorSettings,
}

impl MySqlAdapter {
    /// Creates an adapter; no connection is opened until a call.
    pub const fn new(config: SqlConfig, settings: ConnectorSettings) -> Self {
        Self { config, settings }
    }

    fn connect_options(&self) -> Result<MySqlConnectOptions> {
        match &self.config.target {
            ConnectionTarget::Url(url) => url.expose().parse::<MySqlConnectOptions>().map_err(|e| {
                ConnectorError::configuration(format!("Invalid MySQL connection string: {e}"))
            }),
            ConnectionTarget::Discrete(endpoint) => {
                let mut options = MySqlConnectOptions::new()
                    .host(&endpoint.host)
                    .port(endpoint.port);
                if let Some(database) = &endpoint.database {
                    options = options.database(database);
                }
                if let Some(credentials) = &endpoint.credentials {
                    options = options.username(credentials.username());
                    if let Some(password) = credentials.password() {
                        options = options.password(password);
                    }
                }
                Ok(options)
            }
        }
    }

    async fn connect(&self) -> Result<MySqlConnection> {
        let options = self.connect_options()?;
        let server = self.config.target.server_label().unwrap_or_default();

        connect_with_timeout(self.settings.connect_timeout, async move {
            options.connect().await.map_err(|e| {
                ConnectorError::connection_failed(format!("Failed to connect to MySQL at {server}"), e)
            })
        })
        .await
    }

    /// Database to introspect: `schema`, then the target's database.
    fn scope(&self) -> Option<String> {
        self.config
            .schema
            .clone()
            .or_else(|| self.config.target.database())
    }
}

#[async_trait]
impl SourceAdapter for MySqlAdapter {
    fn engine(&self) -> Engine {
        Engine::MySql
    }

    async fn test(&self) -> Result<SchemaSnapshot> {
        let connection = self.connect().await?;
        let scope = self.scope();
        let column_limit = i64::from(self.settings.introspection_column_limit);
        let server = self.config.target.server_label();

        with_session(
            connection,
            "Schema introspection",
            Some(self.settings.query_timeout),
            move |conn| {
                async move {
                    let (version, current): (String, Option<String>) =
                        sqlx::query_as("SELECT CAST(VERSION() AS CHAR), CAST(DATABASE() AS CHAR)")
                            .fetch_one(&mut *conn)
                            .await
                            .map_err(|e| {
                                ConnectorError::introspection_failed(
                                    "Failed to read server version",
                                    e,
                                )
                            })?;

                    let rows: Vec<(String, String, String)> = sqlx::query_as(COLUMNS_QUERY)
                        .bind(scope.as_deref())
                        .bind(column_limit)
                        .fetch_all(&mut *conn)
                        .await
                        .map_err(|e| {
                            ConnectorError::introspection_failed("Failed to read table columns", e)
                        })?;

                    let (tables, fields) = group_by_table(
                        rows.into_iter()
                            .map(|(table, name, data_type)| CatalogColumn::new(table, name, data_type))
                            .collect(),
                    );

                    Ok(SchemaSnapshot {
                        info: ConnectionInfo {
                            server,
                            database: scope.or(current),
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
                    let rows = sqlx::query(&statement)
                        .fetch_all(&mut *conn)
                        .await
                        .map_err(|e| ConnectorError::query_failed("Statement was rejected", e))?;

                    let fields = rows.first().map_or_else(Vec::new, |row| {
                        fields_from_columns(row.columns().iter().map(|c| {
                            (c.name().to_string(), c.type_info().name().to_ascii_lowercase())
                        }))
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

fn row_to_json(row: &MySqlRow) -> JsonValue {
    let map: Map<String, JsonValue> = row
        .columns()
        .iter()
        .map(|column| {
            (
                column.name().to_string(),
                column_value(row, column.ordinal(), column.type_info().name()),
            )
        })
        .collect();
    JsonValue::Object(map)
}

/// Decodes one value, guided by the MySQL type name.
///
/// Types without a dedicated arm fall through a chain of likely Rust
/// types; a value none of them accepts becomes `null`.
fn column_value(row: &MySqlRow, index: usize, type_name: &str) -> JsonValue {
    let decoded = match type_name {
        "BOOLEAN" => row.try_get::<Option<bool>, _>(index).map(|v| v.map(JsonValue::Bool)),
        name if name.ends_with("UNSIGNED") => row
            .try_get::<Option<u64>, _>(index)
            .map(|v| v.map(JsonValue::from)),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => row
            .try_get::<Option<i64>, _>(index)
            .map(|v| v.map(JsonValue::from)),
        "FLOAT" | "DOUBLE" => row
            .try_get::<Option<f64>, _>(index)
            .map(|v| v.map(float_to_json)),
        "DECIMAL" => row
            .try_get::<Option<sqlx::types::BigDecimal>, _>(index)
            .map(|v| v.map(|d| JsonValue::String(d.to_string()))),
        "DATETIME" | "TIMESTAMP" => row
            .try_get::<Option<chrono::NaiveDateTime>, _>(index)
            .map(|v| v.map(|d| JsonValue::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string()))),
        "DATE" => row
            .try_get::<Option<chrono::NaiveDate>, _>(index)
            .map(|v| v.map(|d| JsonValue::String(d.to_string()))),
        "TIME" => row
            .try_get::<Option<chrono::NaiveTime>, _>(index)
            .map(|v| v.map(|d| JsonValue::String(d.to_string()))),
        "JSON" => row.try_get::<Option<JsonValue>, _>(index),
        "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BINARY" | "VARBINARY" | "BIT" => row
            .try_get::<Option<Vec<u8>>, _>(index)
            .map(|v| v.map(|bytes| binary_to_json(&bytes))),
        _ => Err(sqlx::Error::ColumnNotFound(String::new())),
    };

    if let Ok(value) = decoded {
        return value.unwrap_or(JsonValue::Null);
    }
    fallback_value(row, index)
}

fn fallback_value(row: &MySqlRow, index: usize) -> JsonValue {
    if let Ok(v) = row.try_get::<Option<String>, _>(index) {
        return v.map_or(JsonValue::Null, JsonValue::String);
    }
    if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
        return v.map_or(JsonValue::Null, JsonValue::from);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
        return v.map_or(JsonValue::Null, float_to_json);
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(index) {
        return v.map_or(JsonValue::Null, JsonValue::Bool);
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(index) {
        return v.map_or(JsonValue::Null, |bytes| binary_to_json(&bytes));
    }
    JsonValue::Null
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Endpoint;
    use crate::models::SqlDialect;
    use crate::security::Secret;

    fn config(target: ConnectionTarget, schema: Option<&str>) -> SqlConfig {
        SqlConfig {
            dialect: SqlDialect::MySql,
            target,
            schema: schema.map(ToString::to_string),
            table: None,
            trust_server_certificate: false,
            encrypt: None,
        }
    }

    #[test]
    fn test_scope_prefers_schema_then_database() {
        let target = ConnectionTarget::Discrete(Endpoint {
            host: "mysql".to_string(),
            port: 3306,
            database: Some("forms".to_string()),
            credentials: None,
        });

        let adapter = MySqlAdapter::new(config(target.clone(), None), ConnectorSettings::default());
        assert_eq!(adapter.scope().as_deref(), Some("forms"));

        let adapter = MySqlAdapter::new(config(target, Some("audit")), ConnectorSettings::default());
        assert_eq!(adapter.scope().as_deref(), Some("audit"));
    }

    #[test]
    fn test_url_options() {
        let adapter = MySqlAdapter::new(
            config(
                ConnectionTarget::Url(Secret::new("mysql://root:pw@db.internal:3307/app".to_string())),
                None,
            ),
            ConnectorSettings::default(),
        );
        assert!(adapter.connect_options().is_ok());
        assert_eq!(adapter.scope().as_deref(), Some("app"));
    }
}
