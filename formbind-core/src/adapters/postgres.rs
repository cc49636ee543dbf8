//! PostgreSQL adapter.
//!
//! Introspection reads `information_schema.columns` for the resolved schema
//! (`public` unless configured). Query rows are decoded column by column
//! according to the server-reported type name, so numbers stay numbers,
//! timestamps become ISO-8601 strings, and `json`/`jsonb` stays nested JSON.

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
use sqlx::postgres::{PgConnectOptions, PgConnection, PgRow};
use sqlx::{Column, ConnectOptions, Connection, Row, TypeInfo};

/// Columns of one schema, in declaration order.
const COLUMNS_QUERY: &str = r"
    SELECT table_name::text, column_name::text, data_type::text
    FROM information_schema.columns
    WHERE table_schema = $1
    ORDER BY table_name, ordinal_position
    LIMIT $2
";

#[async_trait]
impl EngineSession for PgConnection {
    async fn release(self) {
        if let Err(e) = self.close().await {
            tracing::warn!("Failed to close PostgreSQL connection cleanly: {}", e);
        }
    }
}

/// Adapter for PostgreSQL-compatible servers.
#[derive(Debug, Clone)]
pub struct PostgresAdapter {
    config: SqlConfig,
    settings: ConnectorSettings,
}

impl PostgresAdapter {
    /// Creates an adapter; no connection is opened until a call.
    pub const fn new(config: SqlConfig, settings: ConnectorSettings) -> Self {
        Self { config, settings }
    }

    fn connect_options(&self) -> Result<PgConnectOptions> {
        match &self.config.target {
            ConnectionTarget::Url(url) => url.expose().parse::<PgConnectOptions>().map_err(|e| {
                ConnectorError::configuration(format!("Invalid PostgreSQL connection string: {e}"))
            }),
            ConnectionTarget::Discrete(endpoint) => {
                let mut options = PgConnectOptions::new()
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

    async fn connect(&self) -> Result<PgConnection> {
        let options = self.connect_options()?;
        let server = self.config.target.server_label().unwrap_or_default();

        connect_with_timeout(self.settings.connect_timeout, async move {
            options.connect().await.map_err(|e| {
                ConnectorError::connection_failed(
                    format!("Failed to connect to PostgreSQL at {server}"),
                    e,
                )
            })
        })
        .await
    }
}

#[async_trait]
impl SourceAdapter for PostgresAdapter {
    fn engine(&self) -> Engine {
        Engine::Postgres
    }

    async fn test(&self) -> Result<SchemaSnapshot> {
        let connection = self.connect().await?;
        let schema = self
            .config
            .schema
            .clone()
            .unwrap_or_else(|| "public".to_string());
        let column_limit = i64::from(self.settings.introspection_column_limit);
        let server = self.config.target.server_label();

        with_session(
            connection,
            "Schema introspection",
            Some(self.settings.query_timeout),
            move |conn| {
                async move {
                    let (version, database): (String, String) =
                        sqlx::query_as("SELECT version(), current_database()::text")
                            .fetch_one(&mut *conn)
                            .await
                            .map_err(|e| {
                                ConnectorError::introspection_failed(
                                    "Failed to read server version",
                                    e,
                                )
                            })?;

                    let rows: Vec<(String, String, String)> = sqlx::query_as(COLUMNS_QUERY)
                        .bind(&schema)
                        .bind(column_limit)
                        .fetch_all(&mut *conn)
                        .await
                        .map_err(|e| {
                            ConnectorError::introspection_failed(
                                format!("Failed to read columns of schema '{schema}'"),
                                e,
                            )
                        })?;

                    let (tables, fields) = group_by_table(
                        rows.into_iter()
                            .map(|(table, name, data_type)| CatalogColumn::new(table, name, data_type))
                            .collect(),
                    );

                    Ok(SchemaSnapshot {
                        info: ConnectionInfo {
                            server,
                            database: Some(database),
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
                    let rows = rows
                        .iter()
                        .map(row_to_json)
                        .collect::<std::result::Result<Vec<_>, _>>()
                        .map_err(|e| ConnectorError::query_failed("Failed to decode row", e))?;

                    Ok(QueryOutput {
                        rows,
                        fields: Some(fields),
                    })
                }
                .boxed()
            },
        )
        .await
    }
}

fn row_to_json(row: &PgRow) -> std::result::Result<JsonValue, sqlx::Error> {
    let mut map = Map::new();
    for column in row.columns() {
        let value = column_value(row, column.ordinal(), column.type_info().name())?;
        map.insert(column.name().to_string(), value);
    }
    Ok(JsonValue::Object(map))
}

/// Decodes one value according to its PostgreSQL type name.
fn column_value(
    row: &PgRow,
    index: usize,
    type_name: &str,
) -> std::result::Result<JsonValue, sqlx::Error> {
    let value = match type_name {
        "BOOL" => row.try_get::<Option<bool>, _>(index)?.map(JsonValue::Bool),
        "INT2" => row.try_get::<Option<i16>, _>(index)?.map(JsonValue::from),
        "INT4" => row.try_get::<Option<i32>, _>(index)?.map(JsonValue::from),
        "INT8" => row.try_get::<Option<i64>, _>(index)?.map(JsonValue::from),
        "OID" => row
            .try_get::<Option<sqlx::postgres::types::Oid>, _>(index)?
            .map(|oid| JsonValue::from(oid.0)),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(index)?
            .map(|v| float_to_json(f64::from(v))),
        "FLOAT8" => row.try_get::<Option<f64>, _>(index)?.map(float_to_json),
        "NUMERIC" => row
            .try_get::<Option<sqlx::types::BigDecimal>, _>(index)?
            .map(|v| JsonValue::String(v.to_string())),
        "UUID" => row
            .try_get::<Option<uuid::Uuid>, _>(index)?
            .map(|v| JsonValue::String(v.to_string())),
        "JSON" | "JSONB" => row.try_get::<Option<JsonValue>, _>(index)?,
        "TIMESTAMPTZ" => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(index)?
            .map(|v| JsonValue::String(v.to_rfc3339())),
        "TIMESTAMP" => row
            .try_get::<Option<chrono::NaiveDateTime>, _>(index)?
            .map(|v| JsonValue::String(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string())),
        "DATE" => row
            .try_get::<Option<chrono::NaiveDate>, _>(index)?
            .map(|v| JsonValue::String(v.to_string())),
        "TIME" => row
            .try_get::<Option<chrono::NaiveTime>, _>(index)?
            .map(|v| JsonValue::String(v.to_string())),
        "BYTEA" => row
            .try_get::<Option<Vec<u8>>, _>(index)?
            .map(|v| binary_to_json(&v)),
        "TEXT[]" | "VARCHAR[]" | "BPCHAR[]" | "NAME[]" => row
            .try_get::<Option<Vec<Option<String>>>, _>(index)?
            .map(JsonValue::from),
        "INT4[]" => row
            .try_get::<Option<Vec<Option<i32>>>, _>(index)?
            .map(JsonValue::from),
        "INT8[]" => row
            .try_get::<Option<Vec<Option<i64>>>, _>(index)?
            .map(JsonValue::from),
        "BOOL[]" => row
            .try_get::<Option<Vec<Option<bool>>>, _>(index)?
            .map(JsonValue::from),
        // Character types, enums, domains, and other text-like types
        _ => row
            .try_get_unchecked::<Option<String>, _>(index)
            .ok()
            .flatten()
            .map(JsonValue::String),
    };
    Ok(value.unwrap_or(JsonValue::Null))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Endpoint;
    use crate::models::SqlDialect;
    use crate::security::{Credentials, Secret};
    use std::time::Duration;

    fn adapter(target: ConnectionTarget) -> PostgresAdapter {
        PostgresAdapter::new(
            SqlConfig {
                dialect: SqlDialect::Postgres,
                target,
                schema: Some("public".to_string()),
                table: None,
                trust_server_certificate: false,
                encrypt: None,
            },
            ConnectorSettings::default().with_connect_timeout(Duration::from_secs(2)),
        )
    }

    #[test]
    fn test_discrete_options_build_without_io() {
        let adapter = adapter(ConnectionTarget::Discrete(Endpoint {
            host: "db.example.com".to_string(),
            port: 6543,
            database: Some("forms".to_string()),
            credentials: Some(Credentials::new("app".to_string(), Some("pw".to_string()))),
        }));
        let options = adapter.connect_options().unwrap();
        assert_eq!(options.get_host(), "db.example.com");
        assert_eq!(options.get_port(), 6543);
        assert_eq!(options.get_database(), Some("forms"));
        assert_eq!(options.get_username(), "app");
    }

    #[test]
    fn test_url_options() {
        let adapter = adapter(ConnectionTarget::Url(Secret::new(
            "postgres://u:p@pg.internal:5433/demo".to_string(),
        )));
        let options = adapter.connect_options().unwrap();
        assert_eq!(options.get_host(), "pg.internal");
        assert_eq!(options.get_port(), 5433);
    }

    #[tokio::test]
    async fn test_unreachable_server_fails() {
        // Port 9 (discard) is closed on test hosts.
        let adapter = adapter(ConnectionTarget::Discrete(Endpoint {
            host: "127.0.0.1".to_string(),
            port: 9,
            database: Some("demo".to_string()),
            credentials: None,
        }));

        let error = adapter.test().await.unwrap_err();
        assert!(matches!(
            error,
            ConnectorError::Connection { .. } | ConnectorError::Timeout { .. }
        ));
    }
}
