//! The connector facade: one entry point for every engine.
//!
//! [`Connector`] parses the caller's type tag and config bag, resolves them
//! into an engine config, picks the adapter, and turns whatever happens into
//! a result value. Nothing it does returns `Err` or panics on bad input;
//! failures come back as `success: false` or a populated `error`.
//!
//! # Example
//! ```rust,no_run
//! use formbind_core::{Connector, config::{ConnectorSettings, EnvironmentDefaults}};
//! use serde_json::json;
//!
//! # async fn run() {
//! let connector = Connector::new(EnvironmentDefaults::from_env(), ConnectorSettings::default());
//! let result = connector
//!     .test_connection("embedded-file-db", &json!({"filePath": "/var/lib/app/forms.db"}))
//!     .await;
//! println!("{}", result.message);
//! # }
//! ```

use crate::{
    Result,
    adapters::{AdapterContext, ListTransport, SourceAdapter, create_adapter},
    config::{ConfigResolver, ConnectorSettings, EnvironmentDefaults, RawSourceConfig, engine_hint},
    error::ConnectorError,
    models::{ConnectionTestResult, QueryResult, SourceType},
};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Instant;

/// Stateless dispatcher over the engine adapters.
///
/// Calls are independent: every call resolves its own config and opens and
/// releases its own session, so one `Connector` can serve any number of
/// concurrent calls.
#[derive(Debug, Clone)]
pub struct Connector {
    resolver: ConfigResolver,
    context: AdapterContext,
}

impl Connector {
    /// Creates a connector over injected environment defaults and limits.
    pub fn new(defaults: EnvironmentDefaults, settings: ConnectorSettings) -> Self {
        Self {
            resolver: ConfigResolver::new(defaults),
            context: AdapterContext::new(settings),
        }
    }

    /// Replaces the HTTP transport used by the remote list service.
    #[must_use]
    pub fn with_list_transport(mut self, transport: Arc<dyn ListTransport>) -> Self {
        self.context.list_transport = Some(transport);
        self
    }

    /// Limits applied to every call.
    pub const fn settings(&self) -> &ConnectorSettings {
        &self.context.settings
    }

    /// Every source type tag this connector accepts, in canonical form.
    pub const fn supported_source_types() -> &'static [SourceType] {
        &SourceType::ALL
    }

    /// Connects to a source, reads its schema, and disconnects.
    ///
    /// An unknown `source_type` is reported without any I/O.
    pub async fn test_connection(
        &self,
        source_type: &str,
        config: &JsonValue,
    ) -> ConnectionTestResult {
        let started = Instant::now();
        let Some(kind) = SourceType::parse(source_type) else {
            tracing::warn!(source_type, "Rejected unsupported source type");
            return ConnectionTestResult::unsupported(source_type);
        };

        let raw = match RawSourceConfig::from_value(config) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(source_type = %kind, error = %e, "Rejected connection test config");
                return ConnectionTestResult::rejected(&e);
            }
        };

        let engine = engine_hint(kind, &raw);
        let outcome = match self.adapter_for(kind, &raw) {
            Ok(adapter) => adapter.test().await,
            Err(e) => Err(e),
        };
        let elapsed_ms = started.elapsed().as_millis();

        match outcome {
            Ok(snapshot) => {
                tracing::info!(
                    source_type = %kind,
                    %engine,
                    tables = snapshot.tables.len(),
                    elapsed_ms,
                    "Connection test succeeded"
                );
                ConnectionTestResult::connected(engine, snapshot)
            }
            Err(e) => {
                tracing::warn!(
                    source_type = %kind,
                    %engine,
                    elapsed_ms,
                    error = %e,
                    "Connection test failed"
                );
                ConnectionTestResult::failed(engine, &e)
            }
        }
    }

    /// Runs `query` in the source's native query language.
    ///
    /// SQL for relational engines, a JSON filter for the document store, a
    /// sheet name for spreadsheets, and OData options for the list service.
    pub async fn execute_query(
        &self,
        source_type: &str,
        config: &JsonValue,
        query: &str,
    ) -> QueryResult {
        let started = Instant::now();
        let Some(kind) = SourceType::parse(source_type) else {
            tracing::warn!(source_type, "Rejected unsupported source type");
            return QueryResult::rejected(&ConnectorError::UnsupportedSourceType {
                source_type: source_type.to_string(),
            });
        };

        let raw = match RawSourceConfig::from_value(config) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(source_type = %kind, error = %e, "Rejected query config");
                return QueryResult::rejected(&e);
            }
        };

        let engine = engine_hint(kind, &raw);
        let outcome = match self.adapter_for(kind, &raw) {
            Ok(adapter) => adapter.query(query).await,
            Err(e) => Err(e),
        };
        let elapsed_ms = started.elapsed().as_millis();

        match outcome {
            Ok(output) => {
                tracing::info!(
                    source_type = %kind,
                    %engine,
                    rows = output.rows.len(),
                    elapsed_ms,
                    "Query succeeded"
                );
                QueryResult::completed(output)
            }
            Err(e) => {
                tracing::warn!(
                    source_type = %kind,
                    %engine,
                    elapsed_ms,
                    error = %e,
                    "Query failed"
                );
                QueryResult::failed(engine, &e)
            }
        }
    }

    fn adapter_for(
        &self,
        kind: SourceType,
        raw: &RawSourceConfig,
    ) -> Result<Box<dyn SourceAdapter>> {
        let resolved = self.resolver.resolve(kind, raw)?;
        tracing::debug!(source_type = %kind, engine = %resolved.engine(), "Resolved source config");
        create_adapter(resolved, &self.context)
    }
}

impl Default for Connector {
    fn default() -> Self {
        Self::new(EnvironmentDefaults::none(), ConnectorSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_unsupported_type_is_reported() {
        let connector = Connector::default();

        let result = connector
            .test_connection("carrier-pigeon", &json!({"host": "coop"}))
            .await;
        assert!(!result.success);
        assert_eq!(result.message, "Unsupported source type: carrier-pigeon");
        assert!(result.tables.is_none());

        let result = connector
            .execute_query("carrier-pigeon", &json!({}), "SELECT 1")
            .await;
        assert!(result.rows.is_empty());
        assert_eq!(
            result.error.as_deref(),
            Some("Unsupported source type: carrier-pigeon")
        );
    }

    #[tokio::test]
    async fn test_missing_requirement_names_engine() {
        let result = Connector::default()
            .test_connection("relational-sql", &json!({"dialect": "mssql", "host": "sql"}))
            .await;

        assert!(!result.success);
        assert_eq!(
            result.message,
            "SQL Server connection failed: Configuration error: Server and database name are required for SQL Server connections"
        );
        assert!(result.fields.is_none());
    }

    #[tokio::test]
    async fn test_malformed_config_string_is_rejected() {
        let result = Connector::default()
            .test_connection("relational-sql", &json!("{not json"))
            .await;

        assert!(!result.success);
        assert!(result.message.starts_with("Configuration error"));
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn test_unknown_dialect() {
        let result = Connector::default()
            .execute_query("relational-sql", &json!({"dialect": "db2", "host": "x"}), "SELECT 1")
            .await;
        assert!(!result.is_success());
        assert!(result.error.unwrap_or_default().contains("db2"));
    }

    #[test]
    fn test_supported_source_types() {
        let tags: Vec<&str> = Connector::supported_source_types()
            .iter()
            .map(|t| t.as_str())
            .collect();
        assert_eq!(
            tags,
            [
                "relational-sql",
                "document-store",
                "embedded-file-db",
                "spreadsheet-file",
                "remote-list-service"
            ]
        );
    }
}
