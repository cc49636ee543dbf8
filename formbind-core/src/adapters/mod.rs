//! Engine adapters and the factory that selects one.
//!
//! Every engine implements [`SourceAdapter`]: a connection test that returns
//! a schema snapshot, and a query in the engine's native language. Adapters
//! are built from an already-resolved config and perform no I/O until one of
//! those two operations is called; each operation acquires and releases its
//! own session through [`session::with_session`].
//!
//! # Module Structure
//! - `session`: scoped acquisition and release, connect timeouts
//! - `transport`: HTTP transport seam for the list service
//! - Engine modules (postgres, mysql, mssql, oracle, sqlite, mongodb,
//!   spreadsheet, list_service), each behind its cargo feature

use crate::{
    Result,
    config::{ConnectorSettings, ResolvedSource},
    error::ConnectorError,
    models::{Engine, QueryOutput, SchemaSnapshot, SqlDialect},
};
use async_trait::async_trait;
use std::sync::Arc;

pub mod session;
pub mod transport;

pub use session::{
    EngineSession, bounded, connect_blocking, connect_with_timeout, run_blocking, with_session,
};
pub use transport::{ListTransport, TransportResponse};

/// Uniform contract implemented once per engine.
///
/// # Object Safety
/// This trait is object-safe; the factory hands out `Box<dyn SourceAdapter>`.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// The engine this adapter speaks.
    fn engine(&self) -> Engine;

    /// Connects, reads version and schema metadata, and disconnects.
    ///
    /// # Errors
    /// Returns error if the connection, the liveness check, or schema
    /// introspection fails.
    async fn test(&self) -> Result<SchemaSnapshot>;

    /// Runs `query` verbatim in the engine's native language.
    ///
    /// # Errors
    /// Returns error if the query cannot be parsed or executed, or the
    /// connection fails.
    async fn query(&self, query: &str) -> Result<QueryOutput>;
}

/// Shared inputs every adapter is built with.
#[derive(Clone)]
pub struct AdapterContext {
    /// Timeouts and caps applied by every adapter
    pub settings: ConnectorSettings,
    /// Transport for the list service; the HTTP default when `None`
    pub list_transport: Option<Arc<dyn ListTransport>>,
}

impl AdapterContext {
    /// Context using the default list transport.
    pub fn new(settings: ConnectorSettings) -> Self {
        Self {
            settings,
            list_transport: None,
        }
    }
}

impl std::fmt::Debug for AdapterContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterContext")
            .field("settings", &self.settings)
            .field("custom_list_transport", &self.list_transport.is_some())
            .finish()
    }
}

/// Builds the adapter for a resolved source.
///
/// No I/O happens here.
///
/// # Errors
/// Returns an unsupported-feature error if the engine was not compiled in.
pub fn create_adapter(
    source: ResolvedSource,
    context: &AdapterContext,
) -> Result<Box<dyn SourceAdapter>> {
    let settings = context.settings.clone();

    match source {
        ResolvedSource::Relational(config) => match config.dialect {
            #[cfg(feature = "postgresql")]
            SqlDialect::Postgres => Ok(Box::new(postgres::PostgresAdapter::new(config, settings))),
            #[cfg(not(feature = "postgresql"))]
            SqlDialect::Postgres => Err(missing_feature(Engine::Postgres, "postgresql")),

            #[cfg(feature = "mysql")]
            SqlDialect::MySql => Ok(Box::new(mysql::MySqlAdapter::new(config, settings))),
            #[cfg(not(feature = "mysql"))]
            SqlDialect::MySql => Err(missing_feature(Engine::MySql, "mysql")),

            #[cfg(feature = "mssql")]
            SqlDialect::SqlServer => Ok(Box::new(mssql::SqlServerAdapter::new(config, settings))),
            #[cfg(not(feature = "mssql"))]
            SqlDialect::SqlServer => Err(missing_feature(Engine::SqlServer, "mssql")),

            #[cfg(feature = "oracle")]
            SqlDialect::Oracle => Ok(Box::new(oracle::OracleAdapter::new(config, settings))),
            #[cfg(not(feature = "oracle"))]
            SqlDialect::Oracle => Err(missing_feature(Engine::Oracle, "oracle")),

            SqlDialect::Sqlite => Err(ConnectorError::configuration(
                "SQLite sources are addressed by file path, not by host",
            )),
        },

        #[cfg(feature = "mongodb")]
        ResolvedSource::Document(config) => {
            Ok(Box::new(mongodb::MongoAdapter::new(config, settings)))
        }
        #[cfg(not(feature = "mongodb"))]
        ResolvedSource::Document(_) => Err(missing_feature(Engine::MongoDb, "mongodb")),

        #[cfg(feature = "sqlite")]
        ResolvedSource::EmbeddedFile(config) => {
            Ok(Box::new(sqlite::SqliteAdapter::new(config, settings)))
        }
        #[cfg(not(feature = "sqlite"))]
        ResolvedSource::EmbeddedFile(_) => Err(missing_feature(Engine::Sqlite, "sqlite")),

        #[cfg(feature = "spreadsheet")]
        ResolvedSource::Spreadsheet(config) => Ok(Box::new(
            spreadsheet::SpreadsheetAdapter::new(config, settings),
        )),
        #[cfg(not(feature = "spreadsheet"))]
        ResolvedSource::Spreadsheet(_) => Err(missing_feature(Engine::Spreadsheet, "spreadsheet")),

        ResolvedSource::ListService(config) => {
            let transport = match &context.list_transport {
                Some(transport) => Arc::clone(transport),
                None => default_list_transport(&settings)?,
            };
            Ok(Box::new(list_service::ListServiceAdapter::new(
                config, settings, transport,
            )))
        }
    }
}

#[cfg(feature = "list-service")]
fn default_list_transport(settings: &ConnectorSettings) -> Result<Arc<dyn ListTransport>> {
    Ok(Arc::new(transport::HttpListTransport::new(settings)?))
}

#[cfg(not(feature = "list-service"))]
fn default_list_transport(_settings: &ConnectorSettings) -> Result<Arc<dyn ListTransport>> {
    Err(missing_feature(Engine::ListService, "list-service"))
}

#[allow(dead_code)]
fn missing_feature(engine: Engine, feature: &str) -> ConnectorError {
    ConnectorError::unsupported_feature(
        format!("{engine} adapter"),
        format!("Compile with --features {feature} to enable {engine} support"),
    )
}

// Engine-specific adapter modules
pub mod list_service;

#[cfg(feature = "postgresql")]
pub mod postgres;

#[cfg(feature = "mysql")]
pub mod mysql;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "mongodb")]
pub mod mongodb;

#[cfg(feature = "mssql")]
pub mod mssql;

#[cfg(feature = "oracle")]
pub mod oracle;

#[cfg(feature = "spreadsheet")]
pub mod spreadsheet;
