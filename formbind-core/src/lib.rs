//! Core connector library for formbind.
//!
//! Form-building tools bind form fields to columns of an external data
//! source. This crate provides the two operations they need, behind one
//! facade and one result shape for every engine:
//!
//! - a connection test that reports reachability, version, and the tables
//!   and fields available for binding
//! - a query in the source's native language, returned as JSON rows
//!
//! # Supported Engines
//! PostgreSQL, MySQL, SQL Server, and Oracle under `relational-sql`;
//! MongoDB under `document-store`; SQLite files under `embedded-file-db`;
//! CSV and workbook files under `spreadsheet-file`; and SharePoint-style
//! lists under `remote-list-service`. Each driver sits behind a cargo
//! feature.
//!
//! # Security Guarantees
//! - Credentials are zeroized on drop and never appear in `Debug` output
//! - Connection URLs are redacted from every error message
//! - Every session is released before a call returns, on every path

pub mod adapters;
pub mod config;
pub mod connector;
pub mod error;
pub mod logging;
pub mod models;
pub mod normalize;
pub mod security;

// Re-export commonly used types
pub use adapters::{ListTransport, SourceAdapter, TransportResponse};
pub use config::{ConnectorSettings, EnvironmentDefaults, RawSourceConfig};
pub use connector::Connector;
pub use error::{ConnectorError, Result};
pub use logging::init_logging;
pub use models::{
    ConnectionInfo, ConnectionTestResult, Engine, FieldDescriptor, QueryResult, SourceType,
    SqlDialect,
};
