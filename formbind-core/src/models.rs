//! Uniform data model shared by every engine adapter.
//!
//! Callers only ever see these shapes: a [`ConnectionTestResult`] from a
//! connection test and a [`QueryResult`] from a query. Engine-native schema
//! and row representations are converted into them before they leave an
//! adapter.

use crate::error::ConnectorError;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Field names that are selected by default when a form binds a table.
const DEFAULT_SELECTED_FIELDS: &[&str] = &["id", "name", "title", "email", "description"];

/// Declared kind of a data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceType {
    /// Relational databases; the dialect selects the engine
    RelationalSql,
    /// Schema-less document store
    DocumentStore,
    /// Database stored in a single local file
    EmbeddedFileDb,
    /// Spreadsheet or delimited text file
    SpreadsheetFile,
    /// Remote web service exposing lists of items
    RemoteListService,
}

impl SourceType {
    /// Every supported source type, in canonical order.
    pub const ALL: [Self; 5] = [
        Self::RelationalSql,
        Self::DocumentStore,
        Self::EmbeddedFileDb,
        Self::SpreadsheetFile,
        Self::RemoteListService,
    ];

    /// Parses a caller-supplied type tag.
    ///
    /// Returns `None` for tags outside the closed set so the caller can report
    /// them without attempting any I/O.
    ///
    /// # Example
    /// ```rust
    /// use formbind_core::models::SourceType;
    ///
    /// assert_eq!(SourceType::parse("mongodb"), Some(SourceType::DocumentStore));
    /// assert_eq!(SourceType::parse("carrier-pigeon"), None);
    /// ```
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "relational-sql" | "relational" | "database" | "sql" => Some(Self::RelationalSql),
            "document-store" | "document" | "mongodb" | "mongo" => Some(Self::DocumentStore),
            "embedded-file-db" | "sqlite" | "file-db" => Some(Self::EmbeddedFileDb),
            "spreadsheet-file" | "spreadsheet" | "excel" | "csv" | "xlsx" => {
                Some(Self::SpreadsheetFile)
            }
            "remote-list-service" | "list-service" | "list" | "sharepoint" => {
                Some(Self::RemoteListService)
            }
            _ => None,
        }
    }

    /// Canonical tag for this source type.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RelationalSql => "relational-sql",
            Self::DocumentStore => "document-store",
            Self::EmbeddedFileDb => "embedded-file-db",
            Self::SpreadsheetFile => "spreadsheet-file",
            Self::RemoteListService => "remote-list-service",
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SQL dialect of a relational source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialect {
    /// PostgreSQL-compatible engines
    #[default]
    Postgres,
    /// MySQL and MariaDB
    MySql,
    /// Microsoft SQL Server
    SqlServer,
    /// Oracle Database
    Oracle,
    /// SQLite file addressed through the relational family
    Sqlite,
}

impl SqlDialect {
    /// Parses a dialect tag. Unknown tags are `None`.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" | "pg-like" | "pgsql" => Some(Self::Postgres),
            "mysql" | "mysql-like" | "mariadb" => Some(Self::MySql),
            "mssql" | "sqlserver" | "sql-server" | "sqlserver-like" => Some(Self::SqlServer),
            "oracle" | "oracledb" | "oracle-like" => Some(Self::Oracle),
            "sqlite" | "sqlite3" => Some(Self::Sqlite),
            _ => None,
        }
    }

    /// The engine this dialect is served by.
    pub const fn engine(self) -> Engine {
        match self {
            Self::Postgres => Engine::Postgres,
            Self::MySql => Engine::MySql,
            Self::SqlServer => Engine::SqlServer,
            Self::Oracle => Engine::Oracle,
            Self::Sqlite => Engine::Sqlite,
        }
    }

    /// Conventional TCP port, if the dialect is networked.
    pub const fn default_port(self) -> Option<u16> {
        match self {
            Self::Postgres => Some(5432),
            Self::MySql => Some(3306),
            Self::SqlServer => Some(1433),
            Self::Oracle => Some(1521),
            Self::Sqlite => None,
        }
    }
}

/// Concrete backend spoken by an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Engine {
    /// PostgreSQL
    Postgres,
    /// MySQL or MariaDB
    MySql,
    /// Microsoft SQL Server
    SqlServer,
    /// Oracle Database
    Oracle,
    /// SQLite file
    Sqlite,
    /// MongoDB
    MongoDb,
    /// Spreadsheet or delimited text file
    Spreadsheet,
    /// SharePoint-style list service
    ListService,
}

impl Engine {
    /// Engine family name used as the prefix of every result message.
    pub const fn family_name(self) -> &'static str {
        match self {
            Self::Postgres => "PostgreSQL",
            Self::MySql => "MySQL",
            Self::SqlServer => "SQL Server",
            Self::Oracle => "Oracle",
            Self::Sqlite => "SQLite",
            Self::MongoDb => "MongoDB",
            Self::Spreadsheet => "Spreadsheet",
            Self::ListService => "List service",
        }
    }
}

impl std::fmt::Display for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.family_name())
    }
}

/// Returns true when a field should be pre-selected in the form editor.
///
/// Matches case-insensitively against a short list of common identity and
/// label names.
pub fn is_default_selected(name: &str) -> bool {
    DEFAULT_SELECTED_FIELDS
        .iter()
        .any(|candidate| candidate.eq_ignore_ascii_case(name))
}

/// One column or property of a table or collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Column or property name, as the engine spells it
    pub name: String,
    /// Type label in the source engine's own vocabulary
    #[serde(rename = "type")]
    pub data_type: String,
    /// Whether a form should include the field by default
    pub selected: bool,
}

impl FieldDescriptor {
    /// Creates a descriptor with the default-selection heuristic applied.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        let name = name.into();
        let selected = is_default_selected(&name);
        Self {
            name,
            data_type: data_type.into(),
            selected,
        }
    }

    /// Creates a descriptor with an explicit selection flag.
    pub fn with_selected(
        name: impl Into<String>,
        data_type: impl Into<String>,
        selected: bool,
    ) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            selected,
        }
    }
}

/// Ordered mapping from table or collection name to its fields.
pub type TableFields = BTreeMap<String, Vec<FieldDescriptor>>;

/// Engine metadata reported by a successful connection test.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    /// `host:port` of the server, credentials excluded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    /// Database, site title, or schema scope
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// File name for file-based sources
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Server or library version
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Volatile; may differ between otherwise identical tests
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<u64>,
}

/// Successful outcome of an adapter's connection test.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaSnapshot {
    /// Engine metadata
    pub info: ConnectionInfo,
    /// Discovered tables; empty for single-table file sources
    pub tables: Vec<String>,
    /// Fields per table; may cover only some tables
    pub fields: TableFields,
}

/// Successful outcome of an adapter's query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutput {
    /// One JSON object per row
    pub rows: Vec<JsonValue>,
    /// Column descriptors, for engines that report them
    pub fields: Option<Vec<FieldDescriptor>>,
}

/// Outcome of a connection test, as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionTestResult {
    /// Whether the connection and introspection succeeded
    pub success: bool,
    /// Human-readable outcome, prefixed with the engine family
    pub message: String,
    /// Engine metadata; present on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<ConnectionInfo>,
    /// Discovered tables; present on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tables: Option<Vec<String>>,
    /// Fields per table; present on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<TableFields>,
    /// Failure detail with its cause chain
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConnectionTestResult {
    /// Builds a success result from an adapter snapshot.
    pub fn connected(engine: Engine, snapshot: SchemaSnapshot) -> Self {
        let target = snapshot
            .info
            .database
            .as_deref()
            .or(snapshot.info.file.as_deref())
            .or(snapshot.info.server.as_deref());
        let message = match target {
            Some(target) => format!("{engine} connection successful ({target})"),
            None => format!("{engine} connection successful"),
        };

        Self {
            success: true,
            message,
            info: Some(snapshot.info),
            tables: Some(snapshot.tables),
            fields: Some(snapshot.fields),
            error: None,
        }
    }

    /// Builds a failure result; tables and fields are always absent.
    pub fn failed(engine: Engine, error: &ConnectorError) -> Self {
        Self {
            success: false,
            message: format!("{engine} connection failed: {}", error.summary()),
            info: None,
            tables: None,
            fields: None,
            error: Some(error.detail()),
        }
    }

    /// Result for a type tag outside the supported set. No I/O is attempted.
    pub fn unsupported(source_type: &str) -> Self {
        Self {
            success: false,
            message: format!("Unsupported source type: {source_type}"),
            info: None,
            tables: None,
            fields: None,
            error: None,
        }
    }

    /// Failure that happened before an engine could be chosen.
    pub fn rejected(error: &ConnectorError) -> Self {
        Self {
            success: false,
            message: error.summary(),
            info: None,
            tables: None,
            fields: None,
            error: Some(error.detail()),
        }
    }
}

/// Outcome of a query, as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    /// One JSON object per row; empty on failure
    pub rows: Vec<JsonValue>,
    /// Column descriptors, for engines that report them
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<FieldDescriptor>>,
    /// Failure detail with its cause chain
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryResult {
    /// Builds a success result from adapter output.
    pub fn completed(output: QueryOutput) -> Self {
        Self {
            rows: output.rows,
            fields: output.fields,
            error: None,
        }
    }

    /// Builds a failure result; rows are always empty.
    pub fn failed(engine: Engine, error: &ConnectorError) -> Self {
        Self {
            rows: Vec::new(),
            fields: None,
            error: Some(format!("{engine} query failed: {}", error.detail())),
        }
    }

    /// Failure that happened before an engine could be chosen.
    pub fn rejected(error: &ConnectorError) -> Self {
        Self {
            rows: Vec::new(),
            fields: None,
            error: Some(error.detail()),
        }
    }

    /// Returns true when the query completed without error.
    pub const fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
