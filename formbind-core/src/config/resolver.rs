//! Resolution of raw configuration bags into per-engine configs.
//!
//! Precedence, applied identically for every networked engine:
//! 1. An explicit connection string wins outright.
//! 2. With `useDefaultDatabase` set and no explicit host, the environment
//!    connection string is used.
//! 3. Otherwise each field falls back from the explicit value, to the
//!    environment default (flag set only), to the engine's conventional
//!    default.

use crate::{
    Result,
    config::{
        defaults::{DefaultEndpoint, EnvironmentDefaults},
        raw::{RawSourceConfig, non_blank},
    },
    error::{ConnectorError, redact_connection_url},
    models::{Engine, SourceType, SqlDialect},
    security::{Credentials, Secret},
};
use std::path::PathBuf;
use url::Url;

/// Default MongoDB port.
pub const MONGODB_DEFAULT_PORT: u16 = 27017;

/// Where a networked engine is reached.
#[derive(Debug, Clone)]
pub enum ConnectionTarget {
    /// Full connection string or URI, handed to the driver as-is
    Url(Secret),
    /// Discrete host and port, with optional database and login
    Discrete(Endpoint),
}

/// Discrete connection parameters after fallback resolution.
#[derive(Debug, Clone)]
pub struct Endpoint {
    /// Server host
    pub host: String,
    /// Server port, after engine defaults
    pub port: u16,
    /// Database or service name
    pub database: Option<String>,
    /// Login, if any
    pub credentials: Option<Credentials>,
}

impl ConnectionTarget {
    /// `host:port` of the target, safe for logs and result messages.
    pub fn server_label(&self) -> Option<String> {
        match self {
            Self::Url(secret) => Url::parse(secret.expose()).ok().and_then(|url| {
                url.host_str().map(|host| match url.port() {
                    Some(port) => format!("{host}:{port}"),
                    None => host.to_string(),
                })
            }),
            Self::Discrete(endpoint) => Some(format!("{}:{}", endpoint.host, endpoint.port)),
        }
    }

    /// Database name carried by the target, if any.
    pub fn database(&self) -> Option<String> {
        match self {
            Self::Url(secret) => Url::parse(secret.expose()).ok().and_then(|url| {
                non_blank(Some(url.path().trim_start_matches('/')))
            }),
            Self::Discrete(endpoint) => endpoint.database.clone(),
        }
    }
}

/// Resolved config for the relational family (except SQLite).
#[derive(Debug, Clone)]
pub struct SqlConfig {
    /// Relational dialect served by this config
    pub dialect: SqlDialect,
    /// Where to connect
    pub target: ConnectionTarget,
    /// Schema (Postgres, SQL Server) or owner (Oracle) to introspect
    pub schema: Option<String>,
    /// Table to operate on, if bound
    pub table: Option<String>,
    /// Skip SQL Server certificate validation
    pub trust_server_certificate: bool,
    /// SQL Server encryption override
    pub encrypt: Option<bool>,
}

/// Resolved config for the document store.
#[derive(Debug, Clone)]
pub struct MongoConfig {
    /// Where to connect
    pub target: ConnectionTarget,
    /// Database to use; a URL target may carry it in its path instead
    pub database: Option<String>,
    /// Collection to query; the first one when absent
    pub collection: Option<String>,
    /// Authentication database for the credentials
    pub auth_source: Option<String>,
}

/// Resolved config for an embedded file database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteConfig {
    /// Path of an existing database file
    pub path: PathBuf,
    /// Table to operate on, if bound
    pub table: Option<String>,
}

/// Where a spreadsheet file lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpreadsheetLocation {
    /// Local file path
    File(PathBuf),
    /// Remote http(s) location
    Remote(Url),
}

impl SpreadsheetLocation {
    /// File name (or last URL path segment) for display.
    pub fn display_name(&self) -> String {
        match self {
            Self::File(path) => path.file_name().map_or_else(
                || path.display().to_string(),
                |name| name.to_string_lossy().into_owned(),
            ),
            Self::Remote(url) => url
                .path_segments()
                .and_then(|mut segments| segments.next_back())
                .and_then(|segment| non_blank(Some(segment)))
                .unwrap_or_else(|| url.host_str().unwrap_or_default().to_string()),
        }
    }

    /// Lowercased file extension, used to pick the reader.
    pub fn extension(&self) -> Option<String> {
        let name = match self {
            Self::File(path) => path.to_string_lossy().into_owned(),
            Self::Remote(url) => url.path().to_string(),
        };
        std::path::Path::new(&name)
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
    }
}

/// Resolved config for a spreadsheet or delimited text file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpreadsheetConfig {
    /// Where the file lives
    pub location: SpreadsheetLocation,
    /// Sheet to read; the first sheet when absent
    pub sheet: Option<String>,
}

/// Authentication for the remote list service.
#[derive(Debug, Clone)]
pub enum ListAuth {
    /// No credentials
    Anonymous,
    /// OAuth bearer token
    Bearer(Secret),
    /// Username and password
    Basic(Credentials),
}

/// Resolved config for the remote list service.
#[derive(Debug, Clone)]
pub struct ListServiceConfig {
    /// Site base URL, always ending in `/`
    pub site_url: Url,
    /// List to operate on; the first visible list when absent
    pub list: Option<String>,
    /// Credentials sent with every request
    pub auth: ListAuth,
}

/// One explicit config per engine family.
#[derive(Debug, Clone)]
pub enum ResolvedSource {
    /// PostgreSQL, MySQL, SQL Server, or Oracle
    Relational(SqlConfig),
    /// MongoDB
    Document(MongoConfig),
    /// SQLite file
    EmbeddedFile(SqliteConfig),
    /// Spreadsheet or delimited text file
    Spreadsheet(SpreadsheetConfig),
    /// SharePoint-style list site
    ListService(ListServiceConfig),
}

impl ResolvedSource {
    /// The engine that will serve this source.
    pub const fn engine(&self) -> Engine {
        match self {
            Self::Relational(config) => config.dialect.engine(),
            Self::Document(_) => Engine::MongoDb,
            Self::EmbeddedFile(_) => Engine::Sqlite,
            Self::Spreadsheet(_) => Engine::Spreadsheet,
            Self::ListService(_) => Engine::ListService,
        }
    }
}

/// Picks the engine a source type will be served by, before resolution.
///
/// Used to prefix failure messages when resolution itself fails.
pub fn engine_hint(source_type: SourceType, raw: &RawSourceConfig) -> Engine {
    match source_type {
        SourceType::RelationalSql => resolve_dialect(raw).map_or(Engine::Postgres, SqlDialect::engine),
        SourceType::DocumentStore => Engine::MongoDb,
        SourceType::EmbeddedFileDb => Engine::Sqlite,
        SourceType::SpreadsheetFile => Engine::Spreadsheet,
        SourceType::RemoteListService => Engine::ListService,
    }
}

/// Applies the precedence chain with injected environment defaults.
///
/// # Example
/// ```rust
/// use formbind_core::config::{ConfigResolver, EnvironmentDefaults, RawSourceConfig, ResolvedSource};
/// use formbind_core::models::SourceType;
/// use serde_json::json;
///
/// let raw = RawSourceConfig::from_value(&json!({"host": "localhost", "database": "demo"})).unwrap();
/// let resolved = ConfigResolver::new(EnvironmentDefaults::none())
///     .resolve(SourceType::RelationalSql, &raw)
///     .unwrap();
/// assert!(matches!(resolved, ResolvedSource::Relational(_)));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConfigResolver {
    defaults: EnvironmentDefaults,
}

impl ConfigResolver {
    /// Creates a resolver over the given defaults.
    pub const fn new(defaults: EnvironmentDefaults) -> Self {
        Self { defaults }
    }

    /// Resolves a raw config for the given source type.
    ///
    /// # Errors
    /// Returns a configuration error naming the missing requirement.
    pub fn resolve(&self, source_type: SourceType, raw: &RawSourceConfig) -> Result<ResolvedSource> {
        match source_type {
            SourceType::RelationalSql => match resolve_dialect(raw)? {
                SqlDialect::Sqlite => self.resolve_sqlite(raw).map(ResolvedSource::EmbeddedFile),
                dialect => self.resolve_sql(dialect, raw).map(ResolvedSource::Relational),
            },
            SourceType::DocumentStore => self.resolve_mongo(raw).map(ResolvedSource::Document),
            SourceType::EmbeddedFileDb => {
                self.resolve_sqlite(raw).map(ResolvedSource::EmbeddedFile)
            }
            SourceType::SpreadsheetFile => resolve_spreadsheet(raw).map(ResolvedSource::Spreadsheet),
            SourceType::RemoteListService => {
                resolve_list_service(raw).map(ResolvedSource::ListService)
            }
        }
    }

    fn resolve_sql(&self, dialect: SqlDialect, raw: &RawSourceConfig) -> Result<SqlConfig> {
        let engine = dialect.engine();
        let env = &self.defaults.relational;
        let default_port = dialect.default_port().unwrap_or_default();
        let target = resolve_target(raw, env, default_port)?;

        if let ConnectionTarget::Discrete(endpoint) = &target {
            match dialect {
                SqlDialect::SqlServer if endpoint.host.is_empty() || endpoint.database.is_none() => {
                    return Err(ConnectorError::configuration(
                        "Server and database name are required for SQL Server connections",
                    ));
                }
                SqlDialect::Oracle if endpoint.host.is_empty() || endpoint.database.is_none() => {
                    return Err(ConnectorError::configuration(
                        "Host and service name are required for Oracle connections",
                    ));
                }
                _ if endpoint.host.is_empty() => {
                    return Err(ConnectorError::configuration(format!(
                        "Host is required for {engine} connections"
                    )));
                }
                _ => {}
            }
        }

        let schema = non_blank(raw.schema.as_deref())
            .or_else(|| flagged(raw, env.schema.as_ref()))
            .or_else(|| match dialect {
                SqlDialect::Postgres => Some("public".to_string()),
                SqlDialect::SqlServer => Some("dbo".to_string()),
                _ => None,
            });

        Ok(SqlConfig {
            dialect,
            target,
            schema,
            table: non_blank(raw.table.as_deref()),
            trust_server_certificate: raw.trust_server_certificate.unwrap_or(false),
            encrypt: raw.encrypt,
        })
    }

    fn resolve_mongo(&self, raw: &RawSourceConfig) -> Result<MongoConfig> {
        let env = &self.defaults.document;
        let target = resolve_target(raw, env, MONGODB_DEFAULT_PORT)?;

        let database = match &target {
            ConnectionTarget::Discrete(endpoint) => {
                if endpoint.host.is_empty() || endpoint.database.is_none() {
                    return Err(ConnectorError::configuration(
                        "Host and database name are required for MongoDB connections",
                    ));
                }
                endpoint.database.clone()
            }
            ConnectionTarget::Url(_) => non_blank(raw.database.as_deref()),
        };

        Ok(MongoConfig {
            target,
            database,
            collection: non_blank(raw.table.as_deref()),
            auth_source: non_blank(raw.auth_source.as_deref()),
        })
    }

    fn resolve_sqlite(&self, raw: &RawSourceConfig) -> Result<SqliteConfig> {
        let path = non_blank(raw.file_path.as_deref())
            .or_else(|| non_blank(raw.connection_string.as_deref()).map(|s| strip_sqlite_scheme(&s)))
            .or_else(|| non_blank(raw.database.as_deref()))
            .or_else(|| flagged(raw, self.defaults.relational.database.as_ref()))
            .ok_or_else(|| {
                ConnectorError::configuration("File path is required for SQLite connections")
            })?;

        Ok(SqliteConfig {
            path: PathBuf::from(path),
            table: non_blank(raw.table.as_deref()),
        })
    }
}

/// Falls back to the configured first name when no table was given.
///
/// # Errors
/// Returns a configuration error when enumeration found nothing either.
pub fn resolve_table(configured: Option<&str>, enumerated: &[String], kind: &str) -> Result<String> {
    if let Some(name) = non_blank(configured) {
        return Ok(name);
    }
    enumerated.first().cloned().ok_or_else(|| {
        ConnectorError::configuration(format!("No {kind} specified and none could be found"))
    })
}

fn resolve_dialect(raw: &RawSourceConfig) -> Result<SqlDialect> {
    if let Some(tag) = non_blank(raw.dialect.as_deref()) {
        return SqlDialect::parse(&tag).ok_or_else(|| {
            ConnectorError::configuration(format!("Unsupported database dialect: {tag}"))
        });
    }

    Ok(non_blank(raw.connection_string.as_deref())
        .and_then(|url| dialect_from_scheme(&url))
        .unwrap_or_default())
}

/// Detects a dialect from a connection string's scheme.
fn dialect_from_scheme(connection_string: &str) -> Option<SqlDialect> {
    let scheme = connection_string.split_once("://").map_or_else(
        || connection_string.split_once(':').map(|(scheme, _)| scheme),
        |(scheme, _)| Some(scheme),
    )?;
    match scheme.to_ascii_lowercase().as_str() {
        "postgres" | "postgresql" => Some(SqlDialect::Postgres),
        "mysql" | "mariadb" => Some(SqlDialect::MySql),
        "mssql" | "sqlserver" | "jdbc" => Some(SqlDialect::SqlServer),
        "oracle" => Some(SqlDialect::Oracle),
        "sqlite" => Some(SqlDialect::Sqlite),
        _ => None,
    }
}

fn strip_sqlite_scheme(connection_string: &str) -> String {
    connection_string
        .strip_prefix("sqlite://")
        .or_else(|| connection_string.strip_prefix("sqlite:"))
        .unwrap_or(connection_string)
        .to_string()
}

/// Environment value, only when the source opted into defaults.
fn flagged(raw: &RawSourceConfig, value: Option<&String>) -> Option<String> {
    if raw.use_default_database {
        value.cloned()
    } else {
        None
    }
}

fn resolve_target(
    raw: &RawSourceConfig,
    env: &DefaultEndpoint,
    default_port: u16,
) -> Result<ConnectionTarget> {
    if let Some(url) = non_blank(raw.connection_string.as_deref()) {
        tracing::debug!("Using explicit connection string {}", redact_connection_url(&url));
        return Ok(ConnectionTarget::Url(Secret::new(url)));
    }

    let explicit_host = non_blank(raw.host.as_deref());
    if explicit_host.is_none()
        && let Some(url) = flagged(raw, env.connection_string.as_ref())
    {
        tracing::debug!("Using default connection string {}", redact_connection_url(&url));
        return Ok(ConnectionTarget::Url(Secret::new(url)));
    }

    let host = explicit_host
        .or_else(|| flagged(raw, env.host.as_ref()))
        .unwrap_or_default();
    let port = raw
        .port
        .or(if raw.use_default_database { env.port } else { None })
        .unwrap_or(default_port);
    let database = non_blank(raw.database.as_deref()).or_else(|| flagged(raw, env.database.as_ref()));
    let username = non_blank(raw.user.as_deref()).or_else(|| flagged(raw, env.username.as_ref()));
    let password = raw
        .password
        .clone()
        .filter(|p| !p.is_empty())
        .or_else(|| flagged(raw, env.password.as_ref()));

    Ok(ConnectionTarget::Discrete(Endpoint {
        host,
        port,
        database,
        credentials: username.map(|user| Credentials::new(user, password)),
    }))
}

fn resolve_spreadsheet(raw: &RawSourceConfig) -> Result<SpreadsheetConfig> {
    let location = non_blank(raw.file_path.as_deref())
        .or_else(|| non_blank(raw.connection_string.as_deref()))
        .ok_or_else(|| {
            ConnectorError::configuration("File path or URL is required for spreadsheet sources")
        })?;

    let location = if location.starts_with("http://") || location.starts_with("https://") {
        let url = Url::parse(&location).map_err(|e| {
            ConnectorError::configuration(format!("Invalid spreadsheet URL: {e}"))
        })?;
        SpreadsheetLocation::Remote(url)
    } else {
        SpreadsheetLocation::File(PathBuf::from(location))
    };

    Ok(SpreadsheetConfig {
        location,
        sheet: non_blank(raw.table.as_deref()),
    })
}

fn resolve_list_service(raw: &RawSourceConfig) -> Result<ListServiceConfig> {
    let site = non_blank(raw.site_url.as_deref())
        .or_else(|| non_blank(raw.connection_string.as_deref()))
        .ok_or_else(|| {
            ConnectorError::configuration("Site URL is required for list service connections")
        })?;

    let mut site_url = Url::parse(&site)
        .map_err(|e| ConnectorError::configuration(format!("Invalid site URL: {e}")))?;
    if !matches!(site_url.scheme(), "http" | "https") {
        return Err(ConnectorError::configuration(
            "Site URL must use http or https",
        ));
    }
    // Relative API paths are joined onto the site, so it must end in '/'.
    if !site_url.path().ends_with('/') {
        let path = format!("{}/", site_url.path());
        site_url.set_path(&path);
    }

    let auth = if let Some(token) = non_blank(raw.access_token.as_deref()) {
        ListAuth::Bearer(Secret::new(token))
    } else if let Some(user) = non_blank(raw.user.as_deref()) {
        ListAuth::Basic(Credentials::new(user, raw.password.clone()))
    } else {
        ListAuth::Anonymous
    };

    Ok(ListServiceConfig {
        site_url,
        list: non_blank(raw.table.as_deref()),
        auth,
    })
}
