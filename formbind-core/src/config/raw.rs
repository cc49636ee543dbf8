//! The caller-supplied configuration bag.
//!
//! Form administrators type connection settings into a UI, and stored data
//! sources arrive from the persistence layer, so the same setting shows up
//! under several spellings. `RawSourceConfig` accepts all of them and nothing
//! more; turning it into something an engine can use is the resolver's job.

use crate::{Result, error::ConnectorError};
use serde::{Deserialize, Deserializer};
use serde_json::Value as JsonValue;

/// Untyped connection parameters, as supplied by the caller.
///
/// Unknown keys are ignored. Every field is optional here; requirements are
/// enforced per engine during resolution.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawSourceConfig {
    /// Relational dialect tag (`postgres`, `mysql`, `mssql`, `oracle`, `sqlite`)
    #[serde(alias = "dbType", alias = "engine", alias = "driver")]
    pub dialect: Option<String>,

    /// Full connection string or URI; wins over every discrete field
    #[serde(
        alias = "connection_string",
        alias = "uri",
        alias = "url",
        alias = "connectionUri"
    )]
    pub connection_string: Option<String>,

    /// Server host name or address
    #[serde(alias = "server", alias = "hostname")]
    pub host: Option<String>,

    /// Server port
    #[serde(deserialize_with = "deserialize_port")]
    pub port: Option<u16>,

    /// Database, service name, or document database
    #[serde(alias = "databaseName", alias = "db", alias = "dbName", alias = "serviceName")]
    pub database: Option<String>,

    /// Schema (or Oracle owner) to introspect
    pub schema: Option<String>,

    /// Login name
    #[serde(alias = "username", alias = "userName", alias = "login")]
    pub user: Option<String>,

    /// Login password
    pub password: Option<String>,

    /// Table, collection, list, or sheet to operate on
    #[serde(
        alias = "tableName",
        alias = "collection",
        alias = "collectionName",
        alias = "list",
        alias = "listName",
        alias = "listTitle",
        alias = "sheet",
        alias = "sheetName"
    )]
    pub table: Option<String>,

    /// Local file path or http(s) URL of a file-based source
    #[serde(alias = "path", alias = "file", alias = "fileUrl", alias = "filename")]
    pub file_path: Option<String>,

    /// Base URL of a remote list service site
    #[serde(alias = "site", alias = "baseUrl")]
    pub site_url: Option<String>,

    /// Bearer token for the remote list service
    #[serde(alias = "token", alias = "bearerToken")]
    pub access_token: Option<String>,

    /// MongoDB authentication database
    #[serde(alias = "authDatabase")]
    pub auth_source: Option<String>,

    /// Use the environment defaults for any field not given explicitly
    #[serde(
        alias = "useDefault",
        alias = "useEnvironmentDefault",
        alias = "useDefaultConnection"
    )]
    pub use_default_database: bool,

    /// Accept the SQL Server certificate without validation
    #[serde(alias = "trustCert")]
    pub trust_server_certificate: Option<bool>,

    /// Require (or disable) SQL Server transport encryption
    pub encrypt: Option<bool>,
}

impl RawSourceConfig {
    /// Parses a config as supplied by a caller.
    ///
    /// Stored data sources may carry their config as a serialized JSON
    /// string; that string is parsed once before use. `null` is treated as
    /// an empty config.
    ///
    /// # Errors
    /// Returns a configuration error if the value is not an object or a
    /// string holding one.
    pub fn from_value(value: &JsonValue) -> Result<Self> {
        match value {
            JsonValue::Null => Ok(Self::default()),
            JsonValue::String(text) => {
                let parsed: JsonValue = serde_json::from_str(text).map_err(|e| {
                    ConnectorError::configuration(format!(
                        "Stored configuration is not valid JSON: {e}"
                    ))
                })?;
                match parsed {
                    JsonValue::String(_) => Err(ConnectorError::configuration(
                        "Configuration must be a JSON object",
                    )),
                    other => Self::from_value(&other),
                }
            }
            JsonValue::Object(_) => Self::deserialize(value).map_err(|e| {
                ConnectorError::configuration(format!("Invalid configuration: {e}"))
            }),
            _ => Err(ConnectorError::configuration(
                "Configuration must be a JSON object",
            )),
        }
    }
}

/// Returns `Some(trimmed)` for non-blank strings.
pub(crate) fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}

/// Accepts ports as numbers or numeric strings; blank strings mean "unset".
fn deserialize_port<'de, D>(deserializer: D) -> std::result::Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let value = Option::<JsonValue>::deserialize(deserializer)?;
    match value {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::Number(number)) => number
            .as_u64()
            .and_then(|n| u16::try_from(n).ok())
            .filter(|n| *n > 0)
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("invalid port number: {number}"))),
        Some(JsonValue::String(text)) if text.trim().is_empty() => Ok(None),
        Some(JsonValue::String(text)) => text
            .trim()
            .parse::<u16>()
            .ok()
            .filter(|n| *n > 0)
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("invalid port number: {text}"))),
        Some(other) => Err(D::Error::custom(format!("invalid port value: {other}"))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parses_aliases() {
        let config = RawSourceConfig::from_value(&json!({
            "dbType": "mssql",
            "server": "db.internal",
            "port": "1433",
            "databaseName": "forms",
            "username": "sa",
            "password": "pw",
            "useDefaultDatabase": false
        }))
        .unwrap();

        assert_eq!(config.dialect.as_deref(), Some("mssql"));
        assert_eq!(config.host.as_deref(), Some("db.internal"));
        assert_eq!(config.port, Some(1433));
        assert_eq!(config.database.as_deref(), Some("forms"));
        assert_eq!(config.user.as_deref(), Some("sa"));
        assert!(!config.use_default_database);
    }

    #[test]
    fn test_parses_serialized_string_once() {
        let stored = json!("{\"host\":\"localhost\",\"port\":5432}");
        let config = RawSourceConfig::from_value(&stored).unwrap();
        assert_eq!(config.host.as_deref(), Some("localhost"));
        assert_eq!(config.port, Some(5432));
    }

    #[test]
    fn test_null_is_empty_config() {
        let config = RawSourceConfig::from_value(&JsonValue::Null).unwrap();
        assert_eq!(config, RawSourceConfig::default());
    }

    #[test]
    fn test_rejects_non_object() {
        assert!(RawSourceConfig::from_value(&json!(42)).is_err());
        assert!(RawSourceConfig::from_value(&json!("not json")).is_err());
        assert!(RawSourceConfig::from_value(&json!("\"nested\"")).is_err());
    }

    #[test]
    fn test_port_validation() {
        assert_eq!(
            RawSourceConfig::from_value(&json!({"port": ""})).unwrap().port,
            None
        );
        assert!(RawSourceConfig::from_value(&json!({"port": 0})).is_err());
        assert!(RawSourceConfig::from_value(&json!({"port": 70000})).is_err());
        assert!(RawSourceConfig::from_value(&json!({"port": "abc"})).is_err());
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let config = RawSourceConfig::from_value(&json!({"color": "blue", "host": "h"})).unwrap();
        assert_eq!(config.host.as_deref(), Some("h"));
    }

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank(Some("  x ")), Some("x".to_string()));
        assert_eq!(non_blank(Some("   ")), None);
        assert_eq!(non_blank(None), None);
    }
}
