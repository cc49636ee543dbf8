//! Environment defaults for data sources that opt into them.
//!
//! A data source flagged `useDefaultDatabase` borrows whatever it does not
//! specify from the deployment's own database settings. Those settings are
//! captured once into an [`EnvironmentDefaults`] value and passed to the
//! resolver explicitly; nothing in the connector reads the process
//! environment behind the caller's back.

use crate::config::raw::non_blank;

/// Default connection parameters for one engine family.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct DefaultEndpoint {
    /// Full connection string (`*_URL` / `*_URI`)
    pub connection_string: Option<String>,
    /// Server host
    pub host: Option<String>,
    /// Server port
    pub port: Option<u16>,
    /// Database name, or file path for SQLite
    pub database: Option<String>,
    /// Schema to introspect
    pub schema: Option<String>,
    /// Login name
    pub username: Option<String>,
    /// Login password
    pub password: Option<String>,
}

impl std::fmt::Debug for DefaultEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultEndpoint")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("schema", &self.schema)
            .field("has_connection_string", &self.connection_string.is_some())
            .field("has_credentials", &self.username.is_some())
            .finish()
    }
}

impl DefaultEndpoint {
    /// Reads `<PREFIX>_URL` (or `<PREFIX>_URI`), `_HOST`, `_PORT`, `_NAME`
    /// (or `_DATABASE`), `_SCHEMA`, `_USER`, and `_PASSWORD`.
    ///
    /// Blank variables are treated as unset, and an unparsable port is
    /// ignored with a warning.
    pub fn from_env_prefix(prefix: &str) -> Self {
        let var = |suffix: &str| {
            let value = std::env::var(format!("{prefix}_{suffix}")).ok();
            non_blank(value.as_deref())
        };

        let port = var("PORT").and_then(|raw| match raw.parse::<u16>() {
            Ok(port) if port > 0 => Some(port),
            _ => {
                tracing::warn!("Ignoring invalid {}_PORT value", prefix);
                None
            }
        });

        Self {
            connection_string: var("URL").or_else(|| var("URI")),
            host: var("HOST"),
            port,
            database: var("NAME").or_else(|| var("DATABASE")),
            schema: var("SCHEMA"),
            username: var("USER"),
            password: var("PASSWORD"),
        }
    }

    /// Returns true when no default is configured at all.
    pub const fn is_empty(&self) -> bool {
        self.connection_string.is_none()
            && self.host.is_none()
            && self.port.is_none()
            && self.database.is_none()
            && self.schema.is_none()
            && self.username.is_none()
            && self.password.is_none()
    }
}

/// Deployment-wide defaults injected into the config resolver.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentDefaults {
    /// Defaults for the relational family (`DB_*`)
    pub relational: DefaultEndpoint,
    /// Defaults for the document store (`MONGODB_*`)
    pub document: DefaultEndpoint,
}

impl EnvironmentDefaults {
    /// Captures the `DB_*` and `MONGODB_*` variables of the current process.
    ///
    /// # Example
    /// ```rust,no_run
    /// use formbind_core::config::{ConfigResolver, EnvironmentDefaults};
    ///
    /// let resolver = ConfigResolver::new(EnvironmentDefaults::from_env());
    /// ```
    pub fn from_env() -> Self {
        let defaults = Self {
            relational: DefaultEndpoint::from_env_prefix("DB"),
            document: DefaultEndpoint::from_env_prefix("MONGODB"),
        };
        tracing::debug!(
            relational_configured = !defaults.relational.is_empty(),
            document_configured = !defaults.document.is_empty(),
            "Loaded environment defaults"
        );
        defaults
    }

    /// No defaults at all; flagged sources then fall back to engine defaults.
    pub fn none() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_env_reads_prefixed_variables() {
        temp_env::with_vars(
            [
                ("TESTDB_HOST", Some("db.example.com")),
                ("TESTDB_PORT", Some("6543")),
                ("TESTDB_NAME", Some("forms")),
                ("TESTDB_USER", Some("app")),
                ("TESTDB_PASSWORD", Some("secret")),
                ("TESTDB_URL", None),
                ("TESTDB_URI", None),
            ],
            || {
                let endpoint = DefaultEndpoint::from_env_prefix("TESTDB");
                assert_eq!(endpoint.host.as_deref(), Some("db.example.com"));
                assert_eq!(endpoint.port, Some(6543));
                assert_eq!(endpoint.database.as_deref(), Some("forms"));
                assert_eq!(endpoint.username.as_deref(), Some("app"));
                assert_eq!(endpoint.password.as_deref(), Some("secret"));
                assert!(endpoint.connection_string.is_none());
            },
        );
    }

    #[test]
    fn test_from_env_uri_fallback_and_bad_port() {
        temp_env::with_vars(
            [
                ("TESTMONGO_URL", None),
                ("TESTMONGO_URI", Some("mongodb://localhost/app")),
                ("TESTMONGO_PORT", Some("not-a-port")),
                ("TESTMONGO_HOST", Some("   ")),
            ],
            || {
                let endpoint = DefaultEndpoint::from_env_prefix("TESTMONGO");
                assert_eq!(
                    endpoint.connection_string.as_deref(),
                    Some("mongodb://localhost/app")
                );
                assert_eq!(endpoint.port, None);
                assert_eq!(endpoint.host, None);
            },
        );
    }

    #[test]
    fn test_debug_hides_password() {
        let endpoint = DefaultEndpoint {
            password: Some("hunter2".to_string()),
            connection_string: Some("postgres://u:hunter2@h/db".to_string()),
            ..Default::default()
        };
        assert!(!format!("{endpoint:?}").contains("hunter2"));
    }

    #[test]
    fn test_none_is_empty() {
        let defaults = EnvironmentDefaults::none();
        assert!(defaults.relational.is_empty());
        assert!(defaults.document.is_empty());
    }
}
