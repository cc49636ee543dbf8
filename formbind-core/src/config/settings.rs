//! Connector-wide operational limits.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timeouts and introspection caps applied to every connector call.
///
/// # Example
/// ```rust
/// use formbind_core::config::ConnectorSettings;
/// use std::time::Duration;
///
/// let settings = ConnectorSettings::default().with_connect_timeout(Duration::from_secs(2));
/// assert!(settings.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorSettings {
    /// Upper bound on acquiring a connection or session
    pub connect_timeout: Duration,
    /// Upper bound on running one query, release included
    pub query_timeout: Duration,
    /// Maximum catalog columns read during a connection test
    pub introspection_column_limit: u32,
    /// Documents sampled per collection during a connection test
    pub document_sample_size: u32,
    /// Maximum lists enumerated on a remote list service
    pub list_limit: u32,
    /// Row cap for document, spreadsheet, and list queries
    pub row_limit: u32,
}

impl Default for ConnectorSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            query_timeout: Duration::from_secs(30),
            introspection_column_limit: 100,
            document_sample_size: 1,
            list_limit: 100,
            row_limit: 1000,
        }
    }
}

impl ConnectorSettings {
    /// Validates the limits.
    ///
    /// # Errors
    /// Returns error if a timeout or cap is zero
    pub fn validate(&self) -> crate::Result<()> {
        if self.connect_timeout.is_zero() {
            return Err(crate::error::ConnectorError::configuration(
                "connect_timeout must be greater than 0",
            ));
        }

        if self.query_timeout.is_zero() {
            return Err(crate::error::ConnectorError::configuration(
                "query_timeout must be greater than 0",
            ));
        }

        if self.introspection_column_limit == 0 {
            return Err(crate::error::ConnectorError::configuration(
                "introspection_column_limit must be greater than 0",
            ));
        }

        if self.document_sample_size == 0 {
            return Err(crate::error::ConnectorError::configuration(
                "document_sample_size must be greater than 0",
            ));
        }

        if self.list_limit == 0 || self.row_limit == 0 {
            return Err(crate::error::ConnectorError::configuration(
                "list_limit and row_limit must be greater than 0",
            ));
        }

        Ok(())
    }

    /// Builder method to set the connect timeout.
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Builder method to set the query timeout.
    pub const fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Builder method to set the row cap.
    pub const fn with_row_limit(mut self, limit: u32) -> Self {
        self.row_limit = limit;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = ConnectorSettings::default();
        assert_eq!(settings.connect_timeout, Duration::from_secs(5));
        assert_eq!(settings.introspection_column_limit, 100);
        assert_eq!(settings.document_sample_size, 1);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_zero() {
        let settings = ConnectorSettings::default().with_connect_timeout(Duration::ZERO);
        assert!(settings.validate().is_err());

        let settings = ConnectorSettings::default().with_query_timeout(Duration::ZERO);
        assert!(settings.validate().is_err());

        let settings = ConnectorSettings::default().with_row_limit(0);
        assert!(settings.validate().is_err());

        let settings = ConnectorSettings {
            introspection_column_limit: 0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }
}
