//! HTTP transport seam for the remote list service.
//!
//! The list adapter only ever issues authenticated GET requests and reads
//! status, headers, and body. That is all [`ListTransport`] exposes, so the
//! adapter can be driven by a canned transport in tests and by
//! [`HttpListTransport`] everywhere else.

use crate::{Result, config::ListAuth};
use async_trait::async_trait;
use std::collections::BTreeMap;
use url::Url;

/// Media type requested from the list service.
pub const ODATA_ACCEPT: &str = "application/json;odata=nometadata";

/// A fully-read HTTP response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportResponse {
    /// HTTP status code
    pub status: u16,
    /// Header names are stored lowercased
    pub headers: BTreeMap<String, String>,
    /// Response body, decoded as UTF-8
    pub body: String,
}

impl TransportResponse {
    /// A 200 response with a body and no headers.
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    /// Looks up a header case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Whether the status is 2xx.
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Issues GET requests against the list service.
#[async_trait]
pub trait ListTransport: Send + Sync {
    /// Fetches `url` with the given authentication.
    ///
    /// # Errors
    /// Returns a connection error if no response could be obtained. Non-2xx
    /// responses are returned, not turned into errors.
    async fn get(&self, url: &Url, auth: &ListAuth) -> Result<TransportResponse>;
}

/// Default transport backed by `reqwest`.
#[cfg(feature = "list-service")]
#[derive(Debug, Clone)]
pub struct HttpListTransport {
    client: reqwest::Client,
}

#[cfg(feature = "list-service")]
impl HttpListTransport {
    /// Builds a client bounded by the connector's connect and query timeouts.
    ///
    /// # Errors
    /// Returns error if the TLS backend cannot be initialized
    pub fn new(settings: &crate::config::ConnectorSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.query_timeout)
            .user_agent(concat!("formbind/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                crate::error::ConnectorError::connection_failed("Failed to create HTTP client", e)
            })?;
        Ok(Self { client })
    }
}

#[cfg(feature = "list-service")]
#[async_trait]
impl ListTransport for HttpListTransport {
    async fn get(&self, url: &Url, auth: &ListAuth) -> Result<TransportResponse> {
        let mut request = self
            .client
            .get(url.clone())
            .header(reqwest::header::ACCEPT, ODATA_ACCEPT);

        request = match auth {
            ListAuth::Anonymous => request,
            ListAuth::Bearer(token) => request.bearer_auth(token.expose()),
            ListAuth::Basic(credentials) => {
                request.basic_auth(credentials.username(), credentials.password())
            }
        };

        let response = request.send().await.map_err(|e| {
            crate::error::ConnectorError::connection_failed(
                format!("Request to {} failed", url.host_str().unwrap_or("list service")),
                e.without_url(),
            )
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_ascii_lowercase(), value.to_string()))
            })
            .collect();
        let body = response.text().await.map_err(|e| {
            crate::error::ConnectorError::connection_failed(
                "Failed to read list service response",
                e.without_url(),
            )
        })?;

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}
