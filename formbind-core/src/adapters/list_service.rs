//! Remote list service adapter (SharePoint-style REST API).
//!
//! Lists play the role of tables and list fields the role of columns. The
//! native query language is a set of OData query options, for example
//! `$filter=Status eq 'Open'&$select=Title,Status&$top=10`.
//!
//! # Endpoints
//! - `_api/web`: site liveness and title; the server version comes from the
//!   `MicrosoftSharePointTeamServices` response header
//! - `_api/web/lists`: visible lists
//! - `_api/web/lists/getbytitle('<list>')/fields`: visible, writable fields
//! - `_api/web/lists/getbytitle('<list>')/items`: rows

use super::{SourceAdapter, TransportResponse, bounded, transport::ListTransport};
use crate::{
    Result,
    config::{ConnectorSettings, ListServiceConfig, resolve_table},
    error::ConnectorError,
    models::{ConnectionInfo, Engine, FieldDescriptor, QueryOutput, SchemaSnapshot, TableFields},
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use url::Url;

/// Response header carrying the server build number.
const VERSION_HEADER: &str = "MicrosoftSharePointTeamServices";

/// OData query options accepted in query text.
const QUERY_OPTIONS: &[&str] = &["$filter", "$select", "$orderby", "$top", "$skip", "$expand"];

/// Error reported by the list service itself.
#[derive(Debug, thiserror::Error)]
#[error("HTTP {status}: {message}")]
pub struct ServiceError {
    /// HTTP status code
    pub status: u16,
    /// The service's own message, or a generic one per status
    pub message: String,
}

impl ServiceError {
    /// Extracts the service's own message from an error response.
    fn from_response(response: &TransportResponse) -> Self {
        let message = serde_json::from_str::<JsonValue>(&response.body)
            .ok()
            .and_then(|body| {
                let error = body.get("odata.error").or_else(|| body.get("error"))?;
                let message = error.get("message")?;
                message
                    .get("value")
                    .and_then(JsonValue::as_str)
                    .or_else(|| message.as_str())
                    .map(ToString::to_string)
            })
            .unwrap_or_else(|| match response.status {
                401 => "Unauthorized".to_string(),
                403 => "Access denied".to_string(),
                404 => "Not found".to_string(),
                _ => "Request failed".to_string(),
            });

        Self {
            status: response.status,
            message,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Collection<T> {
    value: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WebInfo {
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListInfo {
    title: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct FieldInfo {
    internal_name: String,
    type_as_string: String,
}

/// Adapter for the remote list service.
pub struct ListServiceAdapter {
    config: ListServiceConfig,
    settings: ConnectorSettings,
    transport: Arc<dyn ListTransport>,
}

impl std::fmt::Debug for ListServiceAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListServiceAdapter")
            .field("site_url", &self.config.site_url.as_str())
            .field("list", &self.config.list)
            .finish_non_exhaustive()
    }
}

impl ListServiceAdapter {
    /// Creates an adapter that issues its requests through `transport`.
    pub fn new(
        config: ListServiceConfig,
        settings: ConnectorSettings,
        transport: Arc<dyn ListTransport>,
    ) -> Self {
        Self {
            config,
            settings,
            transport,
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.config
            .site_url
            .join(path)
            .map_err(|e| ConnectorError::configuration(format!("Invalid list service path: {e}")))
    }

    fn list_endpoint(&self, list: &str, suffix: &str) -> Result<Url> {
        self.endpoint(&format!(
            "_api/web/lists/getbytitle('{}')/{suffix}",
            encode_path_segment(&escape_odata_literal(list))
        ))
    }

    async fn fetch(&self, url: &Url) -> Result<TransportResponse> {
        tracing::debug!("List service GET {}", url.path());
        self.transport.get(url, &self.config.auth).await
    }

    async fn site_info(&self) -> Result<ConnectionInfo> {
        let url = self.endpoint("_api/web")?;
        let response = bounded(
            "Connection attempt",
            self.settings.connect_timeout,
            self.fetch(&url),
        )
        .await?;

        if !response.is_success() {
            return Err(ConnectorError::connection_failed(
                "Site request was rejected",
                ServiceError::from_response(&response),
            ));
        }

        let web: WebInfo = serde_json::from_str(&response.body).map_err(|e| {
            ConnectorError::connection_failed("Site response is not a list service payload", e)
        })?;

        Ok(ConnectionInfo {
            server: self.config.site_url.host_str().map(ToString::to_string),
            database: web.title,
            version: response.header(VERSION_HEADER).map(ToString::to_string),
            ..Default::default()
        })
    }

    async fn lists(&self) -> Result<Vec<String>> {
        let mut url = self.endpoint("_api/web/lists")?;
        url.query_pairs_mut()
            .append_pair("$filter", "Hidden eq false")
            .append_pair("$select", "Title")
            .append_pair("$top", &self.settings.list_limit.to_string());

        let response = self.fetch(&url).await?;
        if !response.is_success() {
            return Err(ConnectorError::introspection_failed(
                "Failed to enumerate lists",
                ServiceError::from_response(&response),
            ));
        }

        let lists: Collection<ListInfo> = serde_json::from_str(&response.body)
            .map_err(|e| ConnectorError::introspection_failed("Unexpected list payload", e))?;
        Ok(lists.value.into_iter().map(|list| list.title).collect())
    }

    async fn fields(&self, list: &str) -> Result<Vec<FieldDescriptor>> {
        let mut url = self.list_endpoint(list, "fields")?;
        url.query_pairs_mut()
            .append_pair("$filter", "Hidden eq false and ReadOnlyField eq false")
            .append_pair("$select", "InternalName,TypeAsString");

        let response = self.fetch(&url).await?;
        if !response.is_success() {
            return Err(ConnectorError::introspection_failed(
                format!("Failed to read fields of list '{list}'"),
                ServiceError::from_response(&response),
            ));
        }

        let fields: Collection<FieldInfo> = serde_json::from_str(&response.body)
            .map_err(|e| ConnectorError::introspection_failed("Unexpected field payload", e))?;

        // Item identity is read-only, so the writable-field filter drops it.
        let mut descriptors = vec![FieldDescriptor::with_selected("ID", "Counter", true)];
        descriptors.extend(
            fields
                .value
                .into_iter()
                .filter(|field| !field.internal_name.eq_ignore_ascii_case("ID"))
                .map(|field| FieldDescriptor::new(field.internal_name, field.type_as_string)),
        );
        Ok(descriptors)
    }
}

#[async_trait]
impl SourceAdapter for ListServiceAdapter {
    fn engine(&self) -> Engine {
        Engine::ListService
    }

    async fn test(&self) -> Result<SchemaSnapshot> {
        bounded("Schema introspection", self.settings.query_timeout, async {
            let info = self.site_info().await?;
            let tables = self.lists().await?;

            // Only the bound list (or the first one) is described.
            let mut fields = TableFields::new();
            if let Ok(list) = resolve_table(self.config.list.as_deref(), &tables, "list") {
                let descriptors = self.fields(&list).await?;
                fields.insert(list, descriptors);
            }

            Ok(SchemaSnapshot {
                info,
                tables,
                fields,
            })
        })
        .await
    }

    async fn query(&self, query: &str) -> Result<QueryOutput> {
        let options = parse_query_options(query, self.settings.row_limit)?;

        bounded("Query", self.settings.query_timeout, async {
            let list = match self.config.list.as_deref() {
                Some(list) => list.to_string(),
                None => resolve_table(None, &self.lists().await?, "list")?,
            };

            let mut url = self.list_endpoint(&list, "items")?;
            {
                let mut pairs = url.query_pairs_mut();
                for (key, value) in &options {
                    pairs.append_pair(key, value);
                }
            }

            let response = self.fetch(&url).await?;
            if !response.is_success() {
                return Err(ConnectorError::query_failed(
                    format!("Items request for list '{list}' was rejected"),
                    ServiceError::from_response(&response),
                ));
            }

            let items: Collection<JsonValue> = serde_json::from_str(&response.body)
                .map_err(|e| ConnectorError::query_failed("Unexpected items payload", e))?;

            Ok(QueryOutput {
                rows: items.value,
                fields: None,
            })
        })
        .await
    }
}

/// Parses query text into OData options.
///
/// A leading `?` is allowed. `$top` is capped at `row_limit` and added when
/// absent.
fn parse_query_options(query: &str, row_limit: u32) -> Result<Vec<(String, String)>> {
    let query = query.trim().trim_start_matches('?');
    let mut options: Vec<(String, String)> = Vec::new();

    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        let key = key.trim().to_ascii_lowercase();
        if !QUERY_OPTIONS.contains(&key.as_str()) {
            return Err(ConnectorError::query_parse(format!(
                "Unsupported query option '{key}'; expected OData options such as $filter, $select, $orderby, $top"
            )));
        }
        if options.iter().any(|(existing, _)| *existing == key) {
            return Err(ConnectorError::query_parse(format!(
                "Query option '{key}' given more than once"
            )));
        }
        if key == "$top" || key == "$skip" {
            let count: u32 = value.trim().parse().map_err(|_| {
                ConnectorError::query_parse(format!("{key} must be a non-negative integer"))
            })?;
            let count = if key == "$top" { count.min(row_limit) } else { count };
            options.push((key, count.to_string()));
        } else {
            options.push((key, value.into_owned()));
        }
    }

    if !options.iter().any(|(key, _)| key == "$top") {
        options.push(("$top".to_string(), row_limit.to_string()));
    }
    Ok(options)
}

/// Escapes a value for use inside an OData string literal.
fn escape_odata_literal(value: &str) -> String {
    value.replace('\'', "''")
}

/// Percent-encodes the characters a relative URL join would read as a
/// query, a fragment, a path separator, or an escape.
fn encode_path_segment(value: &str) -> String {
    let mut encoded = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '%' => encoded.push_str("%25"),
            '?' => encoded.push_str("%3F"),
            '#' => encoded.push_str("%23"),
            '/' => encoded.push_str("%2F"),
            '\\' => encoded.push_str("%5C"),
            other => encoded.push(other),
        }
    }
    encoded
}
