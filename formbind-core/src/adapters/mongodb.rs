//! MongoDB adapter.
//!
//! Collections are schema-less, so a connection test samples documents per
//! collection (one by default) and types each field by the runtime kind of
//! its sampled value. Queries are JSON filter documents; the filter is parsed
//! before any connection is opened, so a malformed filter never reaches the
//! server.

use super::{EngineSession, SourceAdapter, connect_with_timeout, with_session};
use crate::{
    Result,
    config::{ConnectionTarget, ConnectorSettings, MongoConfig, resolve_table},
    error::ConnectorError,
    models::{ConnectionInfo, Engine, FieldDescriptor, QueryOutput, SchemaSnapshot, TableFields},
    normalize::binary_to_json,
};
use async_trait::async_trait;
use futures::FutureExt;
use mongodb::Client;
use mongodb::bson::{Bson, Document, doc};
use mongodb::options::{ClientOptions, Credential, ServerAddress};
use serde_json::Value as JsonValue;

/// Identity key every document carries.
const ID_FIELD: &str = "_id";

#[async_trait]
impl EngineSession for Client {
    async fn release(self) {
        self.shutdown().await;
    }
}

/// Adapter for MongoDB deployments, standalone or replica set.
#[derive(Debug, Clone)]
pub struct MongoAdapter {
    config: MongoConfig,
    settings: ConnectorSettings,
}

impl MongoAdapter {
    /// Creates an adapter; no connection is opened until a call.
    pub const fn new(config: MongoConfig, settings: ConnectorSettings) -> Self {
        Self { config, settings }
    }

    async fn client_options(&self) -> Result<ClientOptions> {
        let mut options = match &self.config.target {
            ConnectionTarget::Url(secret) => {
                ClientOptions::parse(secret.expose()).await.map_err(|e| {
                    ConnectorError::configuration(format!(
                        "Failed to parse MongoDB connection options: {e}"
                    ))
                })?
            }
            ConnectionTarget::Discrete(endpoint) => {
                let address = ServerAddress::parse(format!("{}:{}", endpoint.host, endpoint.port))
                    .map_err(|e| {
                        ConnectorError::configuration(format!("Invalid MongoDB host: {e}"))
                    })?;
                let mut options = ClientOptions::default();
                options.hosts = vec![address];
                options.default_database.clone_from(&endpoint.database);
                if let Some(credentials) = &endpoint.credentials {
                    let mut credential = Credential::default();
                    credential.username = Some(credentials.username().to_string());
                    credential.password = credentials.password().map(ToString::to_string);
                    options.credential = Some(credential);
                }
                options
            }
        };

        if let Some(source) = &self.config.auth_source
            && let Some(credential) = options.credential.as_mut()
        {
            credential.source = Some(source.clone());
        }

        options.connect_timeout = Some(self.settings.connect_timeout);
        options.server_selection_timeout = Some(self.settings.connect_timeout);
        options.app_name = Some(format!("formbind-{}", env!("CARGO_PKG_VERSION")));
        Ok(options)
    }

    /// Opens a client and proves the deployment answers.
    ///
    /// Client construction is lazy, so a `ping` is what actually connects.
    async fn connect(&self) -> Result<(Client, String)> {
        let options = self.client_options().await?;
        let database = self
            .config
            .database
            .clone()
            .or_else(|| options.default_database.clone())
            .ok_or_else(|| {
                ConnectorError::configuration("Database name is required for MongoDB connections")
            })?;
        let server = self.config.target.server_label().unwrap_or_default();

        let client = Client::with_options(options).map_err(|e| {
            ConnectorError::connection_failed(format!("Failed to create MongoDB client for {server}"), e)
        })?;

        let ping = connect_with_timeout(self.settings.connect_timeout, async {
            client
                .database("admin")
                .run_command(doc! { "ping": 1 })
                .await
                .map_err(|e| {
                    ConnectorError::connection_failed(
                        format!("Failed to connect to MongoDB at {server}"),
                        e,
                    )
                })
        })
        .await;

        match ping {
            Ok(_) => Ok((client, database)),
            Err(e) => {
                client.release().await;
                Err(e)
            }
        }
    }
}

#[async_trait]
impl SourceAdapter for MongoAdapter {
    fn engine(&self) -> Engine {
        Engine::MongoDb
    }

    async fn test(&self) -> Result<SchemaSnapshot> {
        let (client, database) = self.connect().await?;
        let sample_size = i64::from(self.settings.document_sample_size);
        let collection_limit = usize::try_from(self.settings.list_limit).unwrap_or(usize::MAX);
        let server = self.config.target.server_label();

        with_session(
            client,
            "Schema introspection",
            Some(self.settings.query_timeout),
            move |client| {
                async move {
                    let version = client
                        .database("admin")
                        .run_command(doc! { "buildInfo": 1 })
                        .await
                        .ok()
                        .and_then(|info| info.get_str("version").ok().map(ToString::to_string));

                    let db = client.database(&database);
                    let mut tables = visible_collections(
                        db.list_collection_names().await.map_err(|e| {
                            ConnectorError::introspection_failed(
                                format!("Failed to list collections of '{database}'"),
                                e,
                            )
                        })?,
                    );
                    tables.truncate(collection_limit);

                    let mut fields = TableFields::new();
                    for name in &tables {
                        let mut cursor = db
                            .collection::<Document>(name)
                            .find(doc! {})
                            .limit(sample_size)
                            .await
                            .map_err(|e| {
                                ConnectorError::introspection_failed(
                                    format!("Failed to sample documents from '{database}.{name}'"),
                                    e,
                                )
                            })?;

                        let mut samples = Vec::new();
                        while cursor.advance().await.map_err(|e| {
                            ConnectorError::introspection_failed(
                                format!("Failed to iterate cursor for '{database}.{name}'"),
                                e,
                            )
                        })? {
                            samples.push(cursor.deserialize_current().map_err(|e| {
                                ConnectorError::introspection_failed(
                                    format!("Failed to read document from '{database}.{name}'"),
                                    e,
                                )
                            })?);
                        }
                        fields.insert(name.clone(), fields_from_documents(&samples));
                    }

                    Ok(SchemaSnapshot {
                        info: ConnectionInfo {
                            server,
                            database: Some(database),
                            version,
                            ..Default::default()
                        },
                        tables,
                        fields,
                    })
                }
                .boxed()
            },
        )
        .await
    }

    async fn query(&self, query: &str) -> Result<QueryOutput> {
        let filter = parse_filter(query)?;
        let (client, database) = self.connect().await?;
        let configured = self.config.collection.clone();
        let row_limit = i64::from(self.settings.row_limit);

        with_session(
            client,
            "Query",
            Some(self.settings.query_timeout),
            move |client| {
                async move {
                    let db = client.database(&database);
                    let collection = match configured {
                        Some(name) => name,
                        None => {
                            let names = visible_collections(
                                db.list_collection_names().await.map_err(|e| {
                                    ConnectorError::query_failed("Failed to list collections", e)
                                })?,
                            );
                            resolve_table(None, &names, "collection")?
                        }
                    };

                    let mut cursor = db
                        .collection::<Document>(&collection)
                        .find(filter)
                        .limit(row_limit)
                        .await
                        .map_err(|e| ConnectorError::query_failed("Filter was rejected", e))?;

                    let mut documents = Vec::new();
                    while cursor
                        .advance()
                        .await
                        .map_err(|e| ConnectorError::query_failed("Failed to iterate cursor", e))?
                    {
                        documents.push(cursor.deserialize_current().map_err(|e| {
                            ConnectorError::query_failed("Failed to read document", e)
                        })?);
                    }

                    // Documents are schema-less, so no field list is reported.
                    Ok(QueryOutput {
                        rows: documents.into_iter().map(document_to_json).collect(),
                        fields: None,
                    })
                }
                .boxed()
            },
        )
        .await
    }
}

/// Parses a query as a JSON filter document.
///
/// A blank query matches every document. Extended JSON such as
/// `{"$oid": "..."}` is accepted.
fn parse_filter(query: &str) -> Result<Document> {
    if query.trim().is_empty() {
        return Ok(Document::new());
    }

    let value: JsonValue = serde_json::from_str(query)
        .map_err(|e| ConnectorError::query_parse(format!("Filter is not valid JSON: {e}")))?;
    let JsonValue::Object(map) = value else {
        return Err(ConnectorError::query_parse("Filter must be a JSON object"));
    };

    Document::try_from(map)
        .map_err(|e| ConnectorError::query_parse(format!("Filter is not a valid document: {e}")))
}

/// Drops system collections and sorts the rest.
fn visible_collections(mut names: Vec<String>) -> Vec<String> {
    names.retain(|name| !name.starts_with("system."));
    names.sort();
    names
}

/// Field label for a sampled value's runtime kind.
const fn value_kind(value: &Bson) -> &'static str {
    match value {
        Bson::DateTime(_) | Bson::Timestamp(_) => "date",
        Bson::Array(_) => "array",
        Bson::Null | Bson::Undefined => "null",
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => "number",
        Bson::Boolean(_) => "boolean",
        Bson::Document(_) => "object",
        _ => "string",
    }
}

/// Fields of sampled documents, in order of first appearance.
///
/// `_id` always comes first and is always selected.
fn fields_from_documents(documents: &[Document]) -> Vec<FieldDescriptor> {
    let mut fields: Vec<FieldDescriptor> = Vec::new();

    for document in documents {
        for (key, value) in document {
            if fields.iter().any(|f| &f.name == key) {
                continue;
            }
            if key == ID_FIELD {
                fields.insert(0, FieldDescriptor::with_selected(key, value_kind(value), true));
            } else {
                fields.push(FieldDescriptor::new(key, value_kind(value)));
            }
        }
    }

    fields
}

fn document_to_json(document: Document) -> JsonValue {
    JsonValue::Object(
        document
            .into_iter()
            .map(|(key, value)| (key, bson_to_json(value)))
            .collect(),
    )
}

/// ObjectIds become hex strings and dates RFC 3339 strings; other values
/// use relaxed extended JSON.
fn bson_to_json(value: Bson) -> JsonValue {
    match value {
        Bson::ObjectId(oid) => JsonValue::String(oid.to_hex()),
        Bson::DateTime(date) => date.try_to_rfc3339_string().map_or_else(
            |_| JsonValue::from(date.timestamp_millis()),
            JsonValue::String,
        ),
        Bson::Document(document) => document_to_json(document),
        Bson::Array(items) => JsonValue::Array(items.into_iter().map(bson_to_json).collect()),
        Bson::Binary(binary) => binary_to_json(&binary.bytes),
        other => other.into_relaxed_extjson(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::oid::ObjectId;
    use serde_json::json;

    #[test]
    fn test_parse_filter() {
        assert!(parse_filter("").unwrap().is_empty());
        assert_eq!(
            parse_filter(r#"{"status": "active"}"#).unwrap(),
            doc! { "status": "active" }
        );

        let error = parse_filter("{status: active").unwrap_err();
        assert!(matches!(error, ConnectorError::QueryParse { .. }));

        let error = parse_filter("[1, 2]").unwrap_err();
        assert!(error.to_string().contains("JSON object"));
    }

    #[test]
    fn test_fields_from_documents() {
        let documents = vec![
            doc! {
                "name": "Ada",
                "_id": ObjectId::new(),
                "joined": mongodb::bson::DateTime::now(),
                "tags": ["a", "b"],
                "manager": Bson::Null,
                "age": 36,
            },
            doc! { "_id": ObjectId::new(), "nickname": "ada" },
        ];

        let fields = fields_from_documents(&documents);
        let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["_id", "name", "joined", "tags", "manager", "age", "nickname"]);

        assert!(fields[0].selected);
        assert_eq!(fields[0].data_type, "string");
        assert_eq!(fields[2].data_type, "date");
        assert_eq!(fields[3].data_type, "array");
        assert_eq!(fields[4].data_type, "null");
        assert_eq!(fields[5].data_type, "number");
        assert!(fields[1].selected);
        assert!(!fields[6].selected);
    }

    #[test]
    fn test_empty_collection_has_no_fields() {
        assert!(fields_from_documents(&[]).is_empty());
    }

    #[test]
    fn test_document_to_json() {
        let oid = ObjectId::new();
        let document = doc! {
            "_id": oid,
            "count": 3_i64,
            "nested": { "ok": true },
        };

        assert_eq!(
            document_to_json(document),
            json!({"_id": oid.to_hex(), "count": 3, "nested": {"ok": true}})
        );
    }

    #[test]
    fn test_visible_collections() {
        let names = vec![
            "users".to_string(),
            "system.views".to_string(),
            "orders".to_string(),
        ];
        assert_eq!(visible_collections(names), ["orders", "users"]);
    }
}
