//! MongoDB connector tests against a real server in a container.
//!
//! These need a Docker daemon and are ignored by default:
//! `cargo test -p formbind-core --test mongodb_container -- --ignored`

#![cfg(feature = "mongodb")]
#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

use formbind_core::Connector;
use mongodb::Client;
use mongodb::bson::{Document, doc};
use serde_json::json;
use testcontainers_modules::{mongo::Mongo, testcontainers::runners::AsyncRunner};

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_mongodb_connection_and_query() {
    let container = Mongo::default()
        .start()
        .await
        .expect("Failed to start MongoDB container");
    let port = container
        .get_host_port_ipv4(27017)
        .await
        .expect("Failed to get port");

    let uri = format!("mongodb://127.0.0.1:{port}");
    let client = Client::with_uri_str(&uri).await.expect("Failed to connect for seeding");
    client
        .database("forms")
        .collection::<Document>("contacts")
        .insert_many([
            doc! { "name": "Ada", "email": "ada@example.com", "age": 36 },
            doc! { "name": "Linus", "email": "linus@example.com", "age": 54 },
        ])
        .await
        .expect("Failed to seed");
    client.shutdown().await;

    let connector = Connector::default();
    let config = json!({ "connectionString": uri, "database": "forms" });

    let result = connector.test_connection("document-store", &config).await;
    assert!(result.success, "unexpected failure: {:?}", result.error);
    assert_eq!(result.tables, Some(vec!["contacts".to_string()]));
    let names: Vec<String> = result.fields.unwrap()["contacts"]
        .iter()
        .map(|f| f.name.clone())
        .collect();
    assert_eq!(names, ["_id", "name", "email", "age"]);

    let result = connector
        .execute_query("document-store", &config, r#"{"age": {"$gt": 40}}"#)
        .await;
    assert!(result.is_success(), "unexpected error: {:?}", result.error);
    assert_eq!(result.rows.len(), 1);
    assert_eq!(result.rows[0]["name"], "Linus");
    assert!(result.rows[0]["_id"].is_string());
    assert!(result.fields.is_none());
}
