//! Data-source connection tester and query runner.
//!
//! This binary reads a source descriptor (`{"type": ..., "config": {...}}`)
//! from a file or stdin, runs a connection test or a query through the
//! formbind connector, and prints the JSON result on stdout. Logs go to
//! stderr.
//!
//! # Security Guarantees
//! - Credentials never appear in logs or printed errors
//! - Every connection is closed before the command exits

use clap::{Args, Parser, Subcommand};
use formbind_core::{
    Connector, ConnectorError, Result, SourceType,
    config::{ConnectorSettings, EnvironmentDefaults},
    init_logging,
};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "formbind")]
#[command(about = "Test data-source connections and run queries for form binding")]
#[command(version)]
#[command(long_about = "
formbind - Data-source connector for form builders

Reads a source descriptor and either tests the connection (reporting the
tables and fields available for binding) or runs a query in the source's
native language. Results are printed as JSON.

DESCRIPTOR FORMAT:
  {\"type\": \"relational-sql\", \"config\": {\"dialect\": \"postgres\", \"host\": \"db\", ...}}

EXAMPLES:
  formbind test source.json
  formbind query source.json 'SELECT id, name FROM customers'
  echo '{\"type\":\"embedded-file-db\",\"config\":{\"filePath\":\"forms.db\"}}' | formbind test -
")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(flatten)]
    pub limits: LimitArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Test a data-source connection and report its schema
    Test(TestArgs),
    /// Run a query against a data source
    Query(QueryArgs),
    /// List supported source types
    Types,
}

#[derive(Args)]
pub struct TestArgs {
    /// Source descriptor file
    #[arg(help = "Path to the source descriptor JSON, or - for stdin")]
    pub descriptor: PathBuf,
}

#[derive(Args)]
pub struct QueryArgs {
    /// Source descriptor file
    #[arg(help = "Path to the source descriptor JSON, or - for stdin")]
    pub descriptor: PathBuf,

    /// Query text
    #[arg(
        default_value = "",
        help = "SQL, a JSON filter, a sheet name, or OData options depending on the source"
    )]
    pub query: String,
}

#[derive(Args)]
pub struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv, -vvv)"
    )]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true, help = "Suppress all logs except errors")]
    pub quiet: bool,
}

#[derive(Args)]
pub struct LimitArgs {
    /// Connect timeout in seconds
    #[arg(
        long,
        global = true,
        env = "FORMBIND_CONNECT_TIMEOUT",
        default_value = "5",
        help = "Seconds allowed for establishing a connection"
    )]
    pub connect_timeout: u64,

    /// Query timeout in seconds
    #[arg(
        long,
        global = true,
        env = "FORMBIND_QUERY_TIMEOUT",
        default_value = "30",
        help = "Seconds allowed for introspection or a query"
    )]
    pub query_timeout: u64,

    /// Row cap for non-SQL sources
    #[arg(
        long,
        global = true,
        env = "FORMBIND_ROW_LIMIT",
        default_value = "1000",
        help = "Maximum rows returned from document, spreadsheet, and list sources"
    )]
    pub row_limit: u32,
}

/// What the caller wants to connect to.
#[derive(Debug, Deserialize)]
struct SourceDescriptor {
    #[serde(rename = "type", alias = "sourceType")]
    source_type: String,
    #[serde(default)]
    config: JsonValue,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.global.verbose, cli.global.quiet)?;

    match &cli.command {
        Command::Test(args) => {
            let connector = build_connector(&cli.limits)?;
            let descriptor = read_descriptor(&args.descriptor).await?;
            info!("Testing {} connection...", descriptor.source_type);

            let result = connector
                .test_connection(&descriptor.source_type, &descriptor.config)
                .await;
            print_json(&result)?;
            Ok(exit_code(result.success))
        }
        Command::Query(args) => {
            let connector = build_connector(&cli.limits)?;
            let descriptor = read_descriptor(&args.descriptor).await?;
            info!("Running {} query...", descriptor.source_type);

            let result = connector
                .execute_query(&descriptor.source_type, &descriptor.config, &args.query)
                .await;
            print_json(&result)?;
            Ok(exit_code(result.is_success()))
        }
        Command::Types => {
            list_source_types();
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Builds a connector from the command-line limits and the process environment.
fn build_connector(limits: &LimitArgs) -> Result<Connector> {
    let settings = ConnectorSettings::default()
        .with_connect_timeout(Duration::from_secs(limits.connect_timeout))
        .with_query_timeout(Duration::from_secs(limits.query_timeout))
        .with_row_limit(limits.row_limit);
    settings.validate()?;
    debug!("Connector settings: {:?}", settings);

    Ok(Connector::new(EnvironmentDefaults::from_env(), settings))
}

/// Reads a descriptor from `path`, or from stdin when `path` is `-`.
async fn read_descriptor(path: &Path) -> Result<SourceDescriptor> {
    let text = if path.as_os_str() == "-" {
        let mut buffer = String::new();
        tokio::io::stdin()
            .read_to_string(&mut buffer)
            .await
            .map_err(|e| ConnectorError::io("Failed to read descriptor from stdin", e))?;
        buffer
    } else {
        tokio::fs::read_to_string(path).await.map_err(|e| {
            ConnectorError::io(format!("Failed to read descriptor {}", path.display()), e)
        })?
    };

    parse_descriptor(&text)
}

fn parse_descriptor(text: &str) -> Result<SourceDescriptor> {
    serde_json::from_str(text).map_err(|e| {
        ConnectorError::configuration(format!(
            "Descriptor must be a JSON object with a \"type\" and a \"config\": {e}"
        ))
    })
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

const fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Lists supported source types and the config keys each one reads
fn list_source_types() {
    println!("Supported Source Types:");
    println!();

    for source_type in Connector::supported_source_types() {
        println!("{source_type}:");
        println!("  {}", source_type_help(*source_type));
        println!();
    }

    println!("Environment Defaults:");
    println!("  DB_URL, DB_HOST, DB_PORT, DB_NAME, DB_SCHEMA, DB_USER, DB_PASSWORD");
    println!("  MONGODB_URI, MONGODB_HOST, MONGODB_PORT, MONGODB_NAME, MONGODB_USER, MONGODB_PASSWORD");
    println!("  Applied to sources configured with useDefaultDatabase: true");
}

const fn source_type_help(source_type: SourceType) -> &'static str {
    match source_type {
        SourceType::RelationalSql => {
            "dialect (postgres, mysql, mssql, oracle), host, port, database, username, password, schema, table, or connectionString"
        }
        SourceType::DocumentStore => {
            "connectionString or host, port, database, username, password, authSource; collection"
        }
        SourceType::EmbeddedFileDb => "filePath, table",
        SourceType::SpreadsheetFile => "filePath (local path or http(s) URL), sheetName",
        SourceType::RemoteListService => {
            "siteUrl, listName, and accessToken or username and password"
        }
    }
}
