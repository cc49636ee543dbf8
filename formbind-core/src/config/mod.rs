//! Configuration: the raw caller bag, injected environment defaults,
//! connector limits, and resolution into per-engine configs.

pub mod defaults;
pub mod raw;
pub mod resolver;
pub mod settings;

pub use defaults::{DefaultEndpoint, EnvironmentDefaults};
pub use raw::RawSourceConfig;
pub use resolver::{
    ConfigResolver, ConnectionTarget, Endpoint, ListAuth, ListServiceConfig, MongoConfig,
    ResolvedSource, SpreadsheetConfig, SpreadsheetLocation, SqlConfig, SqliteConfig,
    engine_hint, resolve_table,
};
pub use settings::ConnectorSettings;
