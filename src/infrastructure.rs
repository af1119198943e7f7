//! Infrastructure layer
//!
//! Configuration, logging, HTTP transport and catalog sources.

pub mod catalog_source;
pub mod config;
pub mod http_client;
pub mod logging;

pub use catalog_source::{CatalogSource, SourcedIdentifierMap, convert_csv_file, import_products_csv};
pub use config::{AppConfig, ConfigManager, HttpConfig, LoggingConfig, PipelineConfig, SourceConfig};
pub use http_client::HttpClient;
pub use logging::init_logging_with_config;
