//! Configuration management
//!
//! The exporter reads a single TOML file. Values may reference environment
//! variables with `${VAR_NAME}`, and any `EXPORTER_<SECTION>_<KEY>` variable
//! overrides the matching setting after parsing.
//!
//! # Sections
//!
//! - [`ApplicationConfig`] - log level and deployment name
//! - [`IngestConfig`] - Ingest REST API, retries and schema cache
//! - [`BrokerConfig`] - exchange, prefetch, publish retry and the consumed
//!   queues ([`QueueConfig`])
//! - [`StagingConfig`] - staging bucket and write-protocol timings
//! - [`TransferConfig`] - bulk transfer destination, credentials and polling
//! - [`LoggingConfig`] - console format and rolling file output
//!
//! # Example Configuration
//!
//! ```toml
//! [application]
//! log_level = "info"
//!
//! [ingest]
//! base_url = "https://api.ingest.example.org"
//! api_token = "${INGEST_API_TOKEN}"
//!
//! [broker]
//! url = "amqp://rabbit:5672"
//!
//! [broker.experiment]
//! queue = "ingest.terra.experiments.new"
//! routing_key = "ingest.exporter.experiment.submitted"
//! workers = 8
//!
//! [staging]
//! bucket = "staging-bucket"
//! key_prefix = "prod"
//!
//! [transfer]
//! project_id = "gcp-project"
//! dest_bucket = "staging-bucket"
//! aws_access_key_id = "${AWS_ACCESS_KEY_ID}"
//! aws_access_key_secret = "${AWS_ACCESS_KEY_SECRET}"
//! ```
//!
//! # Loading
//!
//! ```rust,no_run
//! use ingest_exporter::config::load_config;
//!
//! # fn example() {
//! match load_config("ingest-exporter.toml") {
//!     Ok(config) => println!("Exchange: {}", config.broker.exchange),
//!     Err(e) => eprintln!("Configuration error: {}", e),
//! }
//! # }
//! ```

pub mod loader;
pub mod schema;
pub mod secret;

pub use loader::load_config;
pub use schema::{
    ApplicationConfig, BrokerConfig, Environment, ExporterConfig, IngestConfig, LoggingConfig,
    PublishRetryConfig, QueueConfig, RetryConfig, StagingConfig, TransferConfig,
};
pub use secret::{secret_string, SecretString, SecretValue};
