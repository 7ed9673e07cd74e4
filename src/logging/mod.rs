//! Logging
//!
//! Every log record is structured. Console output is human-readable by
//! default or JSON when `logging.json_console` is set; the optional rolling
//! file output is always JSON. Message handling runs inside a `message` span
//! carrying the correlation fields, so each record of a unit of work can be
//! traced back to its submission, export job and document.
//!
//! # Example
//!
//! ```no_run
//! use ingest_exporter::config::{ApplicationConfig, LoggingConfig};
//! use ingest_exporter::logging::init_logging;
//!
//! let _guard = init_logging(&ApplicationConfig::default(), &LoggingConfig::default())
//!     .expect("Failed to initialize logging");
//!
//! tracing::info!(queue = "ingest.terra.experiments.new", "Consuming");
//! ```

pub mod structured;

pub use structured::{init_logging, LoggingGuard};
