//! Configuration schema types

use crate::config::SecretString;
use crate::core::backoff::ExponentialBackoff;
use crate::gateway::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Runtime environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

/// Root configuration, mapped from the TOML file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExporterConfig {
    #[serde(default)]
    pub application: ApplicationConfig,

    #[serde(default)]
    pub environment: Environment,

    /// Ingest REST API (metadata store)
    pub ingest: IngestConfig,

    /// Message broker bindings
    #[serde(default)]
    pub broker: BrokerConfig,

    /// Staging bucket layout and write protocol timings
    pub staging: StagingConfig,

    /// Bulk data-file transfer
    pub transfer: TransferConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ExporterConfig {
    /// Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid
    pub fn validate(&self) -> Result<(), String> {
        self.application.validate()?;
        self.ingest.validate(&self.environment)?;
        self.broker.validate()?;
        self.staging.validate()?;
        self.transfer.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Deployment name attached to log records
    #[serde(default = "default_environment_name")]
    pub environment_name: String,
}

impl ApplicationConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            ));
        }
        Ok(())
    }
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            environment_name: default_environment_name(),
        }
    }
}

/// HTTP retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

/// Ingest REST API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Base URL, e.g. `https://api.ingest.example.org`
    pub base_url: String,

    /// Bearer token for write operations
    #[serde(default)]
    pub api_token: Option<SecretString>,

    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Page size requested when listing related documents
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    #[serde(default)]
    pub retry: RetryConfig,

    /// How long latest-schema lookups are cached
    #[serde(default = "default_schema_cache_ttl_seconds")]
    pub schema_cache_ttl_seconds: u64,
}

impl IngestConfig {
    fn validate(&self, environment: &Environment) -> Result<(), String> {
        if self.base_url.is_empty() {
            return Err("ingest.base_url cannot be empty".to_string());
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err("ingest.base_url must start with http:// or https://".to_string());
        }
        if *environment == Environment::Production && self.base_url.starts_with("http://") {
            return Err("ingest.base_url must use https in production".to_string());
        }
        if self.page_size == 0 || self.page_size > 1000 {
            return Err("ingest.page_size must be between 1 and 1000".to_string());
        }
        if self.retry.max_retries == 0 {
            return Err("ingest.retry.max_retries must be > 0".to_string());
        }
        Ok(())
    }

    pub fn schema_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.schema_cache_ttl_seconds)
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            api_token: None,
            timeout_seconds: default_timeout_seconds(),
            page_size: default_page_size(),
            retry: RetryConfig::default(),
            schema_cache_ttl_seconds: default_schema_cache_ttl_seconds(),
        }
    }
}

/// Publish retry policy, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishRetryConfig {
    #[serde(default)]
    pub interval_start_secs: f64,

    #[serde(default = "default_interval_step_secs")]
    pub interval_step_secs: f64,

    #[serde(default = "default_interval_max_secs")]
    pub interval_max_secs: f64,

    #[serde(default = "default_publish_max_retries")]
    pub max_retries: u32,
}

impl PublishRetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            interval_start: Duration::from_secs_f64(self.interval_start_secs),
            interval_step: Duration::from_secs_f64(self.interval_step_secs),
            interval_max: Duration::from_secs_f64(self.interval_max_secs),
            max_retries: self.max_retries,
        }
    }
}

impl Default for PublishRetryConfig {
    fn default() -> Self {
        Self {
            interval_start_secs: 0.0,
            interval_step_secs: default_interval_step_secs(),
            interval_max_secs: default_interval_max_secs(),
            max_retries: default_publish_max_retries(),
        }
    }
}

/// One consumed queue and its continuation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub queue: String,

    /// Routing key the queue is bound with
    pub routing_key: String,

    #[serde(default)]
    pub dead_letter_exchange: Option<String>,

    #[serde(default)]
    pub dead_letter_routing_key: Option<String>,

    /// Routing key published after a message is handled
    #[serde(default)]
    pub continuation_routing_key: Option<String>,

    /// Messages of this queue handled in parallel
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl QueueConfig {
    fn named(queue: &str, routing_key: &str, dead_letter_key: &str) -> Self {
        Self {
            queue: queue.to_string(),
            routing_key: routing_key.to_string(),
            dead_letter_exchange: Some(default_exchange()),
            dead_letter_routing_key: Some(dead_letter_key.to_string()),
            continuation_routing_key: None,
            workers: default_workers(),
        }
    }

    fn with_continuation(mut self, routing_key: &str) -> Self {
        self.continuation_routing_key = Some(routing_key.to_string());
        self
    }

    fn validate(&self, section: &str) -> Result<(), String> {
        if self.queue.is_empty() {
            return Err(format!("broker.{section}.queue cannot be empty"));
        }
        if self.routing_key.is_empty() {
            return Err(format!("broker.{section}.routing_key cannot be empty"));
        }
        if self.workers == 0 {
            return Err(format!("broker.{section}.workers must be > 0"));
        }
        if self.dead_letter_routing_key.is_some() && self.dead_letter_exchange.is_none() {
            return Err(format!(
                "broker.{section}.dead_letter_routing_key requires dead_letter_exchange"
            ));
        }
        Ok(())
    }
}

/// Message broker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_broker_url")]
    pub url: String,

    /// Topic exchange every queue binds to
    #[serde(default = "default_exchange")]
    pub exchange: String,

    /// Unacknowledged deliveries per consumer
    #[serde(default = "default_prefetch")]
    pub prefetch_count: u16,

    #[serde(default)]
    pub publish_retry: PublishRetryConfig,

    #[serde(default = "default_experiment_queue")]
    pub experiment: QueueConfig,

    #[serde(default = "default_submission_queue")]
    pub submission: QueueConfig,

    #[serde(default = "default_spreadsheet_queue")]
    pub spreadsheet: QueueConfig,

    #[serde(default = "default_manifest_queue")]
    pub manifest: QueueConfig,
}

impl BrokerConfig {
    fn validate(&self) -> Result<(), String> {
        if self.exchange.is_empty() {
            return Err("broker.exchange cannot be empty".to_string());
        }
        if self.prefetch_count == 0 {
            return Err("broker.prefetch_count must be > 0".to_string());
        }
        if self.publish_retry.interval_step_secs < 0.0
            || self.publish_retry.interval_start_secs < 0.0
            || self.publish_retry.interval_max_secs < 0.0
        {
            return Err("broker.publish_retry intervals cannot be negative".to_string());
        }
        self.experiment.validate("experiment")?;
        self.submission.validate("submission")?;
        self.spreadsheet.validate("spreadsheet")?;
        self.manifest.validate("manifest")?;
        Ok(())
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: default_broker_url(),
            exchange: default_exchange(),
            prefetch_count: default_prefetch(),
            publish_retry: PublishRetryConfig::default(),
            experiment: default_experiment_queue(),
            submission: default_submission_queue(),
            spreadsheet: default_spreadsheet_queue(),
            manifest: default_manifest_queue(),
        }
    }
}

/// Staging bucket configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagingConfig {
    pub bucket: String,

    /// Prefix every staged key is written under
    #[serde(default)]
    pub key_prefix: String,

    /// Deadline for retrying the completion-flag patch
    #[serde(default = "default_completion_patch_deadline_secs")]
    pub completion_patch_deadline_secs: u64,

    /// First delay between completion-flag polls on conflict
    #[serde(default = "default_verify_initial_delay_ms")]
    pub verify_initial_delay_ms: u64,

    /// Total time to wait for a concurrent writer to finish
    #[serde(default = "default_verify_deadline_secs")]
    pub verify_deadline_secs: u64,
}

impl StagingConfig {
    fn validate(&self) -> Result<(), String> {
        if self.bucket.is_empty() {
            return Err("staging.bucket cannot be empty".to_string());
        }
        if self.verify_initial_delay_ms == 0 {
            return Err("staging.verify_initial_delay_ms must be > 0".to_string());
        }
        Ok(())
    }

    pub fn patch_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(
            Duration::from_secs(1),
            Some(Duration::from_secs(60)),
            Duration::from_secs(self.completion_patch_deadline_secs),
        )
    }

    pub fn verify_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(
            Duration::from_millis(self.verify_initial_delay_ms),
            None,
            Duration::from_secs(self.verify_deadline_secs),
        )
    }
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            bucket: "staging".to_string(),
            key_prefix: String::new(),
            completion_patch_deadline_secs: default_completion_patch_deadline_secs(),
            verify_initial_delay_ms: default_verify_initial_delay_ms(),
            verify_deadline_secs: default_verify_deadline_secs(),
        }
    }
}

/// Bulk transfer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Project owning the transfer jobs
    pub project_id: String,

    pub dest_bucket: String,

    /// Destination prefix; data lands at `{dest_prefix}/{project}/data/`
    #[serde(default)]
    pub dest_prefix: String,

    pub aws_access_key_id: String,

    pub aws_access_key_secret: SecretString,

    /// Topic the transfer service publishes completion events to
    #[serde(default = "default_notification_topic")]
    pub notification_topic: String,

    /// Wait for the transfer to finish inside the submission handler
    #[serde(default = "default_true")]
    pub await_completion: bool,

    #[serde(default = "default_poll_initial_secs")]
    pub poll_initial_secs: u64,

    #[serde(default = "default_poll_max_interval_secs")]
    pub poll_max_interval_secs: u64,

    #[serde(default = "default_wait_deadline_secs")]
    pub wait_deadline_secs: u64,
}

impl TransferConfig {
    fn validate(&self) -> Result<(), String> {
        use secrecy::ExposeSecret;

        if self.project_id.is_empty() {
            return Err("transfer.project_id cannot be empty".to_string());
        }
        if self.dest_bucket.is_empty() {
            return Err("transfer.dest_bucket cannot be empty".to_string());
        }
        if self.aws_access_key_id.is_empty() || self.aws_access_key_secret.expose_secret().is_empty()
        {
            return Err("transfer AWS credentials cannot be empty".to_string());
        }
        if self.poll_initial_secs == 0 {
            return Err("transfer.poll_initial_secs must be > 0".to_string());
        }
        if self.poll_max_interval_secs < self.poll_initial_secs {
            return Err(
                "transfer.poll_max_interval_secs must be >= transfer.poll_initial_secs".to_string(),
            );
        }
        Ok(())
    }

    pub fn poll_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(
            Duration::from_secs(self.poll_initial_secs),
            Some(Duration::from_secs(self.poll_max_interval_secs)),
            Duration::from_secs(self.wait_deadline_secs),
        )
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Enable local JSON file logging
    #[serde(default)]
    pub local_enabled: bool,

    #[serde(default = "default_local_path")]
    pub local_path: String,

    /// Log rotation strategy (daily, hourly)
    #[serde(default = "default_local_rotation")]
    pub local_rotation: String,

    /// Emit console logs as JSON instead of the human-readable format
    #[serde(default)]
    pub json_console: bool,
}

impl LoggingConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_rotations = ["daily", "hourly"];
        if !valid_rotations.contains(&self.local_rotation.as_str()) {
            return Err(format!(
                "Invalid logging.local_rotation '{}'. Must be one of: {}",
                self.local_rotation,
                valid_rotations.join(", ")
            ));
        }
        if self.local_enabled && self.local_path.is_empty() {
            return Err("logging.local_path cannot be empty when local logging is enabled".to_string());
        }
        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            local_enabled: false,
            local_path: default_local_path(),
            local_rotation: default_local_rotation(),
            json_console: false,
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_environment_name() -> String {
    "dev".to_string()
}

fn default_true() -> bool {
    true
}

fn default_timeout_seconds() -> u64 {
    60
}

fn default_max_retries() -> usize {
    3
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_page_size() -> u32 {
    100
}

fn default_schema_cache_ttl_seconds() -> u64 {
    300
}

fn default_interval_step_secs() -> f64 {
    2.0
}

fn default_interval_max_secs() -> f64 {
    30.0
}

fn default_publish_max_retries() -> u32 {
    60
}

fn default_workers() -> usize {
    4
}

fn default_broker_url() -> String {
    "amqp://localhost:5672".to_string()
}

fn default_exchange() -> String {
    "ingest.exporter.exchange".to_string()
}

fn default_prefetch() -> u16 {
    1
}

fn default_experiment_queue() -> QueueConfig {
    QueueConfig::named(
        "ingest.terra.experiments.new",
        "ingest.exporter.experiment.submitted",
        "ingest.terra.experiment.error",
    )
    .with_continuation("ingest.exporter.experiment.exported")
}

fn default_submission_queue() -> QueueConfig {
    QueueConfig::named(
        "ingest.terra.submissions.new",
        "ingest.exporter.submission.submitted",
        "ingest.terra.submission.error",
    )
}

fn default_spreadsheet_queue() -> QueueConfig {
    QueueConfig::named(
        "ingest.terra.spreadsheets.new",
        "ingest.exporter.spreadsheet.requested",
        "ingest.terra.spreadsheet.error",
    )
}

fn default_manifest_queue() -> QueueConfig {
    QueueConfig::named(
        "ingest.manifests.assays.new",
        "ingest.exporter.manifest.submitted",
        "ingest.manifest.assay.error",
    )
    .with_continuation("ingest.exporter.manifest.completed")
}

fn default_completion_patch_deadline_secs() -> u64 {
    600
}

fn default_verify_initial_delay_ms() -> u64 {
    100
}

fn default_verify_deadline_secs() -> u64 {
    3600
}

fn default_notification_topic() -> String {
    "transfer-notifications".to_string()
}

fn default_poll_initial_secs() -> u64 {
    2
}

fn default_poll_max_interval_secs() -> u64 {
    600
}

fn default_wait_deadline_secs() -> u64 {
    6 * 3600
}

fn default_local_path() -> String {
    "/var/log/ingest-exporter".to_string()
}

fn default_local_rotation() -> String {
    "daily".to_string()
}
