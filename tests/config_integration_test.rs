//! Integration tests for configuration loading and validation

use ingest_exporter::config::{load_config, Environment};
use ingest_exporter::domain::ExporterError;
use secrecy::ExposeSecret;
use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;
use tempfile::NamedTempFile;

// Serializes tests that touch environment variables
static ENV_MUTEX: Mutex<()> = Mutex::new(());

const OVERRIDES: &[&str] = &[
    "EXPORTER_APPLICATION_LOG_LEVEL",
    "EXPORTER_INGEST_BASE_URL",
    "EXPORTER_INGEST_API_TOKEN",
    "EXPORTER_BROKER_PREFETCH_COUNT",
    "EXPORTER_STAGING_KEY_PREFIX",
    "EXPORTER_TRANSFER_AWAIT_COMPLETION",
    "TEST_INGEST_TOKEN",
    "TEST_AWS_SECRET",
];

fn cleanup_env_vars() {
    for var in OVERRIDES {
        std::env::remove_var(var);
    }
}

fn write_config(contents: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(contents.as_bytes()).unwrap();
    temp_file.flush().unwrap();
    temp_file
}

const MINIMAL: &str = r#"
[ingest]
base_url = "https://api.ingest.example.org"

[staging]
bucket = "staging-bucket"

[transfer]
project_id = "gcp-project"
dest_bucket = "dest-bucket"
aws_access_key_id = "AKIA123"
aws_access_key_secret = "secret"
"#;

#[test]
fn test_load_complete_config() {
    let _lock = ENV_MUTEX.lock().unwrap();
    cleanup_env_vars();
    let file = write_config(
        r#"
environment = "production"

[application]
log_level = "debug"
environment_name = "prod"

[ingest]
base_url = "https://api.ingest.example.org"
timeout_seconds = 30
schema_cache_ttl_seconds = 120

[ingest.retry]
max_retries = 5

[broker]
url = "amqp://rabbit:5672"
exchange = "ingest.exporter.exchange"
prefetch_count = 1

[broker.publish_retry]
interval_start_secs = 1.0
interval_step_secs = 5.0
interval_max_secs = 20.0
max_retries = 10

[broker.experiment]
queue = "ingest.terra.experiments.new"
routing_key = "ingest.exporter.experiment.submitted"
dead_letter_exchange = "ingest.exporter.exchange"
dead_letter_routing_key = "ingest.terra.experiment.error"
continuation_routing_key = "ingest.exporter.experiment.exported"
workers = 8

[staging]
bucket = "staging-bucket"
key_prefix = "prod"
completion_patch_deadline_secs = 300

[transfer]
project_id = "gcp-project"
dest_bucket = "dest-bucket"
dest_prefix = "prod"
aws_access_key_id = "AKIA123"
aws_access_key_secret = "secret"
await_completion = false
poll_initial_secs = 5

[logging]
local_enabled = false
local_rotation = "hourly"
json_console = true
"#,
    );

    let config = load_config(file.path()).expect("Failed to load config");

    assert_eq!(config.environment, Environment::Production);
    assert_eq!(config.application.environment_name, "prod");
    assert_eq!(config.ingest.retry.max_retries, 5);
    assert_eq!(config.ingest.schema_cache_ttl(), Duration::from_secs(120));
    assert_eq!(config.broker.experiment.workers, 8);
    assert_eq!(config.broker.submission.workers, 4);

    let policy = config.broker.publish_retry.policy();
    assert_eq!(policy.interval(0), Duration::from_secs(1));
    assert_eq!(policy.interval(10), Duration::from_secs(20));
    assert_eq!(policy.max_retries, 10);

    assert_eq!(config.staging.key_prefix, "prod");
    assert!(!config.transfer.await_completion);
    assert_eq!(config.transfer.poll_initial_secs, 5);
    assert!(config.logging.json_console);
}

#[test]
fn test_env_var_substitution() {
    let _lock = ENV_MUTEX.lock().unwrap();
    cleanup_env_vars();
    std::env::set_var("TEST_INGEST_TOKEN", "ingest-token");
    std::env::set_var("TEST_AWS_SECRET", "aws-secret");

    let file = write_config(
        r#"
[ingest]
base_url = "https://api.ingest.example.org"
api_token = "${TEST_INGEST_TOKEN}"

[staging]
bucket = "staging-bucket"

[transfer]
project_id = "gcp-project"
dest_bucket = "dest-bucket"
aws_access_key_id = "AKIA123"
aws_access_key_secret = "${TEST_AWS_SECRET}"
"#,
    );

    let config = load_config(file.path()).expect("Failed to load config");

    assert_eq!(
        config.ingest.api_token.as_ref().unwrap().expose_secret(),
        "ingest-token"
    );
    assert_eq!(config.transfer.aws_access_key_secret.expose_secret(), "aws-secret");
    cleanup_env_vars();
}

#[test]
fn test_env_var_overrides() {
    let _lock = ENV_MUTEX.lock().unwrap();
    cleanup_env_vars();
    std::env::set_var("EXPORTER_APPLICATION_LOG_LEVEL", "trace");
    std::env::set_var("EXPORTER_INGEST_BASE_URL", "https://ingest.override.org");
    std::env::set_var("EXPORTER_INGEST_API_TOKEN", "override-token");
    std::env::set_var("EXPORTER_STAGING_KEY_PREFIX", "staging");
    std::env::set_var("EXPORTER_TRANSFER_AWAIT_COMPLETION", "false");

    let file = write_config(MINIMAL);
    let config = load_config(file.path()).expect("Failed to load config");

    assert_eq!(config.application.log_level, "trace");
    assert_eq!(config.ingest.base_url, "https://ingest.override.org");
    assert_eq!(
        config.ingest.api_token.as_ref().unwrap().expose_secret(),
        "override-token"
    );
    assert_eq!(config.staging.key_prefix, "staging");
    assert!(!config.transfer.await_completion);
    cleanup_env_vars();
}

#[test]
fn test_unparseable_override_is_rejected() {
    let _lock = ENV_MUTEX.lock().unwrap();
    cleanup_env_vars();
    std::env::set_var("EXPORTER_BROKER_PREFETCH_COUNT", "lots");

    let file = write_config(MINIMAL);
    let err = load_config(file.path()).unwrap_err();

    assert!(matches!(err, ExporterError::Configuration(_)));
    assert!(err.to_string().contains("EXPORTER_BROKER_PREFETCH_COUNT"));
    cleanup_env_vars();
}

#[test]
fn test_invalid_config_validation() {
    let _lock = ENV_MUTEX.lock().unwrap();
    cleanup_env_vars();

    let no_staging = "[ingest]\nbase_url = \"https://api.ingest.example.org\"\n".to_string();
    let zero_prefetch = MINIMAL.replace("[staging]", "[broker]\nprefetch_count = 0\n\n[staging]");
    let plain_http_in_production = format!(
        "environment = \"production\"\n{}",
        MINIMAL.replace("https://", "http://")
    );
    let cases = [
        (no_staging, "staging"),
        (zero_prefetch, "prefetch_count"),
        (plain_http_in_production, "https"),
    ];

    for (contents, expected) in &cases {
        let file = write_config(contents);
        let err = load_config(file.path()).unwrap_err();
        assert!(
            err.to_string().contains(expected),
            "expected '{expected}' in '{err}'"
        );
    }
}

#[test]
fn test_example_config_loads() {
    let _lock = ENV_MUTEX.lock().unwrap();
    cleanup_env_vars();
    std::env::set_var("INGEST_API_TOKEN", "token");
    std::env::set_var("AWS_ACCESS_KEY_ID", "AKIA123");
    std::env::set_var("AWS_ACCESS_KEY_SECRET", "secret");

    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/ingest-exporter.example.toml");
    let config = load_config(path).unwrap();

    assert_eq!(config.environment, Environment::Development);
    assert_eq!(config.broker.experiment.workers, 20);
    assert_eq!(
        config.broker.manifest.continuation_routing_key.as_deref(),
        Some("ingest.exporter.manifest.completed")
    );
    assert_eq!(config.transfer.aws_access_key_id, "AKIA123");

    for var in ["INGEST_API_TOKEN", "AWS_ACCESS_KEY_ID", "AWS_ACCESS_KEY_SECRET"] {
        std::env::remove_var(var);
    }
}
