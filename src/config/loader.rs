//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::ExporterConfig;
use super::secret::secret_string;
use crate::domain::errors::ExporterError;
use crate::domain::result::Result;
use regex::Regex;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

/// Loads configuration from a TOML file
///
/// This function:
/// 1. Reads the TOML file
/// 2. Substitutes `${VAR}` placeholders outside comment lines
/// 3. Parses the TOML into [`ExporterConfig`]
/// 4. Applies `EXPORTER_*` environment overrides
/// 5. Validates the result
///
/// # Errors
///
/// Returns `ExporterError::Configuration` if the file is missing or
/// unreadable, a referenced variable is unset, parsing fails or validation
/// rejects a value.
///
/// # Examples
///
/// ```no_run
/// use ingest_exporter::config::load_config;
///
/// let config = load_config("ingest-exporter.toml").expect("Failed to load config");
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<ExporterConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(ExporterError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        ExporterError::Configuration(format!(
            "Failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;

    let contents = substitute_env_vars(&contents)?;

    let mut config: ExporterConfig = toml::from_str(&contents)
        .map_err(|e| ExporterError::Configuration(format!("Failed to parse TOML: {e}")))?;

    apply_env_overrides(&mut config)?;

    config.validate().map_err(|e| {
        ExporterError::Configuration(format!("Configuration validation failed: {e}"))
    })?;

    Ok(config)
}

fn placeholder() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap_or_else(|e| unreachable!("{e}"))
    })
}

/// Substitutes environment variables in the format `${VAR_NAME}`
///
/// # Errors
///
/// Returns an error naming every referenced variable that is not set
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = placeholder();
    let mut lines = Vec::new();
    let mut missing_vars: Vec<String> = Vec::new();

    for line in input.lines() {
        if line.trim_start().starts_with('#') {
            lines.push(line.to_string());
            continue;
        }

        let replaced = re.replace_all(line, |cap: &regex::Captures<'_>| {
            let var_name = &cap[1];
            std::env::var(var_name).unwrap_or_else(|_| {
                if !missing_vars.iter().any(|v| v == var_name) {
                    missing_vars.push(var_name.to_string());
                }
                String::new()
            })
        });
        lines.push(replaced.into_owned());
    }

    if !missing_vars.is_empty() {
        return Err(ExporterError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(lines.join("\n"))
}

fn env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match env(key) {
        Some(val) => val
            .parse()
            .map(Some)
            .map_err(|_| ExporterError::Configuration(format!("Invalid value for {key}: '{val}'"))),
        None => Ok(None),
    }
}

/// Applies environment variable overrides using the `EXPORTER_*` prefix
///
/// Variables follow the pattern `EXPORTER_<SECTION>_<KEY>`, for example
/// `EXPORTER_INGEST_BASE_URL` or `EXPORTER_TRANSFER_AWS_ACCESS_KEY_SECRET`.
fn apply_env_overrides(config: &mut ExporterConfig) -> Result<()> {
    if let Some(val) = env("EXPORTER_APPLICATION_LOG_LEVEL") {
        config.application.log_level = val;
    }
    if let Some(val) = env("EXPORTER_APPLICATION_ENVIRONMENT_NAME") {
        config.application.environment_name = val;
    }

    if let Some(val) = env("EXPORTER_INGEST_BASE_URL") {
        config.ingest.base_url = val;
    }
    if let Some(val) = env("EXPORTER_INGEST_API_TOKEN") {
        config.ingest.api_token = Some(secret_string(val));
    }
    if let Some(val) = env_parsed("EXPORTER_INGEST_TIMEOUT_SECONDS")? {
        config.ingest.timeout_seconds = val;
    }

    if let Some(val) = env("EXPORTER_BROKER_URL") {
        config.broker.url = val;
    }
    if let Some(val) = env("EXPORTER_BROKER_EXCHANGE") {
        config.broker.exchange = val;
    }
    if let Some(val) = env_parsed("EXPORTER_BROKER_PREFETCH_COUNT")? {
        config.broker.prefetch_count = val;
    }

    if let Some(val) = env("EXPORTER_STAGING_BUCKET") {
        config.staging.bucket = val;
    }
    if let Some(val) = env("EXPORTER_STAGING_KEY_PREFIX") {
        config.staging.key_prefix = val;
    }

    if let Some(val) = env("EXPORTER_TRANSFER_PROJECT_ID") {
        config.transfer.project_id = val;
    }
    if let Some(val) = env("EXPORTER_TRANSFER_DEST_BUCKET") {
        config.transfer.dest_bucket = val;
    }
    if let Some(val) = env("EXPORTER_TRANSFER_DEST_PREFIX") {
        config.transfer.dest_prefix = val;
    }
    if let Some(val) = env("EXPORTER_TRANSFER_AWS_ACCESS_KEY_ID") {
        config.transfer.aws_access_key_id = val;
    }
    if let Some(val) = env("EXPORTER_TRANSFER_AWS_ACCESS_KEY_SECRET") {
        config.transfer.aws_access_key_secret = secret_string(val);
    }
    if let Some(val) = env_parsed("EXPORTER_TRANSFER_AWAIT_COMPLETION")? {
        config.transfer.await_completion = val;
    }

    if let Some(val) = env_parsed("EXPORTER_LOGGING_LOCAL_ENABLED")? {
        config.logging.local_enabled = val;
    }
    if let Some(val) = env("EXPORTER_LOGGING_LOCAL_PATH") {
        config.logging.local_path = val;
    }
    if let Some(val) = env_parsed("EXPORTER_LOGGING_JSON_CONSOLE")? {
        config.logging.json_console = val;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const CONFIG: &str = r#"
[application]
log_level = "debug"

[ingest]
base_url = "https://api.ingest.example.org"
# api_token = "${NOT_A_REAL_VARIABLE}"

[staging]
bucket = "staging-bucket"

[transfer]
project_id = "gcp-project"
dest_bucket = "dest-bucket"
aws_access_key_id = "AKIA123"
aws_access_key_secret = "${LOADER_TEST_AWS_SECRET}"
"#;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(contents.as_bytes()).unwrap();
        temp_file.flush().unwrap();
        temp_file
    }

    #[test]
    fn test_substitute_env_vars() {
        std::env::set_var("LOADER_TEST_VAR", "test_value");
        let result = substitute_env_vars("password = \"${LOADER_TEST_VAR}\"").unwrap();
        assert_eq!(result, "password = \"test_value\"");
        std::env::remove_var("LOADER_TEST_VAR");
    }

    #[test]
    fn test_substitute_env_vars_missing() {
        std::env::remove_var("LOADER_MISSING_VAR");
        let err = substitute_env_vars("password = \"${LOADER_MISSING_VAR}\"").unwrap_err();
        assert!(err.to_string().contains("LOADER_MISSING_VAR"));
    }

    #[test]
    fn test_comments_are_not_substituted() {
        let input = "# token = \"${LOADER_COMMENTED_VAR}\"";
        assert_eq!(substitute_env_vars(input).unwrap(), input);
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config("nonexistent.toml").unwrap_err();
        assert!(matches!(err, ExporterError::Configuration(_)));
    }

    #[test]
    fn test_load_config_valid() {
        std::env::set_var("LOADER_TEST_AWS_SECRET", "aws-secret");
        let file = write_config(CONFIG);

        let config = load_config(file.path()).unwrap();

        assert_eq!(config.application.log_level, "debug");
        assert_eq!(config.ingest.base_url, "https://api.ingest.example.org");
        assert_eq!(config.transfer.aws_access_key_secret.expose_secret(), "aws-secret");
        assert!(config.ingest.api_token.is_none());
        std::env::remove_var("LOADER_TEST_AWS_SECRET");
    }

    #[test]
    fn test_load_config_rejects_invalid_values() {
        let file = write_config(
            r#"
[application]
log_level = "chatty"

[ingest]
base_url = "https://api.ingest.example.org"

[staging]
bucket = "staging-bucket"

[transfer]
project_id = "gcp-project"
dest_bucket = "dest-bucket"
aws_access_key_id = "AKIA123"
aws_access_key_secret = "secret"
"#,
        );

        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("log_level"));
    }
}
