//! `validate-config`: load, validate and summarise the configuration

use crate::cli::EXIT_CONFIG;
use crate::config::{load_config, ExporterConfig, QueueConfig};
use clap::Args;

#[derive(Args, Debug)]
pub struct ValidateArgs {}

impl ValidateArgs {
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Validating configuration");

        println!("Validating configuration file: {config_path}");
        println!();

        // load_config validates before returning
        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("Configuration is invalid");
                println!("   Error: {e}");
                return Ok(EXIT_CONFIG);
            }
        };

        println!("Configuration is valid");
        println!();
        print!("{}", summary(&config));
        Ok(0)
    }
}

fn queue_line(name: &str, queue: &QueueConfig) -> String {
    let continuation = queue
        .continuation_routing_key
        .as_deref()
        .map(|key| format!(" -> {key}"))
        .unwrap_or_default();
    format!(
        "    {name}: {} ({}, {} workers){continuation}\n",
        queue.queue, queue.routing_key, queue.workers
    )
}

/// Human-readable overview; secrets are never printed
fn summary(config: &ExporterConfig) -> String {
    let mut out = String::from("Configuration Summary:\n");
    out.push_str(&format!("  Environment: {}\n", config.application.environment_name));
    out.push_str(&format!("  Log Level: {}\n", config.application.log_level));
    out.push_str(&format!("  Ingest API: {}\n", config.ingest.base_url));
    out.push_str(&format!(
        "  Broker: {} (exchange {}, prefetch {})\n",
        config.broker.url, config.broker.exchange, config.broker.prefetch_count
    ));
    out.push_str(&queue_line("experiment", &config.broker.experiment));
    out.push_str(&queue_line("submission", &config.broker.submission));
    out.push_str(&queue_line("spreadsheet", &config.broker.spreadsheet));
    out.push_str(&queue_line("manifest", &config.broker.manifest));
    out.push_str(&format!(
        "  Staging: s3://{}/{}\n",
        config.staging.bucket, config.staging.key_prefix
    ));
    out.push_str(&format!(
        "  Transfer: project {} -> gs://{}/{} (await completion: {})\n",
        config.transfer.project_id,
        config.transfer.dest_bucket,
        config.transfer.dest_prefix,
        config.transfer.await_completion
    ));
    out
}
