//! `status <export-job-id>`: report an export job as the Ingest API sees it

use crate::adapters::metadata::{IngestApiClient, MetadataStore};
use crate::cli::{EXIT_CONFIG, EXIT_CONNECTION};
use crate::config::load_config;
use crate::domain::{ExportJobId, Result};
use clap::Args;
use std::fmt::Write;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Export job to report on
    pub export_job_id: String,
}

impl StatusArgs {
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        let id = match ExportJobId::new(self.export_job_id.clone()) {
            Ok(id) => id,
            Err(e) => {
                println!("Invalid export job id: {e}");
                return Ok(EXIT_CONFIG);
            }
        };

        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("Failed to load configuration file");
                println!("   Error: {e}");
                return Ok(EXIT_CONFIG);
            }
        };
        let client = IngestApiClient::new(&config.ingest)?;

        match report(&client, &id).await {
            Ok(Some(text)) => {
                print!("{text}");
                Ok(0)
            }
            Ok(None) => {
                println!("Export job {id} not found at {}", client.base_url());
                Ok(1)
            }
            Err(e) => {
                tracing::error!(export_job_id = %id, error = %e, "Status lookup failed");
                println!("Failed to read export job {id}");
                println!("   Error: {e}");
                Ok(EXIT_CONNECTION)
            }
        }
    }
}

/// Job state, progress and sub-states; `None` if the job does not exist
pub async fn report(store: &dyn MetadataStore, id: &ExportJobId) -> Result<Option<String>> {
    let Some(job) = store.get_export_job(id).await? else {
        return Ok(None);
    };
    let completed = store.count_completed_entities(id).await?;

    let submission = if job.is_submission_deleted() {
        "(deleted)"
    } else {
        job.submission_id.as_str()
    };
    let mut out = String::new();
    // Writing to a String cannot fail
    let _ = writeln!(out, "Export job {}", job.job_id);
    let _ = writeln!(out, "  Submission:          {submission}");
    let _ = writeln!(out, "  State:               {}", job.state);
    let _ = writeln!(
        out,
        "  Assays exported:     {completed}/{}",
        job.expected_entity_count
    );
    let _ = writeln!(out, "  Data file transfer:  {}", job.data_file_transfer);
    let _ = writeln!(out, "  Spreadsheet:         {}", job.spreadsheet_generation);
    if let Some(updated) = job.updated_date {
        let _ = writeln!(out, "  Updated:             {}", updated.format("%Y-%m-%d %H:%M:%S"));
    }
    Ok(Some(out))
}
