//! Transfer job specs derived from a submission

use crate::adapters::transfer::{TransferJobSpec, TransferSink, TransferSource};
use crate::config::TransferConfig;
use crate::domain::{ExportJobId, ExporterError, Result, Submission, TransferJobName};
use url::Url;

/// Splits an upload area URL into its bucket and area key
///
/// `s3://bucket/area-uuid/any/further/path` yields `("bucket", "area-uuid")`.
///
/// # Errors
///
/// Returns `ExporterError::Parse` if the URL does not parse or has no bucket
/// or area segment.
pub fn upload_area_location(location: &str) -> Result<(String, String)> {
    let url = Url::parse(location)
        .map_err(|e| ExporterError::Parse(format!("upload area '{location}': {e}")))?;
    let bucket = url.host_str().unwrap_or_default();
    let area = url
        .path_segments()
        .and_then(|mut segments| segments.next())
        .unwrap_or_default();

    if bucket.is_empty() || area.is_empty() {
        return Err(ExporterError::Parse(format!(
            "upload area '{location}' is missing a bucket or area key"
        )));
    }
    Ok((bucket.to_string(), area.to_string()))
}

/// Builds the transfer job copying a submission's upload area into the
/// project's data folder
pub fn transfer_job_spec(
    config: &TransferConfig,
    export_job_id: &ExportJobId,
    submission: &Submission,
    project_uuid: &str,
) -> Result<TransferJobSpec> {
    let location = submission.staging_area_location.as_deref().ok_or_else(|| {
        ExporterError::Parse(format!(
            "submission {} has no staging area location",
            submission.uuid
        ))
    })?;
    let (source_bucket, area) = upload_area_location(location)?;

    let dest_path = match config.dest_prefix.trim_matches('/') {
        "" => format!("{project_uuid}/data/"),
        prefix => format!("{prefix}/{project_uuid}/data/"),
    };

    Ok(TransferJobSpec {
        name: TransferJobName::for_export_job(export_job_id),
        description: format!(
            "Transfer job for upload area {area} and export job {export_job_id}"
        ),
        project_id: config.project_id.clone(),
        source: TransferSource {
            bucket: source_bucket,
            path: format!("{area}/"),
            access_key_id: config.aws_access_key_id.clone(),
            access_key_secret: config.aws_access_key_secret.clone(),
        },
        sink: TransferSink {
            bucket: config.dest_bucket.clone(),
            path: dest_path,
        },
        notification_topic: Some(config.notification_topic.clone()),
        overwrite_existing: false,
    })
}
