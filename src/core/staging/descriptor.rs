//! File descriptors staged next to each data file's metadata

use crate::domain::{ExporterError, MetadataNode, Result};
use serde::Serialize;
use serde_json::Value;

pub const FILE_DESCRIPTOR_SCHEMA_TYPE: &str = "file_descriptor";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDescriptor {
    pub file_id: String,
    pub file_version: String,
    pub file_name: String,
    pub content_type: String,
    pub size: u64,
    pub sha1: Option<String>,
    pub sha256: Option<String>,
    pub crc32c: Option<String>,
    pub s3_etag: Option<String>,
    pub schema_type: &'static str,
}

impl FileDescriptor {
    /// Builds the descriptor of a `file` node
    ///
    /// Hex checksums are lower-cased; the etag is kept as recorded.
    ///
    /// # Errors
    ///
    /// Returns `ExporterError::Parse` if the node carries no data-file attributes
    pub fn from_node(node: &MetadataNode) -> Result<Self> {
        let data_file = node.data_file.as_ref().ok_or_else(|| {
            ExporterError::Parse(format!("{} is not a data file", node.uuid))
        })?;
        let lower = |checksum: &Option<String>| checksum.as_deref().map(str::to_lowercase);

        Ok(Self {
            file_id: data_file.data_file_uuid.clone(),
            file_version: node.dcp_version.clone(),
            file_name: data_file.file_name.clone(),
            content_type: data_file.content_type.clone(),
            size: data_file.size,
            sha1: lower(&data_file.checksums.sha1),
            sha256: lower(&data_file.checksums.sha256),
            crc32c: lower(&data_file.checksums.crc32c),
            s3_etag: data_file.checksums.s3_etag.clone(),
            schema_type: FILE_DESCRIPTOR_SCHEMA_TYPE,
        })
    }

    pub fn to_json(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(ExporterError::from)
    }
}
