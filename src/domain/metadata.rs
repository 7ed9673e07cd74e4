//! Metadata documents as fetched from the metadata store
//!
//! A [`MetadataNode`] is an immutable, parsed view of one ingest document
//! (project, process, biomaterial, file or protocol).

use crate::domain::errors::ExporterError;
use crate::domain::result::Result;
use chrono::NaiveDateTime;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

const INGEST_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.fZ";
const INGEST_DATE_FORMAT_SHORT: &str = "%Y-%m-%dT%H:%M:%SZ";
const DCP_VERSION_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// First schema version of each concrete type that carries the
/// `schema_major_version`/`schema_minor_version` provenance fields.
const FIRST_VERSION_WITH_SCHEMA_FIELDS: &[(&str, (u32, u32, u32))] = &[
    ("aggregate_generation_protocol", (2, 1, 0)),
    ("analysis_file", (6, 2, 0)),
    ("analysis_process", (11, 1, 0)),
    ("analysis_protocol", (9, 1, 0)),
    ("cell_line", (14, 4, 0)),
    ("cell_suspension", (13, 2, 0)),
    ("collection_protocol", (9, 2, 0)),
    ("differentiation_protocol", (2, 2, 0)),
    ("dissociation_protocol", (6, 2, 0)),
    ("donor_organism", (15, 4, 0)),
    ("enrichment_protocol", (3, 1, 0)),
    ("image_file", (2, 2, 0)),
    ("imaged_specimen", (3, 2, 0)),
    ("imaging_preparation_protocol", (2, 2, 0)),
    ("imaging_protocol", (11, 2, 0)),
    ("ipsc_induction_protocol", (3, 2, 0)),
    ("library_preparation_protocol", (6, 2, 0)),
    ("organoid", (11, 2, 0)),
    ("process", (9, 2, 0)),
    ("project", (14, 1, 0)),
    ("protocol", (7, 1, 0)),
    ("reference_file", (3, 2, 0)),
    ("sequence_file", (9, 2, 0)),
    ("sequencing_protocol", (10, 1, 0)),
    ("specimen_from_organism", (10, 3, 0)),
    ("supplementary_file", (2, 2, 0)),
];

/// High-level entity kind, from the document's `type` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Project,
    Process,
    Biomaterial,
    File,
    Protocol,
}

impl EntityKind {
    /// Parses the `type` field, case-insensitively
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "project" => Some(EntityKind::Project),
            "process" => Some(EntityKind::Process),
            "biomaterial" => Some(EntityKind::Biomaterial),
            "file" => Some(EntityKind::File),
            "protocol" => Some(EntityKind::Protocol),
            _ => None,
        }
    }

    /// REST collection name of the kind
    pub fn collection(&self) -> &'static str {
        match self {
            EntityKind::Project => "projects",
            EntityKind::Process => "processes",
            EntityKind::Biomaterial => "biomaterials",
            EntityKind::File => "files",
            EntityKind::Protocol => "protocols",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Project => "project",
            EntityKind::Process => "process",
            EntityKind::Biomaterial => "biomaterial",
            EntityKind::File => "file",
            EntityKind::Protocol => "protocol",
        };
        f.write_str(name)
    }
}

/// Named relation between two metadata documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    DerivedByProcesses,
    InputToProcesses,
    DerivedBiomaterials,
    InputBiomaterials,
    DerivedFiles,
    InputFiles,
    Protocols,
    Projects,
    SupplementaryFiles,
}

impl Relation {
    /// Link name used by the metadata store
    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::DerivedByProcesses => "derivedByProcesses",
            Relation::InputToProcesses => "inputToProcesses",
            Relation::DerivedBiomaterials => "derivedBiomaterials",
            Relation::InputBiomaterials => "inputBiomaterials",
            Relation::DerivedFiles => "derivedFiles",
            Relation::InputFiles => "inputFiles",
            Relation::Protocols => "protocols",
            Relation::Projects => "projects",
            Relation::SupplementaryFiles => "supplementaryFiles",
        }
    }

    /// Kind of the documents the relation points at
    pub fn target(&self) -> EntityKind {
        match self {
            Relation::DerivedByProcesses | Relation::InputToProcesses => EntityKind::Process,
            Relation::DerivedBiomaterials | Relation::InputBiomaterials => EntityKind::Biomaterial,
            Relation::DerivedFiles | Relation::InputFiles | Relation::SupplementaryFiles => {
                EntityKind::File
            }
            Relation::Protocols => EntityKind::Protocol,
            Relation::Projects => EntityKind::Project,
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Submission and schema provenance of a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub document_id: String,
    pub submission_date: String,
    pub update_date: String,
    #[serde(rename = "schema_major_version", skip_serializing_if = "Option::is_none")]
    pub schema_major: Option<u32>,
    #[serde(rename = "schema_minor_version", skip_serializing_if = "Option::is_none")]
    pub schema_minor: Option<u32>,
}

/// Checksums recorded for an uploaded data file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChecksums {
    pub sha256: Option<String>,
    pub crc32c: Option<String>,
    pub sha1: Option<String>,
    pub s3_etag: Option<String>,
}

/// Data-file attributes present only on `file` documents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFileAttributes {
    pub data_file_uuid: String,
    pub file_name: String,
    pub cloud_url: Option<String>,
    pub content_type: String,
    pub size: u64,
    pub checksums: FileChecksums,
}

/// A parsed metadata document
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataNode {
    pub uuid: String,
    pub kind: EntityKind,
    pub content: Value,
    pub dcp_version: String,
    pub provenance: Provenance,
    pub data_file: Option<DataFileAttributes>,
    /// Relation name to href, from the document's `_links`
    pub links: BTreeMap<String, String>,
}

impl MetadataNode {
    /// Parses an ingest API document
    ///
    /// # Errors
    ///
    /// Returns `ExporterError::Parse` if a required field is missing or malformed
    pub fn from_ingest_json(data: &Value) -> Result<Self> {
        let uuid = str_at(data, &["uuid", "uuid"])?.to_string();
        let type_field = str_at(data, &["type"])?;
        let kind = EntityKind::parse(type_field)
            .ok_or_else(|| parse_err(format!("unknown metadata type '{type_field}'")))?;
        let content = data
            .get("content")
            .filter(|c| c.is_object())
            .cloned()
            .ok_or_else(|| parse_err(format!("document {uuid} has no content")))?;
        let dcp_version = to_dcp_version(str_at(data, &["dcpVersion"])?)?;
        let described_by = str_at(data, &["content", "describedBy"])?;
        let provenance = Provenance {
            document_id: uuid.clone(),
            submission_date: str_at(data, &["submissionDate"])?.to_string(),
            update_date: str_at(data, &["updateDate"])?.to_string(),
            schema_major: None,
            schema_minor: None,
        };
        let provenance = with_schema_version(provenance, described_by)?;

        let data_file = if kind == EntityKind::File {
            Some(parse_data_file(data)?)
        } else {
            None
        };

        let links = data
            .get("_links")
            .and_then(Value::as_object)
            .map(|links| {
                links
                    .iter()
                    .filter_map(|(name, link)| {
                        link.get("href")
                            .and_then(Value::as_str)
                            .map(|href| (name.clone(), href.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            uuid,
            kind,
            content,
            dcp_version,
            provenance,
            data_file,
            links,
        })
    }

    /// Concrete schema type, the last path segment of `content.describedBy`
    pub fn concrete_type(&self) -> &str {
        self.content
            .get("describedBy")
            .and_then(Value::as_str)
            .and_then(|url| url.rsplit('/').next())
            .unwrap_or_default()
    }

    /// Content with the provenance block embedded, as written to the staging area
    pub fn content_with_provenance(&self) -> Value {
        let mut content = match &self.content {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        content.insert("provenance".to_string(), json!(self.provenance));
        Value::Object(content)
    }
}

/// Submission envelope fields the exporter relies on
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub uuid: String,
    pub submit_actions: Vec<String>,
    /// Upload area URL, e.g. `s3://bucket/area-uuid/`
    pub staging_area_location: Option<String>,
}

impl Submission {
    pub fn from_ingest_json(data: &Value) -> Result<Self> {
        let uuid = str_at(data, &["uuid", "uuid"])?.to_string();
        let submit_actions = data
            .get("submitActions")
            .and_then(Value::as_array)
            .map(|actions| {
                actions
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let staging_area_location = data
            .pointer("/stagingDetails/stagingAreaLocation/value")
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(Self {
            uuid,
            submit_actions,
            staging_area_location,
        })
    }

    pub fn has_submit_action(&self, action: &str) -> bool {
        self.submit_actions.iter().any(|a| a == action)
    }
}

/// Normalises an ingest timestamp to the staging-area version format
pub fn to_dcp_version(date: &str) -> Result<String> {
    let parsed = NaiveDateTime::parse_from_str(date, INGEST_DATE_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(date, INGEST_DATE_FORMAT_SHORT))
        .map_err(|_| parse_err(format!("unknown date format for [{date}]")))?;
    Ok(parsed.format(DCP_VERSION_FORMAT).to_string())
}

fn with_schema_version(mut provenance: Provenance, described_by: &str) -> Result<Provenance> {
    static SEMVER: OnceLock<Option<Regex>> = OnceLock::new();
    let semver = SEMVER
        .get_or_init(|| Regex::new(r"(\d+)\.(\d+)\.(\d+)").ok())
        .as_ref()
        .ok_or_else(|| ExporterError::Other("semver pattern failed to compile".to_string()))?;

    let caps = semver
        .captures(described_by)
        .ok_or_else(|| parse_err(format!("no schema version in describedBy '{described_by}'")))?;
    let part = |i: usize| -> Result<u32> {
        caps.get(i)
            .and_then(|m| m.as_str().parse().ok())
            .ok_or_else(|| parse_err(format!("bad schema version in '{described_by}'")))
    };
    let version = (part(1)?, part(2)?, part(3)?);

    let concrete_type = described_by.rsplit('/').next().unwrap_or_default();
    let has_fields = FIRST_VERSION_WITH_SCHEMA_FIELDS
        .iter()
        .find(|(name, _)| *name == concrete_type)
        .map_or(true, |(_, first)| version >= *first);

    if has_fields {
        provenance.schema_major = Some(version.0);
        provenance.schema_minor = Some(version.1);
    }
    Ok(provenance)
}

fn parse_data_file(data: &Value) -> Result<DataFileAttributes> {
    let checksums = data.get("checksums").cloned().unwrap_or(Value::Null);
    let checksum = |name: &str| {
        checksums
            .get(name)
            .and_then(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
    };
    Ok(DataFileAttributes {
        data_file_uuid: str_at(data, &["dataFileUuid"])?.to_string(),
        file_name: str_at(data, &["fileName"])?.to_string(),
        cloud_url: data
            .get("cloudUrl")
            .and_then(Value::as_str)
            .map(str::to_string),
        content_type: str_at(data, &["fileContentType"])?.to_string(),
        size: data
            .get("size")
            .and_then(Value::as_u64)
            .ok_or_else(|| parse_err("file document has no size"))?,
        checksums: FileChecksums {
            sha256: checksum("sha256"),
            crc32c: checksum("crc32c"),
            sha1: checksum("sha1"),
            s3_etag: checksum("s3_etag"),
        },
    })
}

fn str_at<'a>(data: &'a Value, path: &[&str]) -> Result<&'a str> {
    path.iter()
        .try_fold(data, |node, key| node.get(key))
        .and_then(Value::as_str)
        .ok_or_else(|| parse_err(format!("missing field '{}'", path.join("."))))
}

fn parse_err(msg: impl Into<String>) -> ExporterError {
    ExporterError::Parse(msg.into())
}
