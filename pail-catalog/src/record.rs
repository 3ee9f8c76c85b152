//! Package records and their construction from uploads.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ParseError;
use crate::filename::parse_filename;
use crate::normalize::normalize;

/// One known artifact version.
///
/// Field names on the wire are part of the persisted catalog format and are
/// read by other tooling: `name, filename, version, pyver, url, md5_digest,
/// summary`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRecord {
    /// Canonical package name.
    pub name: String,
    /// Uploaded filename, unmodified.
    #[serde(rename = "filename")]
    pub file_name: String,
    pub version: String,
    /// Interpreter tag from the filename; empty when absent.
    #[serde(rename = "pyver", default)]
    pub python_tag: String,
    /// Storage key of the artifact blob.
    #[serde(rename = "url")]
    pub location: String,
    /// Upload-time digest, passed through untouched.
    #[serde(rename = "md5_digest", default)]
    pub checksum: String,
    #[serde(default)]
    pub summary: String,
}

/// What to do when an upload's filename yields no metadata.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnparsedFilenamePolicy {
    /// Refuse the upload.
    #[default]
    Reject,
    /// Build a bare record from the declared name and version.
    AcceptDeclared,
}

/// Fields extracted by the ingestion boundary from an upload request.
#[derive(Debug, Clone, Default)]
pub struct Upload {
    pub declared_name: String,
    pub declared_version: String,
    pub summary: String,
    pub checksum: String,
    pub original_file_name: String,
    pub storage_key: String,
}

impl Upload {
    /// Canonical name the artifact is stored under.
    ///
    /// Uses the declared name, or the filename up to its first `.` when the
    /// form did not declare one.
    pub fn canonical_name(&self) -> String {
        let declared = normalize(self.declared_name.trim());
        if !declared.is_empty() {
            return declared;
        }
        let stem = self
            .original_file_name
            .split('.')
            .next()
            .unwrap_or_default();
        normalize(stem)
    }
}

/// Storage key for an artifact: `<canonical name>/<file name>`.
pub fn storage_key(canonical_name: &str, file_name: &str) -> String {
    format!("{canonical_name}/{file_name}")
}

/// Prefix older catalog documents put in front of artifact keys.
const LEGACY_LOCATION_PREFIX: &str = "/api/";

impl PackageRecord {
    /// Blob key of the artifact.
    ///
    /// Older documents store `url` as the download path `/api/<name>/<file>`;
    /// that prefix and any leading `/` are stripped.
    pub fn artifact_key(&self) -> &str {
        self.location
            .strip_prefix(LEGACY_LOCATION_PREFIX)
            .unwrap_or(&self.location)
            .trim_start_matches('/')
    }

    /// Build the catalog record for an upload.
    ///
    /// The filename supplies name and interpreter tag. A non-empty declared
    /// version always wins over the parsed one. When the filename does not
    /// parse, `policy` decides between failing and a bare declared record.
    pub fn from_upload(
        upload: &Upload,
        policy: UnparsedFilenamePolicy,
    ) -> Result<PackageRecord, ParseError> {
        let declared_version = upload.declared_version.trim();

        let parsed = match parse_filename(&upload.original_file_name) {
            Ok(parsed) => parsed,
            Err(e) => {
                let declared_name = normalize(upload.declared_name.trim());
                if policy == UnparsedFilenamePolicy::AcceptDeclared
                    && !declared_name.is_empty()
                    && !declared_version.is_empty()
                {
                    warn!(
                        filename = %upload.original_file_name,
                        error = %e,
                        "Filename did not parse, recording declared name and version only"
                    );
                    return Ok(PackageRecord {
                        name: declared_name,
                        file_name: upload.original_file_name.clone(),
                        version: declared_version.to_string(),
                        python_tag: String::new(),
                        location: upload.storage_key.clone(),
                        checksum: upload.checksum.clone(),
                        summary: upload.summary.clone(),
                    });
                }
                return Err(e);
            }
        };

        let declared_name = normalize(upload.declared_name.trim());
        if !declared_name.is_empty() && declared_name != parsed.name {
            warn!(
                declared = %declared_name,
                parsed = %parsed.name,
                "Declared package name differs from filename, using filename"
            );
        }

        let mut version = parsed.version;
        if !declared_version.is_empty() && declared_version != version {
            info!("Uploaded filename and form declare different versions, using form value");
            debug!(form_version = %declared_version, file_version = %version);
            version = declared_version.to_string();
        }

        Ok(PackageRecord {
            name: parsed.name,
            file_name: upload.original_file_name.clone(),
            version,
            python_tag: parsed.python_tag,
            location: upload.storage_key.clone(),
            checksum: upload.checksum.clone(),
            summary: upload.summary.clone(),
        })
    }
}
