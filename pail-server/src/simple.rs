//! Simple repository API: listing, uploads and downloads.

use askama::Template;
use axum::{
    body::Body,
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    Json,
};
use bytes::Bytes;
use pail_catalog::{storage_key, PackageRecord, Upload};
use tracing::{debug, error, info, warn};

use crate::{validate_filename, AppError, AppResult, AppState, SuccessResponse};

/// Upper bound on form fields in one upload request.
pub const MAX_MULTIPART_FIELDS: usize = 100;

const FILE_UPLOAD_ACTION: &str = "file_upload";

#[derive(Template)]
#[template(path = "simple_index.html")]
struct SimpleIndexTemplate<'a> {
    base: &'a str,
    names: Vec<&'a str>,
}

#[derive(Template)]
#[template(path = "simple_package.html")]
struct SimplePackageTemplate<'a> {
    name: &'a str,
    files: Vec<FileLink>,
}

/// One downloadable file as shown in generated pages.
pub(crate) struct FileLink {
    pub file_name: String,
    pub href: String,
    pub checksum: String,
    pub python_tag: String,
}

impl FileLink {
    pub(crate) fn new(base: &str, record: &PackageRecord) -> Self {
        Self {
            file_name: record.file_name.clone(),
            href: format!("{base}/api/{}/{}", record.name, record.file_name),
            checksum: record.checksum.clone(),
            python_tag: record.python_tag.clone(),
        }
    }
}

pub(crate) fn render<T: Template>(template: &T) -> AppResult<Html<String>> {
    template.render().map(Html).map_err(|e| {
        error!(error = %e, "Template render error");
        AppError::InternalError(format!("Template render error: {e}"))
    })
}

/// `GET /simple/`: every canonical package name.
pub async fn simple_index(State(state): State<AppState>) -> AppResult<Html<String>> {
    let catalog = state.catalog.snapshot();
    debug!(packages = catalog.len(), "Rendering simple index");
    render(&SimpleIndexTemplate {
        base: state.config.link_base(),
        names: catalog.names().collect(),
    })
}

/// `GET /simple/{package}/`: every file of one package.
///
/// The name is matched exactly against the canonical names in the catalog.
pub async fn package_index(
    Path(package): Path<String>,
    State(state): State<AppState>,
) -> AppResult<Html<String>> {
    let catalog = state.catalog.snapshot();
    let records = catalog
        .get(&package)
        .ok_or_else(|| AppError::NotFound(format!("Package not found: {package}")))?;

    let base = state.config.link_base();
    let files = records.iter().map(|r| FileLink::new(base, r)).collect();
    debug!(package = %package, files = records.len(), "Rendering package index");
    render(&SimplePackageTemplate {
        name: &package,
        files,
    })
}

/// `GET /api/{package}/{file}`: redirect to a signed URL, or stream the bytes
/// when the backend cannot sign.
pub async fn download(
    Path((package, file_name)): Path<(String, String)>,
    State(state): State<AppState>,
) -> AppResult<Response> {
    validate_filename(&file_name)?;

    let location = state
        .catalog
        .snapshot()
        .find_file(&package, &file_name)
        .map(|record| record.artifact_key().to_string())
        .ok_or_else(|| {
            AppError::NotFound(format!("File not found: {package}/{file_name}"))
        })?;

    let ttl = state.config.downloads.presign_ttl();
    if let Some(url) = state.catalog.presign(&location, ttl, &file_name).await? {
        debug!(location = %location, "Redirecting download to signed URL");
        return Ok(Redirect::temporary(url.as_str()).into_response());
    }

    let bytes = state.catalog.artifact(&location).await?;
    info!(location = %location, size = bytes.len(), "Streaming artifact");
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{file_name}\""),
            ),
        ],
        Body::from(bytes),
    )
        .into_response())
}

/// Fields collected from an upload form.
#[derive(Default)]
struct UploadForm {
    action: Option<String>,
    name: String,
    version: String,
    summary: String,
    md5_digest: String,
    content: Option<(String, Bytes)>,
}

/// `POST /simple/`: the upload protocol spoken by `twine` and `setuptools`.
///
/// The catalog entry is written first and the artifact second; a conflicting
/// upload therefore never replaces an existing artifact.
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<Json<SuccessResponse>> {
    let max_size = state.config.uploads.max_upload_size;
    let mut form = UploadForm::default();
    let mut field_count = 0;

    while let Some(field) = multipart.next_field().await? {
        field_count += 1;
        if field_count > MAX_MULTIPART_FIELDS {
            warn!(field_count = %field_count, "Too many multipart fields");
            return Err(AppError::UploadError(format!(
                "Too many multipart fields: {field_count} (max: {MAX_MULTIPART_FIELDS})"
            )));
        }

        let field_name = field.name().unwrap_or("").to_string();
        match field_name.as_str() {
            "content" => {
                let file_name = field
                    .file_name()
                    .ok_or_else(|| AppError::BadRequest("Missing filename in upload".to_string()))?
                    .to_string();
                validate_filename(&file_name)?;

                let data = field.bytes().await?;
                if data.len() as u64 > max_size {
                    warn!(filename = %file_name, size = data.len(), "Upload exceeds size limit");
                    return Err(AppError::UploadError(format!(
                        "Upload too large: {} bytes (max: {max_size})",
                        data.len()
                    )));
                }
                debug!(filename = %file_name, size = data.len(), "Read package data");
                form.content = Some((file_name, data));
            }
            ":action" => form.action = Some(field.text().await?),
            "name" => form.name = field.text().await?,
            "version" => form.version = field.text().await?,
            "summary" => form.summary = field.text().await?,
            "md5_digest" => form.md5_digest = field.text().await?,
            _ => {
                let skipped = field.bytes().await?;
                debug!(field_name = %field_name, size = skipped.len(), "Ignoring form field");
            }
        }
    }

    match form.action.as_deref() {
        Some(FILE_UPLOAD_ACTION) => {}
        Some(other) => {
            warn!(action = %other, "Unsupported upload action");
            return Err(AppError::BadRequest(format!("Unsupported action: {other}")));
        }
        None => return Err(AppError::BadRequest("Missing :action field".to_string())),
    }

    let (file_name, content) = form
        .content
        .ok_or_else(|| AppError::BadRequest("No content field found".to_string()))?;

    let mut upload = Upload {
        declared_name: form.name,
        declared_version: form.version,
        summary: form.summary,
        checksum: form.md5_digest,
        original_file_name: file_name,
        storage_key: String::new(),
    };
    let canonical = upload.canonical_name();
    if canonical.is_empty() {
        return Err(AppError::BadRequest(
            "Cannot determine package name".to_string(),
        ));
    }
    upload.storage_key = storage_key(&canonical, &upload.original_file_name);

    let record = PackageRecord::from_upload(&upload, state.config.uploads.unparsed_filename)
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let (name, version) = (record.name.clone(), record.version.clone());

    state.catalog.ingest(record, content).await?;

    info!(package = %name, version = %version, filename = %upload.original_file_name, "Package uploaded");
    Ok(Json(SuccessResponse {
        message: format!("Uploaded {} ({name} {version})", upload.original_file_name),
    }))
}
