use askama::Template;
use axum::{
    extract::{Path, State},
    response::Html,
};
use pail_catalog::version::sort_descending;
use tracing::debug;

use crate::simple::{render, FileLink};
use crate::{AppError, AppResult, AppState};

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate<'a> {
    base: &'a str,
    version: &'static str,
    packages: Vec<PackageSummary>,
}

struct PackageSummary {
    name: String,
    version: String,
    summary: String,
}

#[derive(Template)]
#[template(path = "package_detail.html")]
struct PackageDetailTemplate<'a> {
    base: &'a str,
    version: &'static str,
    name: &'a str,
    summary: String,
    releases: Vec<Release>,
}

struct Release {
    version: String,
    files: Vec<FileLink>,
}

/// Render the home page: every package with its latest version.
pub async fn home(State(state): State<AppState>) -> AppResult<Html<String>> {
    let catalog = state.catalog.snapshot();
    let packages = catalog
        .names()
        .map(|name| match catalog.latest(name) {
            Some(latest) => PackageSummary {
                name: name.to_string(),
                version: latest.version.clone(),
                summary: latest.summary.clone(),
            },
            None => PackageSummary {
                name: name.to_string(),
                version: "unknown".to_string(),
                summary: String::new(),
            },
        })
        .collect();

    render(&IndexTemplate {
        base: state.config.link_base(),
        version: env!("CARGO_PKG_VERSION"),
        packages,
    })
}

/// Show every release of one package, newest first.
pub async fn package_detail(
    Path(package): Path<String>,
    State(state): State<AppState>,
) -> AppResult<Html<String>> {
    let catalog = state.catalog.snapshot();
    let records = catalog
        .get(&package)
        .ok_or_else(|| AppError::NotFound(format!("Package not found: {package}")))?;

    let base = state.config.link_base();
    let versions: Vec<&str> = records.iter().map(|r| r.version.as_str()).collect();
    let releases: Vec<Release> = sort_descending(&versions)
        .into_iter()
        .map(|version| Release {
            version: version.to_string(),
            files: records
                .iter()
                .filter(|r| r.version == version)
                .map(|r| FileLink::new(base, r))
                .collect(),
        })
        .collect();
    debug!(package = %package, releases = releases.len(), "Rendering package detail");

    let summary = catalog
        .latest(&package)
        .map(|r| r.summary.clone())
        .unwrap_or_default();

    render(&PackageDetailTemplate {
        base,
        version: env!("CARGO_PKG_VERSION"),
        name: &package,
        summary,
        releases,
    })
}
