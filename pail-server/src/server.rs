//! HTTP server setup: routing, health and status endpoints, and the serve
//! loop.

use anyhow::{Context, Result};
use axum::{
    extract::{DefaultBodyLimit, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::{backend, config::Config, simple, state::AppState, ui, xmlrpc};

/// Room for the non-file form fields of an upload.
const FORM_OVERHEAD: usize = 1024 * 1024;

/// Largest XML-RPC request body accepted.
pub const XMLRPC_BODY_LIMIT: usize = 64 * 1024;

/// Build the application router for `state`.
pub fn build_router(state: AppState) -> Router {
    let upload_limit = usize::try_from(state.config.uploads.max_upload_size)
        .unwrap_or(usize::MAX)
        .saturating_add(FORM_OVERHEAD);

    let uploads = Router::new()
        .route("/simple", post(simple::upload))
        .route("/simple/", get(simple::simple_index).post(simple::upload))
        .layer(DefaultBodyLimit::max(upload_limit));

    let xmlrpc = Router::new()
        .route("/pypi", post(xmlrpc::handle))
        .route("/RPC2", post(xmlrpc::handle))
        .layer(DefaultBodyLimit::max(XMLRPC_BODY_LIMIT));

    Router::new()
        .route("/", get(ui::home))
        .route("/package/{package}", get(ui::package_detail))
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/simple/{package}", get(simple::package_index))
        .route("/simple/{package}/", get(simple::package_index))
        .route("/api/{package}/{file}", get(simple::download))
        .merge(uploads)
        .merge(xmlrpc)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({"status": "healthy"}))
}

async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let catalog = state.catalog.snapshot();
    Json(json!({
        "status": "ok",
        "service": "pail",
        "version": env!("CARGO_PKG_VERSION"),
        "backend": state.catalog.blob_store().describe(),
        "catalog_key": state.catalog.options().key,
        "packages": catalog.len(),
        "files": catalog.record_count(),
    }))
}

/// Load the catalog and serve until interrupted.
///
/// An absent catalog document starts an empty index; any other load failure
/// aborts startup.
pub async fn run_server(config: Config) -> Result<()> {
    let catalog = backend::open_catalog(&config)
        .await
        .context("Failed to open storage")?;
    let loaded = catalog
        .load()
        .await
        .context("Failed to read the package catalog from storage")?;
    info!(
        packages = loaded.len(),
        files = loaded.record_count(),
        backend = %catalog.blob_store().describe(),
        "Catalog loaded"
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let base_url = config.base_url();
    let app = build_router(AppState::new(catalog, config));

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;
    info!(addr = %addr, url = %base_url, "Package index listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Cannot listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            info!("Received shutdown signal, stopping gracefully");
        })
        .await
        .context("Server error")?;

    Ok(())
}
