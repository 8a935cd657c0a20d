//! Defines the HTTP surface of the upload service.
//!
//! - `POST /upload`  — accept one base64-encoded file
//! - `GET  /healthz` — liveness
//! - `GET  /readyz`  — readiness (database + storage directory)

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        upload_handlers::upload_file,
    },
    services::upload_pipeline::UploadPipeline,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use sqlx::SqlitePool;
use std::{path::PathBuf, sync::Arc};

/// Shared handler state. Built once per process.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<UploadPipeline>,

    /// Metadata database, probed by `/readyz`.
    pub db: Arc<SqlitePool>,

    /// Directory the object store writes beneath, probed by `/readyz`.
    pub storage_root: PathBuf,

    /// Largest accepted `/upload` body, base64 overhead included.
    pub max_body_bytes: usize,
}

/// Build the router with its state attached.
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route(
            "/upload",
            post(upload_file).layer(DefaultBodyLimit::max(state.max_body_bytes)),
        )
        .with_state(state)
}
