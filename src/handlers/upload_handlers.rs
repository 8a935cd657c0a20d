//! `POST /upload`: hand the decoded JSON body to the upload pipeline.

use crate::{errors::AppError, models::upload::UploadRequest, routes::routes::AppState};
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Serialize;
use tracing::debug;

#[derive(Serialize)]
struct UploadResponse {
    message: &'static str,
}

pub async fn upload_file(
    State(state): State<AppState>,
    payload: Result<Json<UploadRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = payload?;
    let outcome = state.pipeline.process(request).await?;
    debug!("upload {} stored with etag {}", outcome.key, outcome.etag);

    Ok((
        StatusCode::OK,
        Json(UploadResponse {
            message: "File uploaded successfully",
        }),
    ))
}
