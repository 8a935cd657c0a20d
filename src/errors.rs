use crate::services::upload_pipeline::PipelineError;
use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// An HTTP-facing error: status, caller-visible message, optional cause.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
    pub cause: Option<String>,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
            cause: None,
        }
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Attach the underlying cause, reported as `error` in the body.
    pub fn with_cause(mut self, cause: impl fmt::Display) -> Self {
        self.cause = Some(cause.to_string());
        self
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "{}: {}", self.message, cause),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = match self.cause {
            Some(cause) => json!({ "message": self.message, "error": cause }),
            None => json!({ "message": self.message }),
        };

        (self.status, Json(body)).into_response()
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::InvalidPayload(detail) => {
                AppError::bad_request("Invalid upload payload").with_cause(detail)
            }
            PipelineError::InvalidFileType(_) => AppError::bad_request("Invalid file type uploaded"),
            PipelineError::Storage(cause) => {
                AppError::internal("Error uploading file to storage").with_cause(cause)
            }
            PipelineError::Metadata(cause) => {
                AppError::internal("Error uploading file to metadata store").with_cause(cause)
            }
            PipelineError::Notification(cause) => {
                AppError::internal("Error uploading file to notification").with_cause(cause)
            }
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return AppError::new(StatusCode::PAYLOAD_TOO_LARGE, "Uploaded file is too large")
                .with_cause(rejection.body_text());
        }
        AppError::bad_request("Invalid upload payload").with_cause(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{metadata_store::MetadataError, notifier::NotificationError};

    #[test]
    fn pipeline_errors_map_to_status_and_message() {
        let cases = [
            (
                PipelineError::InvalidFileType(".exe".into()),
                StatusCode::BAD_REQUEST,
                "Invalid file type uploaded",
                false,
            ),
            (
                PipelineError::InvalidPayload("bad base64".into()),
                StatusCode::BAD_REQUEST,
                "Invalid upload payload",
                true,
            ),
            (
                PipelineError::Storage(std::io::Error::other("disk full").into()),
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error uploading file to storage",
                true,
            ),
            (
                PipelineError::Metadata(MetadataError::Sqlx(sqlx::Error::PoolTimedOut)),
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error uploading file to metadata store",
                true,
            ),
            (
                PipelineError::Notification(NotificationError::Send("relay down".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error uploading file to notification",
                true,
            ),
        ];

        for (err, status, message, has_cause) in cases {
            let app: AppError = err.into();
            assert_eq!(app.status, status);
            assert_eq!(app.message, message);
            assert_eq!(app.cause.is_some(), has_cause, "{message}");
        }
    }

    #[test]
    fn display_includes_cause() {
        let err = AppError::internal("Error uploading file to storage").with_cause("disk full");
        assert_eq!(err.to_string(), "Error uploading file to storage: disk full");
    }
}
