//! The upload pipeline: decode, validate, store, record, notify.
//!
//! Each step is a single attempt against one collaborator and the first
//! failure ends the request. Nothing is rolled back: a stored object whose
//! metadata write fails stays in storage, and so do the object and record
//! when the success notification cannot be sent.

use crate::{
    models::{
        file_metadata::FileMetadataRecord, notification::NotificationEvent,
        upload::UploadRequest,
    },
    services::{
        metadata_store::{MetadataError, MetadataStore},
        notifier::{EmailMessage, NotificationError, Notifier},
        object_store::{ObjectStore, ObjectStoreError},
    },
};
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use chrono::{SecondsFormat, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Extensions accepted for upload.
pub const ALLOWED_EXTENSIONS: [&str; 3] = [".pdf", ".jpg", ".png"];

/// Content type every object is stored with.
pub const STORED_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Body is not usable at all (e.g. the content is not base64).
    #[error("invalid upload payload: {0}")]
    InvalidPayload(String),
    #[error("unsupported file type `{0}`")]
    InvalidFileType(String),
    #[error("storage write failed: {0}")]
    Storage(#[source] ObjectStoreError),
    #[error("metadata write failed: {0}")]
    Metadata(#[source] MetadataError),
    #[error("notification failed: {0}")]
    Notification(#[source] NotificationError),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Where the pipeline writes and who it tells.
#[derive(Clone, Debug)]
pub struct PipelineSettings {
    pub bucket: String,
    pub metadata_table: String,
    pub notify_from: String,
    pub notify_to: Vec<String>,
}

/// Result of a completed upload.
#[derive(Clone, Debug)]
pub struct UploadOutcome {
    pub key: String,
    pub etag: String,
    pub record: FileMetadataRecord,
}

#[derive(Clone)]
pub struct UploadPipeline {
    objects: Arc<dyn ObjectStore>,
    metadata: Arc<dyn MetadataStore>,
    notifier: Arc<dyn Notifier>,
    settings: PipelineSettings,
}

impl UploadPipeline {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
        notifier: Arc<dyn Notifier>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            objects,
            metadata,
            notifier,
            settings,
        }
    }

    /// Run one upload to a terminal outcome.
    pub async fn process(&self, request: UploadRequest) -> PipelineResult<UploadOutcome> {
        let content = decode_content(&request.file)?;

        let declared = request.declared_extension();
        let extension = match declared {
            Some(ext) => classify_extension(ext),
            None => sniff_extension(&content),
        };
        let Some(extension) = extension else {
            let shown = declared.unwrap_or("<unknown>").to_string();
            warn!("rejecting upload with unsupported file type {}", shown);
            self.notify_rejection().await;
            return Err(PipelineError::InvalidFileType(shown));
        };

        let file_name = generate_file_name();
        let key = format!("{}{}", file_name, extension);
        let file_size = content.len();
        info!("accepted upload {} ({} bytes)", key, file_size);

        let etag = self
            .objects
            .put(&self.settings.bucket, &key, content, STORED_CONTENT_TYPE)
            .await
            .map_err(|err| {
                error!("storage write for {} failed: {}", key, err);
                PipelineError::Storage(err)
            })?;
        info!("stored {} in bucket {}", key, self.settings.bucket);

        let record = FileMetadataRecord {
            file_name,
            file_size: file_size as i64,
            file_extension: extension.to_string(),
            upload_date: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        };
        self.metadata
            .put(&self.settings.metadata_table, &record)
            .await
            .map_err(|err| {
                error!(
                    "metadata write for {} failed, object left in storage: {}",
                    key, err
                );
                PipelineError::Metadata(err)
            })?;
        info!("recorded metadata for {}", record.file_name);

        let event = NotificationEvent::Uploaded {
            file_name: record.file_name.clone(),
            file_size: file_size as u64,
            file_extension: record.file_extension.clone(),
            timestamp: record.upload_date.clone(),
        };
        self.notifier
            .send_email(&self.email_for(&event))
            .await
            .map_err(|err| {
                error!("success notification for {} failed: {}", key, err);
                PipelineError::Notification(err)
            })?;
        info!("upload {} complete", key);

        Ok(UploadOutcome { key, etag, record })
    }

    /// Best effort: the caller gets a 400 whatever happens here.
    async fn notify_rejection(&self) {
        let email = self.email_for(&NotificationEvent::Rejected);
        if let Err(err) = self.notifier.send_email(&email).await {
            warn!("rejection notification failed: {}", err);
        }
    }

    fn email_for(&self, event: &NotificationEvent) -> EmailMessage {
        EmailMessage {
            source: self.settings.notify_from.clone(),
            recipients: self.settings.notify_to.clone(),
            subject: event.subject().to_string(),
            body: event.body(),
        }
    }
}

/// Decode base64 file content, ignoring embedded whitespace and line breaks.
pub fn decode_content(encoded: &str) -> PipelineResult<Bytes> {
    let compact: String = encoded
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    general_purpose::STANDARD
        .decode(compact.as_bytes())
        .map(Bytes::from)
        .map_err(|err| PipelineError::InvalidPayload(format!("file is not valid base64: {err}")))
}

/// Map a declared extension onto the allow-list.
///
/// Case-insensitive, leading dot optional, `.jpeg` counts as `.jpg`.
pub fn classify_extension(declared: &str) -> Option<&'static str> {
    let lowered = declared.trim().to_ascii_lowercase();
    let dotted = if lowered.starts_with('.') {
        lowered
    } else {
        format!(".{lowered}")
    };
    let canonical = if dotted == ".jpeg" { ".jpg" } else { dotted.as_str() };
    ALLOWED_EXTENSIONS
        .iter()
        .copied()
        .find(|allowed| *allowed == canonical)
}

/// Guess the extension from magic bytes when the caller declared nothing.
pub fn sniff_extension(content: &[u8]) -> Option<&'static str> {
    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF];
    const PDF: &[u8] = b"%PDF-";

    if content.starts_with(PNG) {
        Some(".png")
    } else if content.starts_with(JPEG) {
        Some(".jpg")
    } else if content.starts_with(PDF) {
        Some(".pdf")
    } else {
        None
    }
}

/// Time-derived name with a random suffix so concurrent uploads never collide.
pub fn generate_file_name() -> String {
    format!(
        "file_{}_{}",
        Utc::now().timestamp_millis(),
        Uuid::new_v4().simple()
    )
}
