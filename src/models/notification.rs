//! Notification events emitted by the upload pipeline.

/// Something worth telling the operators about. Built, sent once, dropped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NotificationEvent {
    /// A file was stored and its metadata recorded.
    Uploaded {
        file_name: String,
        file_size: u64,
        file_extension: String,
        timestamp: String,
    },
    /// An upload was refused because of its file type.
    Rejected,
}

impl NotificationEvent {
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Uploaded { .. } => "File Upload Notification",
            Self::Rejected => "Invalid File Upload Attempt",
        }
    }

    pub fn body(&self) -> String {
        match self {
            Self::Uploaded {
                file_name,
                file_size,
                file_extension,
                timestamp,
            } => format!(
                "File: {}\nSize: {} bytes\nExtension: {}\nUpload Date: {}",
                file_name, file_size, file_extension, timestamp
            ),
            Self::Rejected => "A file with an unsupported extension was uploaded.".to_string(),
        }
    }
}
