//! Data carried through one upload.
//!
//! `UploadRequest` is the inbound JSON body, `FileMetadataRecord` maps onto the
//! metadata table via `sqlx::FromRow`, and `NotificationEvent` is the outcome
//! that gets emailed.

pub mod file_metadata;
pub mod notification;
pub mod upload;
