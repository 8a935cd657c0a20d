//! Descriptive record written once per stored upload.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Metadata row for a successfully stored file.
///
/// Keyed by `file_name` with `upload_date` as the secondary ordering key.
/// Rows are only ever inserted; nothing updates or deletes them.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadataRecord {
    /// Generated name of the stored file (without extension).
    pub file_name: String,

    /// Exact decoded byte length.
    pub file_size: i64,

    /// Validated extension including the leading dot (e.g. ".png").
    pub file_extension: String,

    /// RFC 3339 / ISO-8601 UTC timestamp taken at write time.
    pub upload_date: String,
}
