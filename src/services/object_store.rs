//! Object storage collaborator.
//!
//! The pipeline only needs a single durable `put`. `LocalObjectStore` keeps
//! payloads on disk sharded beneath
//! `base_path/{bucket}/{shard}/{shard}/{key}` and records the declared content
//! type next to each payload in a `{key}.meta.json` sidecar.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::{
    io,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("bucket `{name}` invalid: {reason}")]
    InvalidBucketName { name: String, reason: String },
    #[error("invalid object key `{0}`")]
    InvalidObjectKey(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Sidecar(#[from] serde_json::Error),
}

pub type ObjectStoreResult<T> = Result<T, ObjectStoreError>;

/// Durable key-addressed blob store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write `body` under `bucket/key`. Returns the payload's etag.
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> ObjectStoreResult<String>;
}

/// Attributes kept beside each payload.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ObjectAttributes {
    pub content_type: String,
    pub size_bytes: u64,
    pub etag: String,
    pub stored_at: String,
}

const MAX_OBJECT_KEY_LEN: usize = 1024;
const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;
const SIDECAR_SUFFIX: &str = ".meta.json";

/// Filesystem-backed object store.
#[derive(Clone, Debug)]
pub struct LocalObjectStore {
    /// Base directory on disk where object payloads are stored.
    base_path: PathBuf,
}

impl LocalObjectStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Create the bucket directory if it is not there yet.
    pub async fn ensure_bucket(&self, bucket: &str) -> ObjectStoreResult<PathBuf> {
        validate_bucket_name(bucket)?;
        let root = self.bucket_root(bucket);
        fs::create_dir_all(&root).await?;
        Ok(root)
    }

    fn bucket_root(&self, bucket: &str) -> PathBuf {
        self.base_path.join(bucket)
    }

    /// Two-level shard directories from MD5(bucket/key).
    fn object_shards(bucket: &str, key: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", bucket, key));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    /// Full payload path for `bucket/key`. Parent directories may not exist yet.
    pub fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(bucket, key);
        let mut path = self.bucket_root(bucket);
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    /// Path of the attributes sidecar for `bucket/key`.
    pub fn attributes_path(&self, bucket: &str, key: &str) -> PathBuf {
        let mut path = self.object_path(bucket, key).into_os_string();
        path.push(SIDECAR_SUFFIX);
        PathBuf::from(path)
    }

    /// Read back the attributes recorded for `bucket/key`.
    pub async fn attributes(&self, bucket: &str, key: &str) -> ObjectStoreResult<ObjectAttributes> {
        validate_bucket_name(bucket)?;
        ensure_key_safe(key)?;
        let raw = fs::read(self.attributes_path(bucket, key)).await?;
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Write `data` to a temp file beside `target`, fsync it, then rename it into place.
    async fn write_atomic(target: &Path, data: &[u8]) -> io::Result<()> {
        let parent = target
            .parent()
            .ok_or_else(|| io::Error::other("object path missing parent directory"))?;
        fs::create_dir_all(parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));

        let result = async {
            let mut file = File::create(&tmp_path).await?;
            file.write_all(data).await?;
            file.flush().await?;
            file.sync_all().await?;
            fs::rename(&tmp_path, target).await
        }
        .await;

        if result.is_err() {
            let _ = fs::remove_file(&tmp_path).await;
        }
        result
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> ObjectStoreResult<String> {
        validate_bucket_name(bucket)?;
        ensure_key_safe(key)?;

        let file_path = self.object_path(bucket, key);
        Self::write_atomic(&file_path, &body).await?;

        let attributes = ObjectAttributes {
            content_type: content_type.to_string(),
            size_bytes: body.len() as u64,
            etag: format!("{:x}", md5::compute(&body)),
            stored_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        };
        let sidecar = serde_json::to_vec(&attributes)?;
        if let Err(err) = Self::write_atomic(&self.attributes_path(bucket, key), &sidecar).await {
            // a payload without its attributes is not a complete write
            let _ = fs::remove_file(&file_path).await;
            return Err(ObjectStoreError::Io(err));
        }

        debug!(
            "stored {} bytes at {} (etag {})",
            attributes.size_bytes,
            file_path.display(),
            attributes.etag
        );
        Ok(attributes.etag)
    }
}

/// Basic key validation to avoid trivial path traversal vectors.
///
/// Rejects empty or oversized keys, keys that begin with `/` or contain `..`,
/// and keys with control characters or backslashes.
fn ensure_key_safe(key: &str) -> ObjectStoreResult<()> {
    let invalid = key.is_empty()
        || key.len() > MAX_OBJECT_KEY_LEN
        || key.starts_with('/')
        || key.contains("..")
        || key.ends_with(SIDECAR_SUFFIX)
        || key
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0');
    if invalid {
        return Err(ObjectStoreError::InvalidObjectKey(key.to_string()));
    }
    Ok(())
}

/// Validate bucket name format.
///
/// S3-like naming rules:
/// - 3–63 characters
/// - lowercase letters, digits, dots, hyphens only
/// - cannot start/end with dot or hyphen
/// - cannot contain consecutive dots or dot-hyphen patterns
/// - cannot look like an IPv4 address
pub fn validate_bucket_name(name: &str) -> ObjectStoreResult<()> {
    let invalid = |reason: &str| ObjectStoreError::InvalidBucketName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    let len = name.len();
    if !(BUCKET_NAME_MIN_LEN..=BUCKET_NAME_MAX_LEN).contains(&len) {
        return Err(invalid("must be between 3 and 63 characters"));
    }

    if !name
        .chars()
        .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'))
    {
        return Err(invalid(
            "allowed characters are lowercase letters, digits, dots, and hyphens",
        ));
    }

    if name.starts_with(['.', '-']) || name.ends_with(['.', '-']) {
        return Err(invalid("must start and end with a lowercase letter or digit"));
    }

    if name.contains("..") || name.contains("-.") || name.contains(".-") {
        return Err(invalid(
            "cannot contain consecutive dots or dot-hyphen combinations",
        ));
    }

    if is_ipv4_like(name) {
        return Err(invalid("must not be formatted like an IP address"));
    }

    Ok(())
}

/// Check if a string matches IPv4-like dotted decimal form.
fn is_ipv4_like(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() == 4
        && parts.iter().all(|segment| {
            !segment.is_empty()
                && segment.len() <= 3
                && segment.chars().all(|c| c.is_ascii_digit())
                && segment.parse::<u8>().is_ok()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_writes_payload_and_attributes() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        let body = Bytes::from_static(b"hello object store");

        let etag = store
            .put("file-uploads", "file_1_a.pdf", body.clone(), "application/octet-stream")
            .await
            .unwrap();

        let path = store.object_path("file-uploads", "file_1_a.pdf");
        assert!(path.starts_with(dir.path().join("file-uploads")));
        assert_eq!(fs::read(&path).await.unwrap(), body.to_vec());

        let attrs = store.attributes("file-uploads", "file_1_a.pdf").await.unwrap();
        assert_eq!(attrs.content_type, "application/octet-stream");
        assert_eq!(attrs.size_bytes, body.len() as u64);
        assert_eq!(attrs.etag, etag);
        assert_eq!(etag, format!("{:x}", md5::compute(b"hello object store")));
    }

    #[tokio::test]
    async fn put_leaves_no_temp_files_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        store
            .put("file-uploads", "k.png", Bytes::from_static(b"x"), "application/octet-stream")
            .await
            .unwrap();

        let parent = store.object_path("file-uploads", "k.png");
        let mut entries = fs::read_dir(parent.parent().unwrap()).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            let name = entry.file_name().to_string_lossy().to_string();
            assert!(!name.starts_with(".tmp-"), "leftover temp file {name}");
        }
    }

    #[tokio::test]
    async fn put_rejects_unsafe_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());

        for key in ["", "/abs.pdf", "../escape.pdf", "a\\b.pdf", "x.pdf.meta.json"] {
            let err = store
                .put("file-uploads", key, Bytes::new(), "application/octet-stream")
                .await
                .unwrap_err();
            assert!(matches!(err, ObjectStoreError::InvalidObjectKey(_)), "{key}");
        }
    }

    #[test]
    fn bucket_name_rules() {
        assert!(validate_bucket_name("file-uploads").is_ok());
        assert!(validate_bucket_name("my.bucket-1").is_ok());

        for bad in ["ab", "Uploads", "-lead", "trail.", "a..b", "a-.b", "192.168.1.1"] {
            assert!(
                matches!(
                    validate_bucket_name(bad),
                    Err(ObjectStoreError::InvalidBucketName { .. })
                ),
                "{bad}"
            );
        }
    }

    #[tokio::test]
    async fn ensure_bucket_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        let root = store.ensure_bucket("file-uploads").await.unwrap();
        assert!(root.is_dir());
    }
}
