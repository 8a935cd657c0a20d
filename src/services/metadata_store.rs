//! Metadata store collaborator backed by SQLite.

use crate::models::file_metadata::FileMetadataRecord;
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("table name `{0}` is not a valid identifier")]
    InvalidTableName(String),
    #[error("record `{file_name}` at `{upload_date}` already exists")]
    AlreadyExists {
        file_name: String,
        upload_date: String,
    },
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type MetadataResult<T> = Result<T, MetadataError>;

/// Structured record store keyed by `(file_name, upload_date)`.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Insert `record` into `table`. Existing records are never overwritten.
    async fn put(&self, table: &str, record: &FileMetadataRecord) -> MetadataResult<()>;
}

#[derive(Clone)]
pub struct SqliteMetadataStore {
    /// Shared SQLite connection pool.
    db: Arc<SqlitePool>,
}

impl SqliteMetadataStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Create `table` if it does not exist yet.
    ///
    /// Partition key is `file_name`, sort key is `upload_date`.
    pub async fn ensure_table(&self, table: &str) -> MetadataResult<()> {
        validate_table_name(table)?;
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                file_name      TEXT    NOT NULL,
                upload_date    TEXT    NOT NULL,
                file_size      INTEGER NOT NULL,
                file_extension TEXT    NOT NULL,
                PRIMARY KEY (file_name, upload_date)
            )"
        );
        debug!("ensuring metadata table {}", table);
        sqlx::query(&ddl).execute(&*self.db).await?;
        Ok(())
    }

    /// All records stored under `file_name`, oldest first.
    pub async fn records_for(
        &self,
        table: &str,
        file_name: &str,
    ) -> MetadataResult<Vec<FileMetadataRecord>> {
        validate_table_name(table)?;
        let sql = format!(
            "SELECT file_name, file_size, file_extension, upload_date
             FROM {table} WHERE file_name = ? ORDER BY upload_date ASC"
        );
        let rows = sqlx::query_as::<_, FileMetadataRecord>(&sql)
            .bind(file_name)
            .fetch_all(&*self.db)
            .await?;
        Ok(rows)
    }
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn put(&self, table: &str, record: &FileMetadataRecord) -> MetadataResult<()> {
        validate_table_name(table)?;
        let sql = format!(
            "INSERT INTO {table} (file_name, upload_date, file_size, file_extension)
             VALUES (?, ?, ?, ?)"
        );

        match sqlx::query(&sql)
            .bind(&record.file_name)
            .bind(&record.upload_date)
            .bind(record.file_size)
            .bind(&record.file_extension)
            .execute(&*self.db)
            .await
        {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(MetadataError::AlreadyExists {
                file_name: record.file_name.clone(),
                upload_date: record.upload_date.clone(),
            }),
            Err(err) => Err(MetadataError::Sqlx(err)),
        }
    }
}

/// Table names are spliced into SQL, so only plain identifiers are accepted.
pub fn validate_table_name(name: &str) -> MetadataResult<()> {
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && name.len() <= 64;
    if valid {
        Ok(())
    } else {
        Err(MetadataError::InvalidTableName(name.to_string()))
    }
}

/// Return true if SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}
