//! Metadata persistence for files.
//!
//! [`FileRepository`] is the contract the lifecycle service relies on;
//! [`SqliteFileRepository`] implements it over the `files` table. Reads only
//! ever see active rows (`deleted_at IS NULL`).

use crate::models::file::FileRecord;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("file name `{0}` is already used by an active file")]
    ConstraintViolation(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[async_trait]
pub trait FileRepository: Send + Sync {
    /// Insert a new active record inside a transaction.
    async fn create(&self, file_name: &str, file_url: &str) -> RepositoryResult<FileRecord>;

    /// All active records, newest first.
    async fn list_active(&self) -> RepositoryResult<Vec<FileRecord>>;

    async fn find_active_by_name(&self, file_name: &str) -> RepositoryResult<Option<FileRecord>>;

    /// Rewrite name and URL of the active record `id`, refreshing
    /// `updated_at`. `None` when no active record has that id.
    async fn update(
        &self,
        id: i64,
        file_name: &str,
        file_url: &str,
    ) -> RepositoryResult<Option<FileRecord>>;

    /// Mark the active record `id` as deleted. `None` when nothing was marked.
    async fn soft_delete(&self, id: i64) -> RepositoryResult<Option<FileRecord>>;
}

const FILE_COLUMNS: &str = "id, fileName, fileUrl, created_at, updated_at, deleted_at";

#[derive(Clone)]
pub struct SqliteFileRepository {
    db: SqlitePool,
}

impl SqliteFileRepository {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl FileRepository for SqliteFileRepository {
    async fn create(&self, file_name: &str, file_url: &str) -> RepositoryResult<FileRecord> {
        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let inserted = sqlx::query_as::<_, FileRecord>(&format!(
            "INSERT INTO files (fileName, fileUrl, created_at, updated_at, deleted_at)
             VALUES (?, ?, ?, ?, NULL)
             RETURNING {FILE_COLUMNS}"
        ))
        .bind(file_name)
        .bind(file_url)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await;

        let record = match inserted {
            Ok(record) => record,
            Err(err) if is_unique_violation(&err) => {
                return Err(RepositoryError::ConstraintViolation(file_name.to_string()));
            }
            Err(err) => return Err(RepositoryError::Sqlx(err)),
        };

        tx.commit().await?;
        Ok(record)
    }

    async fn list_active(&self) -> RepositoryResult<Vec<FileRecord>> {
        let rows = sqlx::query_as::<_, FileRecord>(&format!(
            "SELECT {FILE_COLUMNS} FROM files
             WHERE deleted_at IS NULL
             ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn find_active_by_name(&self, file_name: &str) -> RepositoryResult<Option<FileRecord>> {
        let row = sqlx::query_as::<_, FileRecord>(&format!(
            "SELECT {FILE_COLUMNS} FROM files
             WHERE fileName = ? AND deleted_at IS NULL
             LIMIT 1"
        ))
        .bind(file_name)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn update(
        &self,
        id: i64,
        file_name: &str,
        file_url: &str,
    ) -> RepositoryResult<Option<FileRecord>> {
        let updated = sqlx::query_as::<_, FileRecord>(&format!(
            "UPDATE files SET fileName = ?, fileUrl = ?, updated_at = ?
             WHERE id = ? AND deleted_at IS NULL
             RETURNING {FILE_COLUMNS}"
        ))
        .bind(file_name)
        .bind(file_url)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&self.db)
        .await;

        match updated {
            Ok(row) => Ok(row),
            Err(err) if is_unique_violation(&err) => {
                Err(RepositoryError::ConstraintViolation(file_name.to_string()))
            }
            Err(err) => Err(RepositoryError::Sqlx(err)),
        }
    }

    async fn soft_delete(&self, id: i64) -> RepositoryResult<Option<FileRecord>> {
        let row = sqlx::query_as::<_, FileRecord>(&format!(
            "UPDATE files SET deleted_at = ?
             WHERE id = ? AND deleted_at IS NULL
             RETURNING {FILE_COLUMNS}"
        ))
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }
}

/// Return true if SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}
