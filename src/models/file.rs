//! Represents a stored file's metadata row and the views derived from it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Date layout used by list and detail views (`dd/mm/yyyy`).
const VIEW_DATE_FORMAT: &str = "%d/%m/%Y";

/// A file's metadata as persisted in the `files` table.
///
/// The payload itself lives in the storage gateway; this row only records
/// where it is (`file_url`) and the lifecycle timestamps.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
pub struct FileRecord {
    /// Store-assigned identity.
    pub id: i64,

    /// Name of the file, unique among active records.
    #[serde(rename = "fileName")]
    #[sqlx(rename = "fileName")]
    pub file_name: String,

    /// Locator returned by the storage gateway.
    #[serde(rename = "fileUrl")]
    #[sqlx(rename = "fileUrl")]
    pub file_url: String,

    /// When the record was created.
    pub created_at: DateTime<Utc>,

    /// When the record was last updated.
    pub updated_at: DateTime<Utc>,

    /// Soft-delete marker; `None` means the record is active.
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Presentation projection of a [`FileRecord`] with day-precision dates.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FileView {
    pub id: i64,
    #[serde(rename = "fileName")]
    pub file_name: String,
    #[serde(rename = "fileUrl")]
    pub file_url: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&FileRecord> for FileView {
    fn from(record: &FileRecord) -> Self {
        Self {
            id: record.id,
            file_name: record.file_name.clone(),
            file_url: record.file_url.clone(),
            created_at: record.created_at.format(VIEW_DATE_FORMAT).to_string(),
            updated_at: record.updated_at.format(VIEW_DATE_FORMAT).to_string(),
        }
    }
}

/// Pagination envelope attached to list responses.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Pagination {
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    #[serde(rename = "totalPages")]
    pub total_pages: u64,
}

/// A page of active files, newest first.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ListPage {
    pub files: Vec<FileView>,
    pub pagination: Pagination,
}

/// Response body of a successful upload.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct UploadResponse {
    pub url: String,
}
