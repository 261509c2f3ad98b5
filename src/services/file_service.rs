//! The public file lifecycle: upload, list, lookup by name,
//! replace, and soft-delete.
//!
//! Existence and uniqueness of names are enforced here against active
//! records; the storage-touching work is delegated to
//! [`UploadOrchestrator`].

use crate::{
    models::{
        file::{FileRecord, FileView, ListPage, Pagination, UploadResponse},
        upload::{IncomingFile, UploadRequest},
    },
    services::{
        error::{FileError, FileResult},
        file_repository::FileRepository,
        storage_gateway::StorageGateway,
        upload_orchestrator::UploadOrchestrator,
    },
};
use std::sync::Arc;
use tracing::debug;

/// Page number reported by [`FileService::list`]; listing is not paged yet.
pub const LIST_PAGE: u64 = 1;
/// Page size reported by [`FileService::list`].
pub const LIST_LIMIT: u64 = 10;

#[derive(Clone)]
pub struct FileService {
    repository: Arc<dyn FileRepository>,
    orchestrator: UploadOrchestrator,
}

impl FileService {
    pub fn new(repository: Arc<dyn FileRepository>, storage: Arc<dyn StorageGateway>) -> Self {
        Self {
            orchestrator: UploadOrchestrator::new(repository.clone(), storage),
            repository,
        }
    }

    /// Store a new file under a name no active file uses.
    ///
    /// The name check is a read before the write; the store's unique index
    /// catches the uploads that race past it.
    pub async fn upload(&self, request: UploadRequest) -> FileResult<UploadResponse> {
        if self
            .repository
            .find_active_by_name(&request.name)
            .await?
            .is_some()
        {
            return Err(FileError::AlreadyExists { name: request.name });
        }

        let record = self.orchestrator.create(&request).await?;
        Ok(UploadResponse {
            url: record.file_url,
        })
    }

    /// Every active file, newest first, in a fixed single-page envelope.
    pub async fn list(&self) -> FileResult<ListPage> {
        let records = self.repository.list_active().await?;
        let total = records.len() as u64;
        debug!("listing {} active files", total);

        Ok(ListPage {
            files: records.iter().map(FileView::from).collect(),
            pagination: Pagination {
                total,
                page: LIST_PAGE,
                limit: LIST_LIMIT,
                total_pages: total.div_ceil(LIST_LIMIT),
            },
        })
    }

    pub async fn get_by_name(&self, name: &str) -> FileResult<FileView> {
        let record = self.require_active(name).await?;
        Ok(FileView::from(&record))
    }

    /// Replace the payload of the active file `name`.
    ///
    /// The file must exist before the new payload is even looked at.
    pub async fn update(&self, name: &str, file: Option<IncomingFile>) -> FileResult<FileRecord> {
        let existing = self.require_active(name).await?;
        let request = UploadRequest::new(name, file);
        self.orchestrator.replace(&existing, &request).await
    }

    /// Soft-delete the active file `name` after removing its stored objects.
    pub async fn delete_by_name(&self, name: &str) -> FileResult<FileRecord> {
        let existing = self.require_active(name).await?;
        self.orchestrator
            .remove(&existing)
            .await?
            .ok_or(FileError::DeleteFailed)
    }

    async fn require_active(&self, name: &str) -> FileResult<FileRecord> {
        self.repository
            .find_active_by_name(name)
            .await?
            .ok_or_else(|| FileError::NotFound {
                name: name.to_string(),
            })
    }
}
