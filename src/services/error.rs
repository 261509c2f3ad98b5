use crate::services::{
    byte_source::PayloadError, file_repository::RepositoryError, storage_gateway::StorageError,
};
use thiserror::Error;

/// Failures of the file lifecycle operations.
///
/// Every variant except the transparent infrastructure ones describes a
/// problem with the caller's request.
#[derive(Debug, Error)]
pub enum FileError {
    #[error("{}", .0.join(", "))]
    ValidationFailed(Vec<String>),
    #[error("File name already exists")]
    AlreadyExists { name: String },
    #[error("File not found")]
    NotFound { name: String },
    #[error(transparent)]
    PayloadUnavailable(#[from] PayloadError),
    #[error("Failed to upload file")]
    UploadFailed,
    #[error("Failed to delete file")]
    DeleteFailed,
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl FileError {
    /// True when the error should be reported to the caller as a bad request.
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            FileError::Storage(StorageError::Io(_) | StorageError::ObjectNotFound(_))
                | FileError::Repository(_)
        )
    }
}

pub type FileResult<T> = Result<T, FileError>;
