//! Multi-step coordination behind every write.
//!
//! Each flow runs its stages in order (validate, resolve bytes, store,
//! persist) and stops at the first failure. Nothing is retried. When
//! persisting fails after the payload was stored, the stored object is
//! removed again unless an active record may still point at it.

use crate::{
    models::{
        file::FileRecord,
        upload::{IncomingFile, UploadRequest},
    },
    services::{
        byte_source,
        error::{FileError, FileResult},
        file_repository::{FileRepository, RepositoryError},
        storage_gateway::{StorageError, StorageGateway},
        validator,
    },
};
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Storage key for the object of file `name`: `files/<name>/<name>`.
pub fn storage_key(name: &str) -> String {
    format!("files/{name}/{name}")
}

/// Name under which a replacement payload for `name` is stored, so the
/// original object stays untouched until the metadata points elsewhere.
pub fn updated_name(name: &str) -> String {
    format!("{name}.updated")
}

#[derive(Clone)]
pub struct UploadOrchestrator {
    repository: Arc<dyn FileRepository>,
    storage: Arc<dyn StorageGateway>,
}

impl UploadOrchestrator {
    pub fn new(repository: Arc<dyn FileRepository>, storage: Arc<dyn StorageGateway>) -> Self {
        Self {
            repository,
            storage,
        }
    }

    /// Store a new file and create its record.
    ///
    /// The caller is expected to have checked that no active record uses the
    /// name; a conflict raised by the store is still reported as
    /// `AlreadyExists`.
    pub async fn create(&self, request: &UploadRequest) -> FileResult<FileRecord> {
        let (file, bytes) = self.validate_and_resolve(request).await?;
        let key = storage_key(&request.name);
        let url = self.store(bytes, &key, &file.content_type).await?;

        match self.repository.create(&request.name, &url).await {
            Ok(record) => {
                info!("created file {} (id {}) at {}", record.file_name, record.id, url);
                Ok(record)
            }
            // This put overwrote the winner's object at `key`; the winning
            // record still points there, so it must not be deleted.
            Err(RepositoryError::ConstraintViolation(name)) => {
                warn!("lost create race for {}; object {} now holds this payload", name, key);
                Err(FileError::AlreadyExists { name })
            }
            Err(err) => {
                self.discard(&key).await;
                Err(err.into())
            }
        }
    }

    /// Store a replacement payload for `existing` and point its record at it.
    pub async fn replace(
        &self,
        existing: &FileRecord,
        request: &UploadRequest,
    ) -> FileResult<FileRecord> {
        let (file, bytes) = self.validate_and_resolve(request).await?;
        let key = storage_key(&updated_name(&existing.file_name));
        let url = self.store(bytes, &key, &file.content_type).await?;
        // A previous replacement already points the record at this key.
        let key_in_use = existing.file_url == url;

        let outcome = self
            .repository
            .update(existing.id, &existing.file_name, &url)
            .await;
        match outcome {
            Ok(Some(record)) => {
                info!("updated file {} (id {}) to {}", record.file_name, record.id, url);
                Ok(record)
            }
            Ok(None) => {
                if !key_in_use {
                    self.discard(&key).await;
                }
                Err(FileError::NotFound {
                    name: existing.file_name.clone(),
                })
            }
            Err(err) => {
                if !key_in_use {
                    self.discard(&key).await;
                }
                Err(err.into())
            }
        }
    }

    /// Delete the stored object(s) of `existing`, then soft-delete its
    /// record.
    ///
    /// Storage failures are logged and do not stop the soft-delete. Returns
    /// `None` when the record was no longer active.
    pub async fn remove(&self, existing: &FileRecord) -> FileResult<Option<FileRecord>> {
        let original_key = storage_key(&existing.file_name);
        let replacement_key = storage_key(&updated_name(&existing.file_name));

        let mut keys = vec![original_key];
        if existing.file_url == self.storage.get_url(&replacement_key) {
            keys.push(replacement_key);
        }

        for key in &keys {
            match self.storage.delete(key).await {
                Ok(()) => debug!("deleted object {}", key),
                Err(StorageError::ObjectNotFound(_)) => debug!("object {} already gone", key),
                Err(err) => warn!("failed to delete object {}: {}", key, err),
            }
        }

        let deleted = self.repository.soft_delete(existing.id).await?;
        if let Some(record) = &deleted {
            info!("soft-deleted file {} (id {})", record.file_name, record.id);
        }
        Ok(deleted)
    }

    /// Validate `request` and obtain its payload bytes.
    async fn validate_and_resolve<'r>(
        &self,
        request: &'r UploadRequest,
    ) -> FileResult<(&'r IncomingFile, Bytes)> {
        let violations = validator::validate(request);
        if !violations.is_empty() {
            return Err(FileError::ValidationFailed(violations));
        }
        let file = request.file.as_ref().ok_or_else(|| {
            FileError::ValidationFailed(vec![validator::FILE_REQUIRED.to_string()])
        })?;

        let bytes = byte_source::resolve(&file.source).await?;
        Ok((file, bytes))
    }

    async fn store(&self, bytes: Bytes, key: &str, content_type: &str) -> FileResult<String> {
        let url = self.storage.put(bytes, key, content_type).await?;
        if url.is_empty() {
            warn!("storage returned no URL for {}", key);
            return Err(FileError::UploadFailed);
        }
        Ok(url)
    }

    /// Best-effort removal of an object whose record was never persisted.
    async fn discard(&self, key: &str) {
        match self.storage.delete(key).await {
            Ok(()) => info!("removed orphaned object {}", key),
            Err(err) => warn!("failed to remove orphaned object {}: {}", key, err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::test_pool,
        models::upload::ByteSource,
        services::{
            file_repository::{RepositoryResult, SqliteFileRepository},
            testing::{RecordingGateway, jpeg_request},
        },
    };
    use async_trait::async_trait;
    use chrono::Utc;

    /// Repository whose writes always fail with a database error.
    struct BrokenRepository;

    #[async_trait]
    impl FileRepository for BrokenRepository {
        async fn create(&self, _: &str, _: &str) -> RepositoryResult<FileRecord> {
            Err(RepositoryError::Sqlx(sqlx::Error::PoolClosed))
        }
        async fn list_active(&self) -> RepositoryResult<Vec<FileRecord>> {
            Ok(Vec::new())
        }
        async fn find_active_by_name(&self, _: &str) -> RepositoryResult<Option<FileRecord>> {
            Ok(None)
        }
        async fn update(&self, _: i64, _: &str, _: &str) -> RepositoryResult<Option<FileRecord>> {
            Err(RepositoryError::Sqlx(sqlx::Error::PoolClosed))
        }
        async fn soft_delete(&self, _: i64) -> RepositoryResult<Option<FileRecord>> {
            Ok(None)
        }
    }

    async fn orchestrator(gateway: &Arc<RecordingGateway>) -> UploadOrchestrator {
        let repo = Arc::new(SqliteFileRepository::new(test_pool().await));
        UploadOrchestrator::new(repo, gateway.clone())
    }

    #[test]
    fn keys_repeat_the_name() {
        assert_eq!(storage_key("a.jpg"), "files/a.jpg/a.jpg");
        assert_eq!(
            storage_key(&updated_name("a.jpg")),
            "files/a.jpg.updated/a.jpg.updated"
        );
    }

    #[tokio::test]
    async fn create_stores_at_derived_key() {
        let gateway = Arc::new(RecordingGateway::default());
        let record = orchestrator(&gateway)
            .await
            .create(&jpeg_request("a.jpg", b"jpeg"))
            .await
            .unwrap();

        assert_eq!(record.file_url, gateway.get_url("files/a.jpg/a.jpg"));
        assert_eq!(gateway.object("files/a.jpg/a.jpg").unwrap(), &b"jpeg"[..]);
    }

    #[tokio::test]
    async fn invalid_request_never_reaches_storage() {
        let gateway = Arc::new(RecordingGateway::default());
        let mut request = jpeg_request("a.txt", b"text");
        if let Some(file) = request.file.as_mut() {
            file.content_type = "text/plain".into();
        }

        let err = orchestrator(&gateway).await.create(&request).await.unwrap_err();
        assert!(matches!(err, FileError::ValidationFailed(_)));
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn unresolvable_payload_never_reaches_storage() {
        let gateway = Arc::new(RecordingGateway::default());
        let mut request = jpeg_request("a.jpg", b"");
        if let Some(file) = request.file.as_mut() {
            file.source = ByteSource::default();
        }

        let err = orchestrator(&gateway).await.create(&request).await.unwrap_err();
        assert!(matches!(err, FileError::PayloadUnavailable(_)));
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn replace_uses_updated_key_and_keeps_original() {
        let gateway = Arc::new(RecordingGateway::default());
        let orchestrator = orchestrator(&gateway).await;
        let created = orchestrator
            .create(&jpeg_request("a.jpg", b"v1"))
            .await
            .unwrap();

        let updated = orchestrator
            .replace(&created, &jpeg_request("a.jpg", b"v2"))
            .await
            .unwrap();

        assert_eq!(updated.id, created.id);
        assert_eq!(updated.file_url, gateway.get_url("files/a.jpg.updated/a.jpg.updated"));
        assert_eq!(gateway.object("files/a.jpg/a.jpg").unwrap(), &b"v1"[..]);
        assert_eq!(
            gateway.object("files/a.jpg.updated/a.jpg.updated").unwrap(),
            &b"v2"[..]
        );
    }

    #[tokio::test]
    async fn remove_deletes_every_object_the_record_used() {
        let gateway = Arc::new(RecordingGateway::default());
        let orchestrator = orchestrator(&gateway).await;
        let created = orchestrator
            .create(&jpeg_request("a.jpg", b"v1"))
            .await
            .unwrap();
        let updated = orchestrator
            .replace(&created, &jpeg_request("a.jpg", b"v2"))
            .await
            .unwrap();

        let deleted = orchestrator.remove(&updated).await.unwrap().unwrap();
        assert!(deleted.deleted_at.is_some());
        assert!(gateway.object("files/a.jpg/a.jpg").is_none());
        assert!(gateway.object("files/a.jpg.updated/a.jpg.updated").is_none());
    }

    #[tokio::test]
    async fn failed_persist_discards_stored_object() {
        let gateway = Arc::new(RecordingGateway::default());
        let orchestrator = UploadOrchestrator::new(Arc::new(BrokenRepository), gateway.clone());

        let err = orchestrator
            .create(&jpeg_request("a.jpg", b"jpeg"))
            .await
            .unwrap_err();
        assert!(matches!(err, FileError::Repository(_)));
        assert!(gateway.object("files/a.jpg/a.jpg").is_none());
        assert_eq!(
            gateway.calls(),
            vec!["put files/a.jpg/a.jpg", "delete files/a.jpg/a.jpg"]
        );
    }

    fn active_record(name: &str, file_url: String) -> FileRecord {
        let now = Utc::now();
        FileRecord {
            id: 1,
            file_name: name.to_string(),
            file_url,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[tokio::test]
    async fn failed_replace_discards_updated_object() {
        let gateway = Arc::new(RecordingGateway::default());
        let orchestrator = UploadOrchestrator::new(Arc::new(BrokenRepository), gateway.clone());
        let existing = active_record("x.jpg", gateway.get_url("files/x.jpg/x.jpg"));

        let err = orchestrator
            .replace(&existing, &jpeg_request("x.jpg", b"v2"))
            .await
            .unwrap_err();
        assert!(matches!(err, FileError::Repository(_)));
        assert!(gateway.object("files/x.jpg.updated/x.jpg.updated").is_none());
        assert_eq!(
            gateway.calls(),
            vec![
                "put files/x.jpg.updated/x.jpg.updated",
                "delete files/x.jpg.updated/x.jpg.updated"
            ]
        );
    }

    #[tokio::test]
    async fn failed_replace_keeps_object_the_record_points_at() {
        let gateway = Arc::new(RecordingGateway::default());
        let orchestrator = UploadOrchestrator::new(Arc::new(BrokenRepository), gateway.clone());
        let existing = active_record(
            "x.jpg",
            gateway.get_url("files/x.jpg.updated/x.jpg.updated"),
        );

        let err = orchestrator
            .replace(&existing, &jpeg_request("x.jpg", b"v3"))
            .await
            .unwrap_err();
        assert!(matches!(err, FileError::Repository(_)));
        assert_eq!(
            gateway.object("files/x.jpg.updated/x.jpg.updated").unwrap(),
            &b"v3"[..]
        );
        assert_eq!(gateway.calls(), vec!["put files/x.jpg.updated/x.jpg.updated"]);
    }

    #[tokio::test]
    async fn lost_create_race_leaves_object_in_place() {
        let gateway = Arc::new(RecordingGateway::default());
        let orchestrator = orchestrator(&gateway).await;
        orchestrator
            .create(&jpeg_request("a.jpg", b"winner"))
            .await
            .unwrap();

        let err = orchestrator
            .create(&jpeg_request("a.jpg", b"loser"))
            .await
            .unwrap_err();
        assert!(matches!(err, FileError::AlreadyExists { name } if name == "a.jpg"));
        assert_eq!(gateway.object("files/a.jpg/a.jpg").unwrap(), &b"loser"[..]);
        assert_eq!(
            gateway.calls(),
            vec!["put files/a.jpg/a.jpg", "put files/a.jpg/a.jpg"]
        );
    }

    #[tokio::test]
    async fn empty_url_is_an_upload_failure() {
        let gateway = Arc::new(RecordingGateway::without_urls());
        let err = orchestrator(&gateway)
            .await
            .create(&jpeg_request("a.jpg", b"jpeg"))
            .await
            .unwrap_err();
        assert!(matches!(err, FileError::UploadFailed));
    }
}
