use crate::services::{
    file_repository::SqliteFileRepository, file_service::FileService,
    storage_gateway::LocalObjectStore,
};
use sqlx::SqlitePool;
use std::{path::PathBuf, sync::Arc};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub files: FileService,

    /// Concrete object store, for streaming objects back out.
    pub objects: Arc<LocalObjectStore>,

    /// Pool used by the readiness probe.
    pub db: SqlitePool,

    /// Where large multipart file parts are spooled before processing.
    pub spool_dir: PathBuf,
}

impl AppState {
    /// Wire the SQLite-backed service over the local object store.
    pub fn new(db: SqlitePool, objects: LocalObjectStore) -> Self {
        let objects = Arc::new(objects);
        let repository = Arc::new(SqliteFileRepository::new(db.clone()));
        let spool_dir = objects.base_path().join(".incoming");
        Self {
            files: FileService::new(repository, objects.clone()),
            objects,
            db,
            spool_dir,
        }
    }
}
