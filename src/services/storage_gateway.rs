//! Object storage for file payloads.
//!
//! [`StorageGateway`] is the capability the upload pipeline depends on;
//! [`LocalObjectStore`] implements it on local disk, sharding payloads beneath
//! `base_path/{shard}/{shard}/{md5(key)}` and serving them back through the
//! `/objects/{*key}` route.

use async_trait::async_trait;
use bytes::Bytes;
use std::{
    io::{self, ErrorKind},
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
pub enum StorageError {
    #[error("object `{0}` not found")]
    ObjectNotFound(String),
    #[error("invalid object key")]
    InvalidObjectKey,
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Durable object store used for file payloads.
///
/// `put` on an existing key silently replaces the object there.
#[async_trait]
pub trait StorageGateway: Send + Sync {
    /// Store `bytes` at `key` and return the URL it can be fetched from.
    async fn put(&self, bytes: Bytes, key: &str, content_type: &str) -> StorageResult<String>;

    /// Remove the object at `key`. Missing objects yield `ObjectNotFound`.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Deterministic URL for `key`; does not check that the object exists.
    fn get_url(&self, key: &str) -> String;
}

/// A stored object opened for reading.
pub struct StoredObject {
    pub file: File,
    pub size_bytes: u64,
    pub content_type: String,
}

const CONTENT_TYPE_SUFFIX: &str = "type";
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Local-disk [`StorageGateway`].
#[derive(Clone, Debug)]
pub struct LocalObjectStore {
    /// Base directory on disk where object payloads are stored.
    base_path: PathBuf,

    /// Externally reachable base URL, without a trailing slash.
    public_url: String,
}

impl LocalObjectStore {
    pub fn new(base_path: impl Into<PathBuf>, public_url: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
            public_url: public_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Keys are hashed into paths, so only empty keys and keys carrying
    /// control characters (which cannot appear in the object URL) are refused.
    fn ensure_key_safe(key: &str) -> StorageResult<()> {
        if key.is_empty() || key.bytes().any(|b| b.is_ascii_control()) {
            return Err(StorageError::InvalidObjectKey);
        }
        Ok(())
    }

    /// Payload path for `key`: two MD5-derived shard levels, then the full
    /// digest as the file name.
    fn object_path(&self, key: &str) -> PathBuf {
        let digest = md5::compute(key.as_bytes());
        let mut path = self.base_path.clone();
        path.push(format!("{:02x}", digest[0]));
        path.push(format!("{:02x}", digest[1]));
        path.push(format!("{:x}", digest));
        path
    }

    fn content_type_path(object_path: &Path) -> PathBuf {
        object_path.with_extension(CONTENT_TYPE_SUFFIX)
    }

    /// Open the object at `key` for streaming out.
    pub async fn open(&self, key: &str) -> StorageResult<StoredObject> {
        Self::ensure_key_safe(key)?;
        let path = self.object_path(key);
        let file = File::open(&path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                StorageError::ObjectNotFound(key.to_string())
            } else {
                StorageError::Io(err)
            }
        })?;
        let size_bytes = file.metadata().await?.len();
        let content_type = match fs::read_to_string(Self::content_type_path(&path)).await {
            Ok(value) if !value.is_empty() => value,
            Ok(_) => DEFAULT_CONTENT_TYPE.to_string(),
            Err(err) if err.kind() == ErrorKind::NotFound => DEFAULT_CONTENT_TYPE.to_string(),
            Err(err) => return Err(StorageError::Io(err)),
        };

        Ok(StoredObject {
            file,
            size_bytes,
            content_type,
        })
    }

    /// Write `bytes` to a temp file next to `target`, fsync, then rename
    /// into place. The temp file is removed on any failure.
    async fn write_atomically(target: &Path, bytes: &[u8]) -> StorageResult<()> {
        let parent = target.parent().map(Path::to_path_buf).ok_or_else(|| {
            StorageError::Io(io::Error::new(
                ErrorKind::Other,
                "object path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));

        let written = async {
            let mut file = File::create(&tmp_path).await?;
            file.write_all(bytes).await?;
            file.flush().await?;
            file.sync_all().await?;
            fs::rename(&tmp_path, target).await
        }
        .await;

        if let Err(err) = written {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }
        Ok(())
    }

    /// Remove empty shard directories up to (not including) the base path.
    async fn prune_empty_dirs(&self, start: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(&self.base_path) && current != self.base_path {
            match fs::remove_dir(&current).await {
                Ok(_) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl StorageGateway for LocalObjectStore {
    async fn put(&self, bytes: Bytes, key: &str, content_type: &str) -> StorageResult<String> {
        Self::ensure_key_safe(key)?;
        let path = self.object_path(key);

        Self::write_atomically(&path, &bytes).await?;
        Self::write_atomically(&Self::content_type_path(&path), content_type.as_bytes()).await?;

        debug!(
            "stored object {} ({} bytes, etag {:x}) at {}",
            key,
            bytes.len(),
            md5::compute(&bytes),
            path.display()
        );
        Ok(self.get_url(key))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        Self::ensure_key_safe(key)?;
        let path = self.object_path(key);

        match fs::remove_file(&path).await {
            Ok(_) => debug!("removed object {} at {}", key, path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(StorageError::ObjectNotFound(key.to_string()));
            }
            Err(err) => return Err(StorageError::Io(err)),
        }

        match fs::remove_file(Self::content_type_path(&path)).await {
            Ok(_) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(StorageError::Io(err)),
        }

        if let Some(parent) = path.parent() {
            self.prune_empty_dirs(parent).await;
        }
        Ok(())
    }

    fn get_url(&self, key: &str) -> String {
        format!("{}/objects/{}", self.public_url, key)
    }
}
