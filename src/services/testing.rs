//! Test doubles shared by the service tests.

use crate::{
    models::upload::{ByteSource, IncomingFile, UploadRequest},
    services::storage_gateway::{StorageError, StorageGateway, StorageResult},
};
use async_trait::async_trait;
use bytes::Bytes;
use std::{collections::HashMap, io, sync::Mutex};

/// In-memory gateway that records every call it receives.
#[derive(Default)]
pub struct RecordingGateway {
    objects: Mutex<HashMap<String, Bytes>>,
    calls: Mutex<Vec<String>>,
    empty_urls: bool,
    failing_deletes: bool,
}

impl RecordingGateway {
    /// Gateway whose `put` succeeds but hands back an empty URL.
    pub fn without_urls() -> Self {
        Self {
            empty_urls: true,
            ..Self::default()
        }
    }

    /// Gateway whose `delete` always fails with an I/O error.
    pub fn with_failing_deletes() -> Self {
        Self {
            failing_deletes: true,
            ..Self::default()
        }
    }

    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl StorageGateway for RecordingGateway {
    async fn put(&self, bytes: Bytes, key: &str, _content_type: &str) -> StorageResult<String> {
        self.calls.lock().unwrap().push(format!("put {key}"));
        self.objects.lock().unwrap().insert(key.to_string(), bytes);
        if self.empty_urls {
            return Ok(String::new());
        }
        Ok(self.get_url(key))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.calls.lock().unwrap().push(format!("delete {key}"));
        if self.failing_deletes {
            return Err(StorageError::Io(io::Error::other("storage offline")));
        }
        match self.objects.lock().unwrap().remove(key) {
            Some(_) => Ok(()),
            None => Err(StorageError::ObjectNotFound(key.to_string())),
        }
    }

    fn get_url(&self, key: &str) -> String {
        format!("memory://{key}")
    }
}

/// A valid in-memory JPEG upload of `bytes` named `name`.
pub fn jpeg_request(name: &str, bytes: &[u8]) -> UploadRequest {
    UploadRequest::new(
        name,
        Some(IncomingFile {
            content_type: "image/jpeg".into(),
            size: bytes.len() as u64,
            source: ByteSource::in_memory(bytes.to_vec()),
        }),
    )
}
