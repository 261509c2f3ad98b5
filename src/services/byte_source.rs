//! Resolves an upload's [`ByteSource`] into the bytes that get stored.

use crate::models::upload::ByteSource;
use bytes::Bytes;
use std::io;
use thiserror::Error;
use tokio::fs;
use tracing::debug;

/// Why an upload's payload could not be obtained.
///
/// Messages carry presence flags only; paths stay in debug logs.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("File buffer or path is required (has_bytes: {has_bytes}, has_path: {has_path})")]
    Missing { has_bytes: bool, has_path: bool },
    #[error("File payload could not be read")]
    Unreadable(#[source] io::Error),
}

/// Obtain the payload bytes for `source`.
///
/// In-memory bytes win over a path. A path is read in full before
/// returning.
pub async fn resolve(source: &ByteSource) -> Result<Bytes, PayloadError> {
    if let Some(bytes) = &source.bytes {
        return Ok(bytes.clone());
    }

    if let Some(path) = &source.path {
        return match fs::read(path).await {
            Ok(buf) => Ok(Bytes::from(buf)),
            Err(err) => {
                debug!("failed to read payload from {}: {}", path.display(), err);
                Err(PayloadError::Unreadable(err))
            }
        };
    }

    Err(PayloadError::Missing {
        has_bytes: false,
        has_path: false,
    })
}
