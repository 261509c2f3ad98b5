//! Transient request types describing an upload before it is stored.

use bytes::Bytes;
use std::path::PathBuf;

/// Where an upload's bytes can be found.
///
/// Transports fill in whichever representation they have: bytes already
/// buffered in memory, a path to a spooled file, or (for malformed input)
/// neither.
#[derive(Clone, Debug, Default)]
pub struct ByteSource {
    pub bytes: Option<Bytes>,
    pub path: Option<PathBuf>,
}

impl ByteSource {
    pub fn in_memory(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: Some(bytes.into()),
            path: None,
        }
    }

    pub fn on_disk(path: impl Into<PathBuf>) -> Self {
        Self {
            bytes: None,
            path: Some(path.into()),
        }
    }
}

/// A file part attached to an upload request.
#[derive(Clone, Debug)]
pub struct IncomingFile {
    /// Declared MIME type.
    pub content_type: String,

    /// Declared size in bytes.
    pub size: u64,

    pub source: ByteSource,
}

/// An upload or replacement request for the file named `name`.
///
/// `file` is optional so that a request without any file part can still be
/// validated and reported as such.
#[derive(Clone, Debug)]
pub struct UploadRequest {
    pub name: String,
    pub file: Option<IncomingFile>,
}

impl UploadRequest {
    pub fn new(name: impl Into<String>, file: Option<IncomingFile>) -> Self {
        Self {
            name: name.into(),
            file,
        }
    }
}
