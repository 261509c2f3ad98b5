//! HTTP handlers for the file lifecycle and for serving stored objects.
//!
//! Multipart file parts are kept in memory while small and spooled to disk
//! past [`MEMORY_SPOOL_THRESHOLD`]; either way the service receives a
//! [`ByteSource`] and never touches the request itself.

use crate::{
    errors::AppError,
    models::{
        file::{FileRecord, FileView, ListPage, UploadResponse},
        upload::{ByteSource, IncomingFile, UploadRequest},
    },
    state::AppState,
};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, State, multipart::Field},
    http::{HeaderValue, StatusCode, header},
    response::Response,
};
use std::path::{Path as FsPath, PathBuf};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tokio_util::io::ReaderStream;
use uuid::Uuid;

/// File parts larger than this are written to the spool directory.
pub const MEMORY_SPOOL_THRESHOLD: usize = 256 * 1024;

const FILENAME_FIELD: &str = "filename";
const FILE_FIELD: &str = "file";
const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// A file part pulled out of a multipart body.
struct ReceivedFile {
    incoming: IncomingFile,
    original_name: Option<String>,
    spooled: Option<PathBuf>,
}

/// The recognised fields of an upload form.
#[derive(Default)]
struct UploadForm {
    filename: Option<String>,
    file: Option<ReceivedFile>,
}

impl UploadForm {
    /// Explicit `filename` field, else the file part's own name.
    fn name(&self) -> String {
        self.filename
            .clone()
            .filter(|name| !name.is_empty())
            .or_else(|| self.file.as_ref().and_then(|f| f.original_name.clone()))
            .unwrap_or_default()
    }

    fn incoming(&self) -> Option<IncomingFile> {
        self.file.as_ref().map(|f| f.incoming.clone())
    }

    /// Remove the spooled part, if any.
    async fn cleanup(self) {
        if let Some(path) = self.file.and_then(|f| f.spooled) {
            if let Err(err) = fs::remove_file(&path).await {
                tracing::warn!("failed to remove spooled upload {}: {}", path.display(), err);
            }
        }
    }
}

/// `POST /files` - multipart `filename` + `file`.
pub async fn upload_file(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let form = read_upload_form(multipart, &state.spool_dir).await?;
    let request = UploadRequest::new(form.name(), form.incoming());

    let result = state.files.upload(request).await;
    form.cleanup().await;
    Ok(Json(result?))
}

/// `GET /files`
pub async fn list_files(State(state): State<AppState>) -> Result<Json<ListPage>, AppError> {
    Ok(Json(state.files.list().await?))
}

/// `GET /files/{name}`
pub async fn get_file(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<FileView>, AppError> {
    Ok(Json(state.files.get_by_name(&name).await?))
}

/// `PUT /files/{name}` - multipart `file` replaces the payload.
pub async fn update_file(
    State(state): State<AppState>,
    Path(name): Path<String>,
    multipart: Multipart,
) -> Result<Json<FileRecord>, AppError> {
    let form = read_upload_form(multipart, &state.spool_dir).await?;

    let result = state.files.update(&name, form.incoming()).await;
    form.cleanup().await;
    Ok(Json(result?))
}

/// `DELETE /files/{name}` - soft-delete; responds with the marked record.
pub async fn delete_file(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<FileRecord>, AppError> {
    Ok(Json(state.files.delete_by_name(&name).await?))
}

/// `GET /objects/{*key}` - stream a stored object.
pub async fn get_object(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response, AppError> {
    let object = state.objects.open(&key).await?;

    let mut response = Response::new(Body::from_stream(ReaderStream::new(object.file)));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&object.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static(FALLBACK_CONTENT_TYPE)),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(object.size_bytes));
    Ok(response)
}

async fn read_upload_form(
    mut multipart: Multipart,
    spool_dir: &FsPath,
) -> Result<UploadForm, AppError> {
    let mut form = UploadForm::default();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                form.cleanup().await;
                return Err(err.into());
            }
        };

        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some(FILENAME_FIELD) => match field.text().await {
                Ok(text) => form.filename = Some(text),
                Err(err) => {
                    form.cleanup().await;
                    return Err(err.into());
                }
            },
            Some(FILE_FIELD) => {
                let received = receive_file(field, spool_dir).await;
                // Only the first file part counts; drop any spool from later ones.
                match (received, form.file.is_some()) {
                    (Ok(file), false) => form.file = Some(file),
                    (Ok(extra), true) => {
                        UploadForm {
                            filename: None,
                            file: Some(extra),
                        }
                        .cleanup()
                        .await
                    }
                    (Err(err), _) => {
                        form.cleanup().await;
                        return Err(err);
                    }
                }
            }
            other => tracing::debug!("ignoring multipart field {:?}", other),
        }
    }

    Ok(form)
}

/// Drain a file part, keeping it in memory up to the spool threshold.
async fn receive_file(mut field: Field<'_>, spool_dir: &FsPath) -> Result<ReceivedFile, AppError> {
    let content_type = field
        .content_type()
        .unwrap_or(FALLBACK_CONTENT_TYPE)
        .to_string();
    let original_name = field.file_name().map(str::to_string);

    let mut buffer: Vec<u8> = Vec::new();
    let mut spool: Option<(PathBuf, File)> = None;
    let mut size: u64 = 0;

    let drained = async {
        while let Some(chunk) = field.chunk().await? {
            size += chunk.len() as u64;
            if spool.is_none() && buffer.len() + chunk.len() > MEMORY_SPOOL_THRESHOLD {
                fs::create_dir_all(spool_dir).await?;
                let path = spool_dir.join(format!(".upload-{}", Uuid::new_v4()));
                let file = File::create(&path).await?;
                tracing::debug!("spooling upload to {}", path.display());
                spool = Some((path, file));
            }
            match spool.as_mut() {
                Some((_, file)) => {
                    if !buffer.is_empty() {
                        file.write_all(&buffer).await?;
                        buffer = Vec::new();
                    }
                    file.write_all(&chunk).await?;
                }
                None => buffer.extend_from_slice(&chunk),
            }
        }
        if let Some((_, file)) = spool.as_mut() {
            file.flush().await?;
            file.sync_all().await?;
        }
        Ok::<(), AppError>(())
    }
    .await;

    if let Err(err) = drained {
        if let Some((path, _)) = spool {
            let _ = fs::remove_file(&path).await;
        }
        return Err(err);
    }

    let (source, spooled) = match spool {
        Some((path, _)) => (ByteSource::on_disk(path.clone()), Some(path)),
        None => (ByteSource::in_memory(buffer), None),
    };

    Ok(ReceivedFile {
        incoming: IncomingFile {
            content_type,
            size,
            source,
        },
        original_name,
        spooled,
    })
}
