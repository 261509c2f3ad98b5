//! Defines routes for the file lifecycle API.
//!
//! ## Structure
//! - **File endpoints**
//!   - `POST   /files`          - upload (multipart `filename`, `file`)
//!   - `GET    /files`          - list active files
//!   - `GET    /files/{name}`   - file details
//!   - `PUT    /files/{name}`   - replace payload (multipart `file`)
//!   - `DELETE /files/{name}`   - soft-delete
//!
//! - **Object endpoint**
//!   - `GET    /objects/{*key}` - stream a stored object; these are the URLs
//!     the local object store hands out
//!
//! The wildcard `*key` allows nested keys like `files/a.jpg/a.jpg`.

use crate::{
    handlers::{
        file_handlers::{delete_file, get_file, get_object, list_files, update_file, upload_file},
        health_handlers::{healthz, readyz},
    },
    state::AppState,
};
use axum::{Router, extract::DefaultBodyLimit, routing::get};

/// Cap on request bodies; comfortably above the largest accepted file.
pub const MAX_REQUEST_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Build the router. Handlers share [`AppState`].
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/files", get(list_files).post(upload_file))
        .route(
            "/files/{name}",
            get(get_file).put(update_file).delete(delete_file),
        )
        .route("/objects/{*key}", get(get_object))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
}
