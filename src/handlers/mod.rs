//! HTTP handlers: file lifecycle, object download, and probes.

pub mod file_handlers;
pub mod health_handlers;
