//! File lifecycle core: validation, payload resolution, storage, metadata,
//! and the orchestration tying them together.

pub mod byte_source;
pub mod error;
pub mod file_repository;
pub mod file_service;
pub mod storage_gateway;
pub mod upload_orchestrator;
pub mod validator;

#[cfg(test)]
pub mod testing;
