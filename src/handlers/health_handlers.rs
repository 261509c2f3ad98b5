//! Health & readiness handlers.
//!
//! - GET /healthz  -> liveness, no I/O
//! - GET /readyz   -> metadata store reachable and object store writable

use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use sqlx::SqlitePool;
use std::{collections::BTreeMap, path::Path};
use tokio::fs;
use uuid::Uuid;

const PROBE_CONTENT: &[u8] = b"readyz";

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: &'static str,
    checks: BTreeMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}

impl CheckStatus {
    fn from_result(result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self {
                ok: true,
                error: None,
            },
            Err(error) => Self {
                ok: false,
                error: Some(error),
            },
        }
    }
}

/// `GET /healthz`
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

/// `GET /readyz`
///
/// 200 when every check passes, 503 otherwise; the body lists each check.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let mut checks = BTreeMap::new();
    checks.insert("sqlite", CheckStatus::from_result(check_sqlite(&state.db).await));
    checks.insert(
        "disk",
        CheckStatus::from_result(check_disk(state.objects.base_path()).await),
    );

    let ready = checks.values().all(|check| check.ok);
    if !ready {
        tracing::warn!("readiness check failed");
    }

    let (status, label) = if ready {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "error")
    };
    (
        status,
        Json(ReadyResponse {
            status: label,
            checks,
        }),
    )
}

async fn check_sqlite(db: &SqlitePool) -> Result<(), String> {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(db).await {
        Ok(1) => Ok(()),
        Ok(v) => Err(format!("unexpected result: {}", v)),
        Err(e) => Err(format!("error: {}", e)),
    }
}

/// Write, read back and remove a probe file under `root`.
async fn check_disk(root: &Path) -> Result<(), String> {
    let probe = root.join(format!(".readyz-{}", Uuid::new_v4()));
    fs::write(&probe, PROBE_CONTENT)
        .await
        .map_err(|e| format!("could not write probe file: {}", e))?;

    let read = fs::read(&probe).await;
    let _ = fs::remove_file(&probe).await;
    match read {
        Ok(bytes) if bytes == PROBE_CONTENT => Ok(()),
        Ok(_) => Err("probe file content mismatch".to_string()),
        Err(e) => Err(format!("could not read probe file: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db::test_pool, services::storage_gateway::LocalObjectStore};
    use tempfile::TempDir;

    #[tokio::test]
    async fn disk_check_leaves_no_probe_behind() {
        let dir = TempDir::new().unwrap();
        check_disk(dir.path()).await.unwrap();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn disk_check_fails_for_missing_root() {
        let dir = TempDir::new().unwrap();
        let err = check_disk(&dir.path().join("missing")).await.unwrap_err();
        assert!(err.starts_with("could not write probe file"));
    }

    #[tokio::test]
    async fn ready_when_store_and_disk_are_usable() {
        let dir = TempDir::new().unwrap();
        let state = AppState::new(
            test_pool().await,
            LocalObjectStore::new(dir.path(), "http://files.test"),
        );

        let response = readyz(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
