//! REST surface for creating and reading scans.
//!
//! Creation is persist-then-publish: the PENDING row is durable before
//! `scan.created` goes out, so the orchestrator always finds the scan it
//! was told about.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;
use serde_json::{Value, json};

use vigil_model::{Scan, ScanId, ScanType};

use crate::errors::{AppError, AppResult};
use crate::infra::app_state::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateScanRequest {
    pub name: String,
    pub target: String,
    #[serde(rename = "type", default = "default_scan_type")]
    pub scan_type: ScanType,
}

fn default_scan_type() -> ScanType {
    ScanType::Quick
}

pub async fn create_scan(
    State(state): State<AppState>,
    Json(request): Json<CreateScanRequest>,
) -> AppResult<(StatusCode, Json<Scan>)> {
    if request.target.trim().is_empty() {
        return Err(AppError::bad_request("target must not be empty"));
    }

    let scan = state
        .store
        .create(Scan::new(
            request.name,
            request.target,
            request.scan_type,
        ))
        .await?;
    state.bus.scan_created(scan.id, &scan.target).await;

    Ok((StatusCode::CREATED, Json(scan)))
}

pub async fn list_scans(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<Scan>>> {
    Ok(Json(state.store.list().await?))
}

pub async fn get_scan(
    State(state): State<AppState>,
    Path(id): Path<ScanId>,
) -> AppResult<Json<Scan>> {
    let scan = state
        .store
        .get(id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("scan {id} not found")))?;
    Ok(Json(scan))
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "connections": state.websocket_manager.connection_count(),
    }))
}
