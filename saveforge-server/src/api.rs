use crate::server::VersioningEngine;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use saveforge_core::models::{Branch, CommitRecord, SaveHistory};
use saveforge_core::Error;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<VersioningEngine>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/games/:id/versioning", post(enable_versioning))
        .route("/games/:id/versioning/disable", post(disable_versioning))
        .route("/games/:id/checkpoints", post(create_checkpoint))
        .route("/games/:id/branches", post(create_branch))
        .route("/games/:id/branches/:name/switch", post(switch_branch))
        .route("/games/:id/restore", post(restore_to_commit))
        .route("/games/:id/history", get(get_history))
        // The desktop UI calls in from its own origin.
        .layer(tower_http::cors::CorsLayer::permissive())
        .with_state(state)
}

fn status_for(error: &Error) -> StatusCode {
    match error {
        Error::BranchNotFound(_) | Error::CommitNotFound(_) | Error::GameNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        Error::RepositoryBusy | Error::DirtyWorkingTree => StatusCode::CONFLICT,
        Error::ConfirmationRequired => StatusCode::PRECONDITION_REQUIRED,
        Error::OperationTimedOut(_) => StatusCode::GATEWAY_TIMEOUT,
        Error::InvalidOperation(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reject(error: Error) -> (StatusCode, String) {
    (status_for(&error), error.to_string())
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "watch_backend": state.engine.watch_backend(),
    }))
}

#[derive(Deserialize)]
struct EnableVersioningRequest {
    name: String,
    save_paths: Vec<PathBuf>,
}

async fn enable_versioning(
    State(state): State<AppState>,
    Path(game_id): Path<i64>,
    Json(req): Json<EnableVersioningRequest>,
) -> Result<StatusCode, (StatusCode, String)> {
    state
        .engine
        .enable_versioning(game_id, req.name, req.save_paths)
        .await
        .map(|_| StatusCode::NO_CONTENT)
        .map_err(reject)
}

async fn disable_versioning(
    State(state): State<AppState>,
    Path(game_id): Path<i64>,
) -> Result<StatusCode, (StatusCode, String)> {
    state
        .engine
        .disable_versioning(game_id)
        .await
        .map(|_| StatusCode::NO_CONTENT)
        .map_err(reject)
}

#[derive(Deserialize)]
struct CreateCheckpointRequest {
    save_name: Option<String>,
    message: Option<String>,
}

async fn create_checkpoint(
    State(state): State<AppState>,
    Path(game_id): Path<i64>,
    Json(req): Json<CreateCheckpointRequest>,
) -> Result<Json<CommitRecord>, (StatusCode, String)> {
    state
        .engine
        .create_checkpoint(game_id, req.save_name, req.message)
        .await
        .map(Json)
        .map_err(reject)
}

#[derive(Deserialize)]
struct CreateBranchRequest {
    branch_name: String,
    description: Option<String>,
}

async fn create_branch(
    State(state): State<AppState>,
    Path(game_id): Path<i64>,
    Json(req): Json<CreateBranchRequest>,
) -> Result<Json<Branch>, (StatusCode, String)> {
    state
        .engine
        .create_branch(game_id, req.branch_name, req.description)
        .await
        .map(Json)
        .map_err(reject)
}

async fn switch_branch(
    State(state): State<AppState>,
    Path((game_id, branch_name)): Path<(i64, String)>,
) -> Result<StatusCode, (StatusCode, String)> {
    state
        .engine
        .switch_branch(game_id, branch_name)
        .await
        .map(|_| StatusCode::NO_CONTENT)
        .map_err(reject)
}

#[derive(Deserialize)]
struct RestoreRequest {
    commit: String,
    #[serde(default)]
    confirmed: bool,
}

async fn restore_to_commit(
    State(state): State<AppState>,
    Path(game_id): Path<i64>,
    Json(req): Json<RestoreRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    state
        .engine
        .restore_to_commit(game_id, req.commit, req.confirmed)
        .await
        .map(|restore_branch| Json(serde_json::json!({ "restore_branch": restore_branch })))
        .map_err(reject)
}

async fn get_history(
    State(state): State<AppState>,
    Path(game_id): Path<i64>,
) -> Result<Json<SaveHistory>, (StatusCode, String)> {
    state
        .engine
        .get_history(game_id)
        .await
        .map(Json)
        .map_err(reject)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            status_for(&Error::BranchNotFound("x".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(status_for(&Error::RepositoryBusy), StatusCode::CONFLICT);
        assert_eq!(
            status_for(&Error::ConfirmationRequired),
            StatusCode::PRECONDITION_REQUIRED
        );
        assert_eq!(
            status_for(&Error::OperationTimedOut(std::time::Duration::from_secs(30))),
            StatusCode::GATEWAY_TIMEOUT
        );
    }
}
