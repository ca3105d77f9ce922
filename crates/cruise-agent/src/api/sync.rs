use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use crate::orchestrator::{ProgressSnapshot, SyncOptions};

use super::{App, ApiError};

pub async fn handle_post_sync(
    State(app): State<Arc<App>>,
    Json(options): Json<SyncOptions>,
) -> Result<Json<crate::metrics::ImportMetrics>, ApiError> {
    let metrics = app.orchestrator.run_sync(options).await?;
    Ok(Json(metrics))
}

pub async fn handle_post_dry_run(
    State(app): State<Arc<App>>,
    Json(options): Json<SyncOptions>,
) -> Result<Json<crate::metrics::ImportMetrics>, ApiError> {
    let options = SyncOptions {
        dry_run: true,
        ..options
    };
    let metrics = app.orchestrator.run_sync(options).await?;
    Ok(Json(metrics))
}

#[derive(Debug, serde::Serialize)]
pub struct StatusResponse {
    in_progress: bool,
    cancel_requested: bool,
    progress: Option<ProgressSnapshot>,
}

pub async fn handle_get_status(State(app): State<Arc<App>>) -> Json<StatusResponse> {
    let run_state = &app.orchestrator.run_state;
    Json(StatusResponse {
        in_progress: run_state.is_in_progress(),
        cancel_requested: run_state.cancel_requested(),
        progress: run_state.progress().await,
    })
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    limit: Option<i64>,
}

pub async fn handle_get_history(
    State(app): State<Arc<App>>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<cruise_sql::sync_history::SyncHistoryRow>>, ApiError> {
    let limit = query.limit.unwrap_or(20).clamp(1, 100);
    let rows = cruise_sql::sync_history::history(&app.orchestrator.db, limit).await?;
    Ok(Json(rows))
}

#[derive(Debug, serde::Serialize)]
pub struct CancelResponse {
    success: bool,
    message: String,
}

pub async fn handle_post_cancel(State(app): State<Arc<App>>) -> Json<CancelResponse> {
    if app.orchestrator.run_state.is_in_progress() {
        app.orchestrator.request_cancel();
        Json(CancelResponse {
            success: true,
            message: "cancellation requested".to_string(),
        })
    } else {
        Json(CancelResponse {
            success: false,
            message: "no sync in progress".to_string(),
        })
    }
}

#[derive(Debug, serde::Serialize)]
pub struct TestConnectionResponse {
    skipped: bool,
    message: Option<String>,
}

/// Skips the probe entirely while a sync holds the control connection
/// (§6.3): testing would otherwise race the orchestrator's own usage.
pub async fn handle_get_test_connection(
    State(app): State<Arc<App>>,
) -> Result<Json<TestConnectionResponse>, ApiError> {
    if app.orchestrator.run_state.is_in_progress() {
        return Ok(Json(TestConnectionResponse {
            skipped: true,
            message: None,
        }));
    }
    let message = app.orchestrator.control.test_connection().await?;
    Ok(Json(TestConnectionResponse {
        skipped: false,
        message: Some(message),
    }))
}

pub async fn handle_get_available_years(
    State(app): State<Arc<App>>,
) -> Result<Json<Vec<i32>>, ApiError> {
    let years = crate::ftp::listing::available_years(&app.orchestrator.control).await?;
    Ok(Json(years))
}
