use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use crate::maintenance;

use super::{ApiError, App};

pub async fn handle_post_purge(
    State(app): State<Arc<App>>,
) -> Result<Json<maintenance::PurgeReport>, ApiError> {
    let report = maintenance::purge_raw_payloads(&app.orchestrator.db).await?;
    Ok(Json(report))
}

pub async fn handle_get_storage_stats(
    State(app): State<Arc<App>>,
) -> Result<Json<cruise_sql::maintenance::RawStorageStats>, ApiError> {
    let stats = maintenance::storage_stats(&app.orchestrator.db).await?;
    Ok(Json(stats))
}

pub async fn handle_get_cache_stats(State(app): State<Arc<App>>) -> Json<crate::cache::CacheStats> {
    Json(app.orchestrator.cache.stats())
}

#[derive(Debug, serde::Serialize)]
pub struct CacheClearResponse {
    cleared: bool,
}

pub async fn handle_post_cache_clear(State(app): State<Arc<App>>) -> Json<CacheClearResponse> {
    app.orchestrator.cache.clear();
    Json(CacheClearResponse { cleared: true })
}

#[derive(Debug, Deserialize)]
pub struct DaysBufferQuery {
    #[serde(rename = "daysBuffer")]
    days_buffer: Option<i64>,
}

pub async fn handle_get_cleanup_preview(
    State(app): State<Arc<App>>,
    Query(query): Query<DaysBufferQuery>,
) -> Result<Json<maintenance::CleanupPreview>, ApiError> {
    let preview =
        maintenance::preview_cleanup(&app.orchestrator.db, query.days_buffer.unwrap_or(0)).await?;
    Ok(Json(preview))
}

#[derive(Debug, Deserialize)]
pub struct CleanupRequest {
    #[serde(rename = "daysBuffer")]
    days_buffer: Option<i64>,
}

pub async fn handle_post_cleanup(
    State(app): State<Arc<App>>,
    Json(body): Json<CleanupRequest>,
) -> Result<Json<maintenance::CleanupReport>, ApiError> {
    let report =
        maintenance::cleanup_past_sailings(&app.orchestrator.db, body.days_buffer.unwrap_or(0))
            .await?;
    Ok(Json(report))
}

pub async fn handle_get_stubs_report(
    State(app): State<Arc<App>>,
) -> Result<Json<maintenance::StubReport>, ApiError> {
    let report = maintenance::stub_report(&app.orchestrator.db).await?;
    Ok(Json(report))
}

pub async fn handle_get_coverage_stats(
    State(app): State<Arc<App>>,
) -> Result<Json<maintenance::CoverageReport>, ApiError> {
    let report = maintenance::coverage_report(&app.orchestrator.db).await?;
    Ok(Json(report))
}
