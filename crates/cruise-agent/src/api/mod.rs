//! C7: the control surface. A small JSON API fronting the orchestrator and
//! maintenance jobs for administrators (§4.7, §6.3).

mod error;
mod maintenance;
mod sync;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use error::ApiError;

use crate::orchestrator::Orchestrator;

pub struct App {
    pub orchestrator: Arc<Orchestrator>,
}

/// Builds the full `/cruise-import/*` router (§6.3).
pub fn build_router(orchestrator: Arc<Orchestrator>) -> Router {
    let app = Arc::new(App { orchestrator });

    Router::new()
        .route("/cruise-import/sync", post(sync::handle_post_sync))
        .route("/cruise-import/sync/dry-run", post(sync::handle_post_dry_run))
        .route("/cruise-import/sync/status", get(sync::handle_get_status))
        .route("/cruise-import/sync/history", get(sync::handle_get_history))
        .route("/cruise-import/sync/cancel", post(sync::handle_post_cancel))
        .route("/cruise-import/test-connection", get(sync::handle_get_test_connection))
        .route("/cruise-import/available-years", get(sync::handle_get_available_years))
        .route("/cruise-import/purge", post(maintenance::handle_post_purge))
        .route("/cruise-import/storage-stats", get(maintenance::handle_get_storage_stats))
        .route("/cruise-import/cache-stats", get(maintenance::handle_get_cache_stats))
        .route("/cruise-import/cache/clear", post(maintenance::handle_post_cache_clear))
        .route("/cruise-import/cleanup/preview", get(maintenance::handle_get_cleanup_preview))
        .route("/cruise-import/cleanup", post(maintenance::handle_post_cleanup))
        .route("/cruise-import/stubs-report", get(maintenance::handle_get_stubs_report))
        .route("/cruise-import/coverage-stats", get(maintenance::handle_get_coverage_stats))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app)
}
