//! `ApiError`: an HTTP status paired with an `anyhow::Error`, returned from
//! every handler as `Result<Json<T>, ApiError>` (§6.3).

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
#[error("status: {status}, error: {error}")]
pub struct ApiError {
    pub status: StatusCode,
    pub error: anyhow::Error,
}

impl ApiError {
    pub fn new(status: StatusCode, error: anyhow::Error) -> Self {
        ApiError { status, error }
    }

    pub fn with_status(self, status: StatusCode) -> Self {
        ApiError { status, ..self }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let body = ErrorBody {
            error: format!("{:#}", self.error),
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(error: sqlx::Error) -> Self {
        tracing::error!(?error, "API responding with database error");
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, anyhow::anyhow!("database error, please retry the request"))
    }
}

impl From<crate::orchestrator::OrchestratorError> for ApiError {
    fn from(error: crate::orchestrator::OrchestratorError) -> Self {
        use crate::orchestrator::OrchestratorError::*;
        let status = match error {
            Busy => StatusCode::CONFLICT,
            EnvironmentGuard => StatusCode::FORBIDDEN,
            LockUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Ftp(_) => StatusCode::BAD_GATEWAY,
        };
        ApiError::new(status, anyhow::Error::new(error))
    }
}

impl From<crate::maintenance::MaintenanceError> for ApiError {
    fn from(error: crate::maintenance::MaintenanceError) -> Self {
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, anyhow::Error::new(error))
    }
}

impl From<crate::ftp::FtpError> for ApiError {
    fn from(error: crate::ftp::FtpError) -> Self {
        ApiError::new(StatusCode::BAD_GATEWAY, anyhow::Error::new(error))
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, error)
    }
}
