use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use solar_core::{SiteId, StoreError};

pub type Result<T> = std::result::Result<T, ApiError>;

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("invalid day '{0}', expected YYYY-MM-DD")]
    InvalidDay(String),
    #[error("invalid instant '{0}', expected RFC 3339")]
    InvalidInstant(String),
    #[error("no stats for site {site} on {day}")]
    StatsNotFound { site: SiteId, day: String },
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Store(StoreError::UnknownSite(_)) | ApiError::StatsNotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Store(StoreError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::InvalidDay(_) | ApiError::InvalidInstant(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request refused");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
