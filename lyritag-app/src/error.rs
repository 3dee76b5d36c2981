use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use lyritag_core::CoreError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The feature's provider section is missing or invalid
    #[error("{0} is not configured")]
    Unavailable(&'static str),

    #[error("A tagging run is already in progress")]
    Busy,

    #[error("Entity {0} not found")]
    EntityNotFound(String),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl AppError {
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Core(
                CoreError::InvalidCommand { .. }
                | CoreError::JsonError(_)
                | CoreError::ConfigInvalid { .. }
                | CoreError::ConfigMissingField { .. },
            ) => StatusCode::BAD_REQUEST,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Busy => StatusCode::CONFLICT,
            Self::EntityNotFound(_) => StatusCode::NOT_FOUND,
            Self::Core(_) | Self::Bind { .. } | Self::Io(_) | Self::Task(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}
