//! The control-plane error taxonomy (spec §7) mapped onto HTTP statuses.

use agentdeck_container::ContainerError;
use agentdeck_core::ConfigError;
use agentdeck_session::SessionError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("host error: {0}")]
    HostError(String),

    #[error("worker error: {0}")]
    WorkerError(String),
}

impl From<ConfigError> for ApiError {
    fn from(e: ConfigError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl From<ContainerError> for ApiError {
    fn from(e: ContainerError) -> Self {
        match e {
            ContainerError::Config(inner) => ApiError::BadRequest(inner.to_string()),
            ContainerError::UnknownAgent(id) => ApiError::NotFound(format!("unknown agent: {id}")),
            ContainerError::MissingContainer(id) => {
                ApiError::Conflict(format!("agent {id} has no running container and no api key was supplied"))
            }
            ContainerError::MissingConfig(id) => {
                ApiError::Conflict(format!("agent {id} has no surviving on-disk config"))
            }
            other => ApiError::HostError(other.to_string()),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::UnknownSession(id) => ApiError::NotFound(format!("unknown session: {id}")),
            SessionError::Container(inner) => inner.into(),
            other => ApiError::HostError(other.to_string()),
        }
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::HostError(_) => StatusCode::BAD_GATEWAY,
            ApiError::WorkerError(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if !matches!(status, StatusCode::BAD_GATEWAY) {
            tracing::warn!(error = %self, status = %status, "request failed");
        } else {
            tracing::error!(error = %self, "host or worker failure");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
