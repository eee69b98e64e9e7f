use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Error)]
pub enum StylistError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("{0}")]
    InvalidInput(String),
    #[error("{service} request failed: {message}")]
    Upstream { service: &'static str, message: String },
    #[error("malformed {stage} response: {message}")]
    MalformedResponse { stage: &'static str, message: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StylistError {
    pub fn upstream(service: &'static str, message: impl Into<String>) -> Self {
        Self::Upstream {
            service,
            message: message.into(),
        }
    }

    pub fn malformed(stage: &'static str, message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            stage,
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::Upstream { .. } | Self::MalformedResponse { .. } => StatusCode::BAD_GATEWAY,
            Self::Config(_) | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type StylistResult<T> = Result<T, StylistError>;

/// HTTP-facing wrapper; renders as `{"error": "..."}`.
#[derive(Debug)]
pub struct ApiError(pub StylistError);

impl From<StylistError> for ApiError {
    fn from(err: StylistError) -> Self {
        Self(err)
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        Self(StylistError::Io(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.0.status_code();
        if status.is_server_error() {
            error!("Request failed with {}: {}", status, self.0);
        } else {
            warn!("Request rejected with {}: {}", status, self.0);
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_errors_to_status_codes() {
        assert_eq!(
            StylistError::InvalidInput("no images".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            StylistError::upstream("openai", "boom").status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            StylistError::malformed("profile", "not json").status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            StylistError::Config("OPENAI_API_KEY is not configured.".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn messages_name_the_failing_service() {
        let err = StylistError::upstream("serpapi", "status 401: Invalid API key");
        assert_eq!(err.to_string(), "serpapi request failed: status 401: Invalid API key");
    }
}
