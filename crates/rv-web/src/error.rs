//! Error types for rv-web

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rv_core::ValidationError;
use rv_storage::StorageError;
use thiserror::Error;
use tracing::error;

pub type Result<T> = std::result::Result<T, WebError>;

#[derive(Error, Debug)]
pub enum WebError {
    #[error("Server is in read-only mode")]
    ReadOnly,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    /// The job submission API refused the request or could not be reached
    #[error("{0}")]
    Submission(String),

    #[error(transparent)]
    Storage(StorageError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl WebError {
    pub fn status(&self) -> StatusCode {
        match self {
            WebError::ReadOnly | WebError::Forbidden(_) => StatusCode::FORBIDDEN,
            WebError::Validation(_) => StatusCode::BAD_REQUEST,
            WebError::NotFound(_) => StatusCode::NOT_FOUND,
            WebError::Submission(_) => StatusCode::BAD_GATEWAY,
            WebError::Storage(_) | WebError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StorageError> for WebError {
    fn from(e: StorageError) -> Self {
        match e {
            e if e.is_not_found() => WebError::NotFound(e.to_string()),
            e => WebError::Storage(e),
        }
    }
}

impl From<ValidationError> for WebError {
    fn from(e: ValidationError) -> Self {
        WebError::Validation(e.reason)
    }
}

impl From<rv_core::Error> for WebError {
    fn from(e: rv_core::Error) -> Self {
        use rv_core::Error;

        match e {
            Error::Validation(e) => e.into(),
            Error::UnknownVariable(_) | Error::VariableName(_) | Error::UnknownStatus(_) => {
                WebError::Validation(e.to_string())
            }
            e => WebError::Other(e.into()),
        }
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(WebError::ReadOnly.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            WebError::from(ValidationError::new("Run number must be numeric.")).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            WebError::from(StorageError::InstrumentNotFound("MARI".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            WebError::Submission("down".into()).status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_bad_stored_data_is_a_server_error() {
        let err = WebError::from(StorageError::Core(rv_core::Error::UnknownStatus("x".into())));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_validation_message_is_kept() {
        let message = "There must be a run number before and after the hyphen.";
        let err = WebError::from(ValidationError::new(message));
        assert_eq!(err.to_string(), message);
    }
}
