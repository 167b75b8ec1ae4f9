use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::error;

use tinyrepo_common::{SpecError, StorageError};

/// Every way a request can fail, mapped onto an HTTP status.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] SpecError),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error(transparent)]
    Storage(StorageError),
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(what) => ApiError::NotFound(format!("not found: {}", what)),
            StorageError::LatestNotResolved(_) => ApiError::BadRequest(e.to_string()),
            other => ApiError::Storage(other),
        }
    }
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Validation(_) | ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            ApiError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if let ApiError::Storage(ref e) = self {
            error!(error = ?e, "Storage operation failed");
        }
        (
            status,
            Json(serde_json::json!({ "error": { "code": code, "message": self.to_string() } })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_mapping() {
        let e: ApiError = StorageError::NotFound("ns/app/1.0.0".into()).into();
        assert_eq!(e.status_and_code().0, StatusCode::NOT_FOUND);

        let e: ApiError = StorageError::Io(std::io::Error::other("disk")).into();
        assert_eq!(e.status_and_code().0, StatusCode::INTERNAL_SERVER_ERROR);

        let e: ApiError = StorageError::LatestNotResolved("upload").into();
        assert_eq!(e.status_and_code().0, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_validation_is_bad_request() {
        let e: ApiError = SpecError::EmptyName.into();
        assert_eq!(e.status_and_code(), (StatusCode::BAD_REQUEST, "bad_request"));
    }
}
