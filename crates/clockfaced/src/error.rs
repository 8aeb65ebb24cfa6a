use axum::extract::multipart::MultipartError;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use clockface_core::{ExtractError, FaceAuthError};
use clockface_store::StoreError;
use serde_json::json;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("an image file is required")]
    MissingImage,

    #[error("{0} not found")]
    NotFound(String),

    #[error("face not recognised")]
    NoFaceMatch,

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::MissingImage => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) | ApiError::NoFaceMatch => StatusCode::NOT_FOUND,
            ApiError::Extract(e) => match e {
                ExtractError::InvalidImage(_) | ExtractError::NoFaceDetected => StatusCode::BAD_REQUEST,
                ExtractError::ModelUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                ExtractError::Model(_)
                | ExtractError::UnexpectedDimension { .. }
                | ExtractError::InvalidEmbedding(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Store(e) => match e {
                StoreError::NotFound(_) => StatusCode::NOT_FOUND,
                StoreError::Invalid(_) | StoreError::AlreadyCompleted(_) | StoreError::InUse(_) => {
                    StatusCode::BAD_REQUEST
                }
                StoreError::Conflict(_) => StatusCode::CONFLICT,
                StoreError::Database(_) | StoreError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::MissingImage => "MISSING_IMAGE",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::NoFaceMatch => "NO_FACE_MATCH",
            ApiError::Extract(e) => match e {
                ExtractError::InvalidImage(_) => "INVALID_IMAGE",
                ExtractError::NoFaceDetected => "NO_FACE_DETECTED",
                ExtractError::ModelUnavailable(_) => "MODEL_UNAVAILABLE",
                _ => "MODEL_ERROR",
            },
            ApiError::Store(e) => match e {
                StoreError::NotFound(_) => "NOT_FOUND",
                StoreError::Invalid(_) => "VALIDATION_ERROR",
                StoreError::AlreadyCompleted(_) => "ALREADY_COMPLETED",
                StoreError::Conflict(_) => "CONFLICT",
                StoreError::InUse(_) => "IN_USE",
                StoreError::Database(_) | StoreError::Io(_) => "STORAGE_ERROR",
            },
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<FaceAuthError> for ApiError {
    fn from(err: FaceAuthError) -> Self {
        match err {
            FaceAuthError::UnknownEmployee(id) => ApiError::NotFound(format!("employee {id}")),
            FaceAuthError::Extract(e) => ApiError::Extract(e),
            FaceAuthError::Match(e) => ApiError::Internal(e.to_string()),
            FaceAuthError::Directory(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(err: JsonRejection) -> Self {
        ApiError::BadRequest(err.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::BadRequest(format!("malformed multipart body: {}", err.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "request rejected");
        }

        let body = Json(json!({
            "error": {
                "code": self.error_code(),
                "message": self.to_string(),
            }
        }));
        (status, body).into_response()
    }
}
