use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use parley_shared::types::{MessageId, UserId};
use parley_store::StoreError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("User not found: {0}")]
    UserNotFound(UserId),

    #[error("Message not found or not authorized: {0}")]
    MessageNotFound(MessageId),

    #[error("Blob not found: {0}")]
    BlobNotFound(Uuid),

    #[error("Blob too large: {size} bytes (max {max})")]
    BlobTooLarge { size: usize, max: usize },

    #[error("Blob storage error: {0}")]
    BlobStorage(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Storage did not answer in time")]
    StorageTimeout,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for ServerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(what) => ServerError::BadRequest(format!("Duplicate {what}")),
            other => ServerError::Storage(other.to_string()),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ServerError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, self.to_string()),
            ServerError::UserNotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ServerError::MessageNotFound(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ServerError::BlobNotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ServerError::BlobTooLarge { .. } => {
                (StatusCode::PAYLOAD_TOO_LARGE, self.to_string())
            }
            ServerError::BlobStorage(_) => {
                tracing::error!(error = %self, "Blob storage failure");
                (StatusCode::INTERNAL_SERVER_ERROR, "Blob storage error".to_string())
            }
            ServerError::Storage(_) => {
                tracing::error!(error = %self, "Storage failure");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            ServerError::StorageTimeout => {
                tracing::error!("Storage call timed out");
                (StatusCode::GATEWAY_TIMEOUT, self.to_string())
            }
            ServerError::Internal(_) => {
                tracing::error!(error = %self, "Internal failure");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}
