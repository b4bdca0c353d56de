//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::{DomainError, NormalizeError, SignatureError};
use fanout::{PublishError, SecretsError};
use order_store::StoreError;
use thiserror::Error;

/// Errors raised while ingesting a webhook.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// No signature header on the request.
    #[error("Missing signature header")]
    MissingSignature,

    /// The signature header failed verification.
    #[error("Invalid signature: {0}")]
    Signature(#[from] SignatureError),

    /// The verified body is not a valid provider envelope.
    #[error("Invalid payload: {0}")]
    InvalidBody(#[from] serde_json::Error),

    /// The provider payload lacks a required field.
    #[error("Unprocessable event: {0}")]
    Normalize(#[from] NormalizeError),

    /// Secrets could not be fetched.
    #[error("Secrets unavailable: {0}")]
    Secrets(#[from] SecretsError),

    /// The canonical event could not be published.
    #[error("Publish failed: {0}")]
    Publish(#[from] PublishError),
}

impl WebhookError {
    pub fn status(&self) -> StatusCode {
        match self {
            WebhookError::MissingSignature | WebhookError::InvalidBody(_) => {
                StatusCode::BAD_REQUEST
            }
            WebhookError::Signature(_) => StatusCode::UNAUTHORIZED,
            WebhookError::Normalize(_) => StatusCode::UNPROCESSABLE_ENTITY,
            WebhookError::Secrets(_) | WebhookError::Publish(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Label used on the `webhooks_received` counter.
    pub fn outcome(&self) -> &'static str {
        match self {
            WebhookError::MissingSignature => "missing_signature",
            WebhookError::Signature(_) => "invalid_signature",
            WebhookError::InvalidBody(_) => "invalid_body",
            WebhookError::Normalize(_) => "unprocessable",
            WebhookError::Secrets(_) => "secrets_unavailable",
            WebhookError::Publish(_) => "publish_failed",
        }
    }
}

impl From<DomainError> for WebhookError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Signature(e) => WebhookError::Signature(e),
            DomainError::InvalidBody(e) => WebhookError::InvalidBody(e),
            DomainError::Normalize(e) => WebhookError::Normalize(e),
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "webhook processing failed");
            "Internal server error".to_string()
        } else {
            tracing::warn!(error = %self, status = status.as_u16(), "webhook rejected");
            self.to_string()
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

/// Errors from the read endpoints.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found.
    #[error("{0}")]
    NotFound(String),

    /// The order store failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Store(err) => {
                tracing::error!(error = %err, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(WebhookError::MissingSignature.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            WebhookError::Signature(SignatureError::Mismatch).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            WebhookError::Secrets(SecretsError::NotFound("x".to_string())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );

        let bad_json = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = WebhookError::from(DomainError::InvalidBody(bad_json));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
