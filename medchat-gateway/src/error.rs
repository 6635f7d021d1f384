//! Mapping from the client error taxonomy to HTTP responses.

use std::any::Any;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use medchat_core::{ClientError, Operation, ValidationKind};
use serde::Serialize;
use serde_json::json;
use tracing::{error, warn};

/// `{error, message}` body used for validation and upstream failures.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

/// A handler failure. Never carries raw transport errors.
#[derive(Debug)]
pub struct ApiError(pub ClientError);

impl From<ClientError> for ApiError {
    fn from(err: ClientError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            ClientError::ValidationFailure {
                kind: ValidationKind::TooLarge,
                ..
            } => StatusCode::PAYLOAD_TOO_LARGE,
            ClientError::ValidationFailure { .. } => StatusCode::BAD_REQUEST,
            ClientError::UpstreamUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ClientError::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            ClientError::UpstreamError { .. } => StatusCode::BAD_GATEWAY,
        }
    }
}

fn failure_title(operation: Operation) -> &'static str {
    match operation {
        Operation::ListPatients => "Failed to fetch patients",
        Operation::Chat => "Failed to process chat request",
        Operation::GenerateReport => "Failed to generate report",
        Operation::UploadDocuments => "Failed to upload documents",
        Operation::HealthCheck => "Health check failed",
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self.0 {
            ClientError::ValidationFailure {
                title,
                field,
                message,
                ..
            } => {
                warn!(field, %message, "Rejected invalid request");
                ErrorBody {
                    error: title.clone(),
                    message: message.clone(),
                }
            }
            ClientError::UpstreamUnavailable { operation, .. }
            | ClientError::UpstreamTimeout { operation, .. }
            | ClientError::UpstreamError { operation, .. } => {
                error!(%operation, status = status.as_u16(), error = %self.0, "Upstream failure");
                ErrorBody {
                    error: failure_title(*operation).to_string(),
                    message: self.0.to_string(),
                }
            }
        };

        (status, Json(body)).into_response()
    }
}

/// Renders a handler panic as `{error: {message, timestamp}}`.
pub fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    error!(%detail, "Handler panicked");

    let body = json!({
        "error": {
            "message": "Internal server error",
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }
    });
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use std::time::Duration;

    async fn body_json(response: Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), 64 * 1024).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn missing_field_is_400_with_field_message() {
        let response = ApiError(ClientError::missing_field("patient_id")).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            json!({ "error": "Missing required field", "message": "patient_id is required" })
        );
    }

    #[tokio::test]
    async fn oversize_file_is_413() {
        let response = ApiError(ClientError::too_large("files", "too big")).into_response();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn upstream_kinds_map_to_distinct_statuses() {
        let unavailable = ApiError(ClientError::UpstreamUnavailable {
            operation: Operation::ListPatients,
            reason: "connection refused".to_string(),
        });
        assert_eq!(unavailable.status(), StatusCode::SERVICE_UNAVAILABLE);

        let timeout = ApiError(ClientError::UpstreamTimeout {
            operation: Operation::GenerateReport,
            budget: Duration::from_secs(200),
        });
        assert_eq!(timeout.status(), StatusCode::GATEWAY_TIMEOUT);
        let json = body_json(timeout.into_response()).await;
        assert_eq!(json["error"], "Failed to generate report");
        assert!(json["message"].as_str().unwrap().contains("200s"));

        let failed = ApiError(ClientError::UpstreamError {
            operation: Operation::Chat,
            status: Some(500),
            detail: "model not loaded".to_string(),
        });
        assert_eq!(failed.status(), StatusCode::BAD_GATEWAY);
        let json = body_json(failed.into_response()).await;
        assert!(json["message"].as_str().unwrap().contains("model not loaded"));
    }

    #[tokio::test]
    async fn panic_body_hides_details() {
        let response = handle_panic(Box::new("index out of bounds".to_string()));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert_eq!(json["error"]["message"], "Internal server error");
        assert!(json["error"]["timestamp"].is_string());
    }
}
