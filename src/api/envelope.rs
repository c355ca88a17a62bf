//! Error envelope for all API endpoints.
//!
//! Every failure is returned as `{ "Error": "<message>" }` with the matching
//! status code. Request-level engine failures carry a `Bad Request:` line
//! ahead of the engine message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::engine::RequestError;

/// Prefix for request-level validation failures.
pub const BAD_REQUEST_PREFIX: &str = "Bad Request:\n";

/// Error body: `{ "Error": "..." }`
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    #[serde(rename = "Error")]
    pub error: String,
}

/// Failed API call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    fn build(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::build(StatusCode::BAD_REQUEST, msg)
    }

    pub fn unsupported_media_type() -> Self {
        Self::build(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "Content-Type must be \"application/json\"",
        )
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::build(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }
}

impl From<RequestError> for ApiError {
    fn from(e: RequestError) -> Self {
        Self::bad_request(format!("{BAD_REQUEST_PREFIX}{e}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.message,
        };
        (self.status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_request_error_shape() {
        let resp = ApiError::from(RequestError::NotJson).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let v = body_json(resp).await;
        assert_eq!(v["Error"], "Bad Request:\nRequest is not valid JSON");
    }

    #[tokio::test]
    async fn test_unsupported_media_type_shape() {
        let resp = ApiError::unsupported_media_type().into_response();
        assert_eq!(resp.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        let v = body_json(resp).await;
        assert_eq!(v, serde_json::json!({ "Error": "Content-Type must be \"application/json\"" }));
    }
}
