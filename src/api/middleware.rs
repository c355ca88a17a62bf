//! API middleware layers.
//!
//! - [`require_json`]: calculation POSTs must declare a JSON body
//! - [`no_store`]: results depend on the request body only, never cache them

use axum::extract::Request;
use axum::http::{header, HeaderMap, HeaderValue, Method};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::debug;

use super::envelope::ApiError;

/// True when `Content-Type` mentions `application/json` (parameters such as
/// `charset` are allowed).
pub fn is_json_content_type(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("application/json"))
}

/// Reject POSTs without a JSON content type with 415.
///
/// Other methods pass through so the router can answer 405 for them.
pub async fn require_json(request: Request, next: Next) -> Response {
    if request.method() == Method::POST && !is_json_content_type(request.headers()) {
        debug!(path = %request.uri().path(), "Rejected non-JSON calculation request");
        return ApiError::unsupported_media_type().into_response();
    }
    next.run(request).await
}

/// Mark every response `Cache-Control: no-store`.
pub async fn no_store(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}
