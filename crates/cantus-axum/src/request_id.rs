//! Request identity middleware.
//!
//! Stamps every inbound request with a fresh UUID-shaped id, exposes it
//! to handlers as an extension, echoes it in the `X-Request-ID` response
//! header, and splices a `request_id` field into JSON error bodies so
//! every failure is correlatable from the client side.

use axum::body::Body;
use axum::extract::Request;
use axum::http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use axum::middleware::Next;
use axum::response::Response;
use http_body_util::BodyExt;
use tracing::Instrument;
use uuid::Uuid;

pub static X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Correlation id for one inbound request.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

impl RequestId {
    fn fresh() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Wrap a request with identity: assign, propagate, echo.
pub async fn stamp_request_id(mut request: Request, next: Next) -> Response {
    let request_id = RequestId::fresh();
    request.extensions_mut().insert(request_id.clone());

    let span = tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %request.method(),
        path = %request.uri().path()
    );

    async move {
        let mut response = next.run(request).await;

        if response.status().is_client_error() || response.status().is_server_error() {
            response = inject_into_error_body(response, &request_id).await;
        }

        if let Ok(value) = HeaderValue::from_str(&request_id.0) {
            response.headers_mut().insert(X_REQUEST_ID.clone(), value);
        }
        response
    }
    .instrument(span)
    .await
}

/// Rewrite a JSON error body to include `request_id`.
///
/// Error bodies are small; buffering them here keeps every handler free
/// of id plumbing. Non-JSON error responses (e.g. a 413 from the body
/// limit layer) pass through untouched.
async fn inject_into_error_body(response: Response, request_id: &RequestId) -> Response {
    let is_json = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"));
    if !is_json {
        return response;
    }

    let (parts, body) = response.into_parts();
    let Ok(collected) = body.collect().await else {
        return Response::from_parts(parts, Body::empty());
    };
    let bytes = collected.to_bytes();

    let rewritten = match serde_json::from_slice::<serde_json::Value>(&bytes) {
        Ok(serde_json::Value::Object(mut map)) => {
            map.insert(
                "request_id".to_string(),
                serde_json::Value::String(request_id.0.clone()),
            );
            serde_json::to_vec(&serde_json::Value::Object(map)).unwrap_or_else(|_| bytes.to_vec())
        }
        _ => bytes.to_vec(),
    };

    let mut parts = parts;
    parts.headers.remove(axum::http::header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(rewritten))
}
