//! Request middleware: trace id propagation and caller identity.

use axum::body::Body;
use axum::http::header::HeaderName;
use axum::http::{HeaderMap, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;
use sentinel_core::trace;
use sentinel_resilience::rate_limit::ANONYMOUS_CALLER;

/// Header carrying the trace id in both directions.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Header carrying the acting user for org commands.
pub const ACTOR_ID_HEADER: &str = "x-actor-id";

const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Installs the request's trace id (or a fresh one) as the ambient trace id
/// for the handler, and echoes it in the response.
pub async fn trace_id_middleware(req: Request<Body>, next: Next) -> Response {
    let trace_id =
        header_string(req.headers(), REQUEST_ID_HEADER).unwrap_or_else(trace::new_trace_id);

    let mut response = trace::scope(trace_id.clone(), next.run(req)).await;

    if let Ok(value) = HeaderValue::from_str(&trace_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    response
}

/// Rate-limit key for a request: the first `x-forwarded-for` hop, or
/// [`ANONYMOUS_CALLER`].
#[must_use]
pub fn caller_key(headers: &HeaderMap) -> String {
    header_string(headers, FORWARDED_FOR_HEADER)
        .and_then(|raw| {
            raw.split(',')
                .map(str::trim)
                .find(|hop| !hop.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| ANONYMOUS_CALLER.to_string())
}

/// The acting user, if the request names one.
#[must_use]
pub fn actor_id(headers: &HeaderMap) -> Option<String> {
    header_string(headers, ACTOR_ID_HEADER)
}
