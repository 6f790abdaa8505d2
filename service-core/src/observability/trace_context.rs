//! W3C Trace Context propagation for incoming HTTP requests.
//!
//! Upstream callers (the documentation workflow, the reconciliation UI backend)
//! send `traceparent`/`tracestate` headers; this module makes the extracted
//! context the parent of the request span so a bill mutation shows up inside
//! the caller's trace.
//!
//! See: https://www.w3.org/TR/trace-context/

use axum::{extract::Request, http::HeaderMap, middleware::Next, response::Response};
use opentelemetry::propagation::TextMapPropagator;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use tracing::Span;
use tracing_opentelemetry::OpenTelemetrySpanExt;

/// Header name for W3C traceparent
pub const TRACEPARENT_HEADER: &str = "traceparent";

/// Header name for W3C tracestate
pub const TRACESTATE_HEADER: &str = "tracestate";

/// Header name for request correlation ID
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// A text map extractor over HTTP headers.
struct HeaderExtractor<'a>(&'a HeaderMap);

impl opentelemetry::propagation::Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|k| k.as_str()).collect()
    }
}

/// Extract trace context from request headers and set it as the parent of the
/// current span.
pub fn set_parent_from_headers(headers: &HeaderMap) {
    let propagator = TraceContextPropagator::new();
    let context = propagator.extract(&HeaderExtractor(headers));
    Span::current().set_parent(context);
}

/// Axum middleware that links the request span to the caller's trace.
pub async fn trace_context_middleware(req: Request, next: Next) -> Response {
    set_parent_from_headers(req.headers());

    if tracing::enabled!(tracing::Level::DEBUG)
        && let Some(traceparent) = extract_traceparent(req.headers())
    {
        tracing::debug!(traceparent = %traceparent, "HTTP request with trace context");
    }

    next.run(req).await
}

/// Returns the traceparent header value if present.
pub fn extract_traceparent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(TRACEPARENT_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// Extract request ID from incoming request headers.
pub fn extract_request_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::propagation::Extractor;

    #[test]
    fn test_header_extractor_get() {
        let mut headers = HeaderMap::new();
        headers.insert(
            TRACEPARENT_HEADER,
            "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01"
                .parse()
                .unwrap(),
        );

        let extractor = HeaderExtractor(&headers);
        assert_eq!(
            extractor.get("traceparent"),
            Some("00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01")
        );
    }

    #[test]
    fn test_header_extractor_keys() {
        let mut headers = HeaderMap::new();
        headers.insert(TRACEPARENT_HEADER, "value".parse().unwrap());
        headers.insert(TRACESTATE_HEADER, "state".parse().unwrap());

        let extractor = HeaderExtractor(&headers);
        let keys = extractor.keys();
        assert!(keys.contains(&"traceparent"));
        assert!(keys.contains(&"tracestate"));
    }

    #[test]
    fn test_extract_request_id() {
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER, "req-123".parse().unwrap());
        assert_eq!(extract_request_id(&headers), Some("req-123".to_string()));
        assert_eq!(extract_traceparent(&headers), None);
    }
}
