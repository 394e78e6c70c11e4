//! Correlation id stage.

use http::HeaderMap;
use http::header::{HeaderName, HeaderValue};
use tracing::Instrument;
use uuid::Uuid;

use super::{Middleware, Next};
use crate::handler::BoxFuture;
use crate::request::Request;

/// Header carrying the correlation id, both inbound and outbound.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

const TRACEPARENT: &str = "traceparent";

/// Resolves the request's correlation id.
///
/// A non-blank inbound `X-Request-ID` is kept exactly as sent; otherwise a
/// UUID v4 is generated. The id goes into the [`RequestContext`] before the
/// next stage runs and onto the response that comes back, whatever produced
/// it. Everything downstream runs inside a `request` span carrying the id.
///
/// [`RequestContext`]: crate::RequestContext
pub struct RequestId;

impl Middleware for RequestId {
    fn handle(&self, req: Request, next: Next) -> BoxFuture {
        let request_id = resolve(req.headers());
        let trace_id = req.header(TRACEPARENT).and_then(trace_id_from).map(str::to_owned);

        let req = req.map_context(|ctx| {
            let ctx = ctx.with_request_id(request_id.clone());
            match trace_id {
                Some(trace_id) => ctx.with_trace_id(trace_id),
                None => ctx,
            }
        });

        let span = tracing::info_span!("request", request_id = %request_id);
        Box::pin(async move {
            let mut res = next.run(req).instrument(span).await;
            if let Ok(value) = HeaderValue::from_str(&request_id) {
                res.headers_mut().insert(X_REQUEST_ID, value);
            }
            res
        })
    }
}

/// Inbound non-blank `X-Request-ID`, or a fresh UUID v4.
pub(crate) fn resolve(headers: &HeaderMap) -> String {
    headers
        .get(&X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
        .map_or_else(|| Uuid::new_v4().to_string(), str::to_owned)
}

/// Trace id of a W3C `traceparent` header: `00-<32 hex>-<16 hex>-<2 hex>`.
fn trace_id_from(traceparent: &str) -> Option<&str> {
    let mut parts = traceparent.trim().split('-');
    let (version, trace_id, parent_id, flags) =
        (parts.next()?, parts.next()?, parts.next()?, parts.next()?);
    let hex = |s: &str, len: usize| s.len() == len && s.bytes().all(|b| b.is_ascii_hexdigit());
    let valid = hex(version, 2)
        && version != "ff"
        && hex(trace_id, 32)
        && trace_id.bytes().any(|b| b != b'0')
        && hex(parent_id, 16)
        && hex(flags, 2);
    valid.then_some(trace_id)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use bytes::Bytes;

    use super::*;
    use crate::middleware::testing::{get, single};
    use crate::response::Response;

    /// Echoes the context's ids back in the body as `request_id|trace_id`.
    async fn echo_ids(req: Request) -> Response {
        let ctx = req.context();
        Response::text(format!("{}|{}", ctx.request_id(), ctx.trace_id()))
    }

    fn with_header(name: &str, value: &str) -> Request {
        Request::from(http::Request::get("/x").header(name, value).body(Bytes::new()).unwrap())
    }

    #[tokio::test]
    async fn generates_uuid_when_header_missing() {
        let seen = Arc::new(Mutex::new(String::new()));
        let in_handler = Arc::clone(&seen);
        let pipeline = single(RequestId, move |req: Request| {
            let seen = Arc::clone(&in_handler);
            async move {
                *seen.lock().unwrap() = req.context().request_id().to_owned();
                Response::text("ok")
            }
        });

        let res = pipeline.handle(get("/x")).await;

        let header = res.header("x-request-id").unwrap().to_owned();
        assert!(Uuid::parse_str(&header).is_ok(), "not a uuid: {header}");
        assert_eq!(*seen.lock().unwrap(), header);
    }

    #[tokio::test]
    async fn preserves_inbound_id() {
        let res = single(RequestId, echo_ids).handle(with_header("X-Request-ID", "abc-123")).await;
        assert_eq!(res.header("x-request-id"), Some("abc-123"));
        assert_eq!(res.body(), b"abc-123|");
    }

    #[tokio::test]
    async fn blank_inbound_id_is_replaced() {
        let res = single(RequestId, echo_ids).handle(with_header("X-Request-ID", "   ")).await;
        let header = res.header("x-request-id").unwrap();
        assert!(Uuid::parse_str(header).is_ok());
    }

    #[tokio::test]
    async fn overrides_id_set_by_downstream() {
        let pipeline = single(RequestId, |_req: Request| async {
            Response::builder()
                .header(X_REQUEST_ID, HeaderValue::from_static("spoofed"))
                .text("ok")
        });
        let res = pipeline.handle(with_header("X-Request-ID", "real")).await;
        assert_eq!(res.header("x-request-id"), Some("real"));
    }

    #[tokio::test]
    async fn takes_trace_id_from_traceparent() {
        let req = with_header(
            "traceparent",
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
        );
        let res = single(RequestId, echo_ids).handle(req).await;
        let body = std::str::from_utf8(res.body()).unwrap();
        assert!(body.ends_with("|4bf92f3577b34da6a3ce929d0e0e4736"), "{body}");
    }

    #[test]
    fn rejects_malformed_traceparent() {
        assert_eq!(trace_id_from("garbage"), None);
        assert_eq!(trace_id_from("00-0000000000000000000000000000000-00f067aa0ba902b7-01"), None);
        assert_eq!(trace_id_from("00-00000000000000000000000000000000-00f067aa0ba902b7-01"), None);
        assert_eq!(trace_id_from("ff-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01"), None);
    }
}
