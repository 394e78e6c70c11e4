//! One structured log event per request.

use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use futures::FutureExt;
use http::{Method, StatusCode};

use super::{Middleware, Next};
use crate::handler::BoxFuture;
use crate::request::Request;

/// Emits `http_access` once per request.
///
/// Normally the event follows the downstream's answer and records the status
/// on the response it returned, which is `200` unless the handler chose
/// another. The response itself is passed up untouched.
///
/// A downstream panic is logged with `500` and `cancelled = true`, then keeps
/// unwinding to the recovery stage. A future dropped before it answers (the
/// timeout stage above gave up) logs `504` and `cancelled = true` on drop.
pub struct AccessLog;

impl Middleware for AccessLog {
    fn handle(&self, req: Request, next: Next) -> BoxFuture {
        let mut entry = Entry {
            method: req.method().clone(),
            path: req.path().to_owned(),
            request_id: req.context().request_id().to_owned(),
            start: Instant::now(),
            logged: false,
        };

        Box::pin(async move {
            match AssertUnwindSafe(next.run(req)).catch_unwind().await {
                Ok(res) => {
                    entry.emit(res.status(), false);
                    res
                }
                Err(payload) => {
                    entry.emit(StatusCode::INTERNAL_SERVER_ERROR, true);
                    panic::resume_unwind(payload)
                }
            }
        })
    }
}

struct Entry {
    method: Method,
    path: String,
    request_id: String,
    start: Instant,
    logged: bool,
}

impl Entry {
    fn emit(&mut self, status: StatusCode, cancelled: bool) {
        if self.logged {
            return;
        }
        self.logged = true;
        let duration_ms = self.start.elapsed().as_millis() as u64;
        if cancelled {
            tracing::info!(
                method = %self.method,
                path = %self.path,
                status = status.as_u16(),
                duration_ms,
                request_id = %self.request_id,
                cancelled = true,
                "http_access"
            );
        } else {
            tracing::info!(
                method = %self.method,
                path = %self.path,
                status = status.as_u16(),
                duration_ms,
                request_id = %self.request_id,
                "http_access"
            );
        }
    }
}

impl Drop for Entry {
    fn drop(&mut self) {
        self.emit(StatusCode::GATEWAY_TIMEOUT, true);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::handler::Handler;
    use crate::middleware::testing::{Capture, get, single};
    use crate::middleware::{Pipeline, Recovery, Timeout};
    use crate::response::Response;

    #[tokio::test]
    async fn records_handler_status_and_passes_it_through() {
        let capture = Capture::default();
        let _guard = capture.install();

        let pipeline = single(AccessLog, |_req: Request| async {
            Response::builder().status(StatusCode::IM_A_TEAPOT).text("hi")
        });
        let res = pipeline.handle(get("/tea")).await;

        assert_eq!(res.status(), StatusCode::IM_A_TEAPOT);
        assert_eq!(res.body(), b"hi");

        let events = capture.events();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.level, "INFO");
        assert_eq!(event.field("message"), Some("http_access"));
        assert_eq!(event.field("status"), Some("418"));
        assert_eq!(event.field("method"), Some("GET"));
        assert_eq!(event.field("path"), Some("/tea"));
        assert!(event.field("duration_ms").is_some());
        assert!(event.field("request_id").is_some());
    }

    #[tokio::test]
    async fn defaults_to_ok_when_handler_sets_no_status() {
        let capture = Capture::default();
        let _guard = capture.install();

        single(AccessLog, |_req: Request| async { "plain" })
            .handle(get("/"))
            .await;

        assert_eq!(capture.events()[0].field("status"), Some("200"));
    }

    fn access_events(capture: &Capture) -> Vec<crate::middleware::testing::Captured> {
        capture
            .events()
            .into_iter()
            .filter(|e| e.field("message") == Some("http_access"))
            .collect()
    }

    #[tokio::test]
    async fn timed_out_request_is_logged_once() {
        let capture = Capture::default();
        let _guard = capture.install();

        let pipeline = Pipeline::from_parts(
            vec![Arc::new(Timeout::new(Duration::from_millis(20))), Arc::new(AccessLog)],
            Handler::into_boxed_handler(|_req: Request| async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Response::text("late")
            }),
        );
        let res = pipeline.handle(get("/slow")).await;
        assert_eq!(res.status(), StatusCode::GATEWAY_TIMEOUT);

        let events = access_events(&capture);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].field("status"), Some("504"));
        assert_eq!(events[0].field("cancelled"), Some("true"));
        assert_eq!(events[0].field("path"), Some("/slow"));
    }

    async fn explode(_req: Request) -> Response {
        panic!("boom")
    }

    #[tokio::test]
    async fn panicking_request_is_logged_once() {
        let capture = Capture::default();
        let _guard = capture.install();

        let pipeline = Pipeline::from_parts(
            vec![Arc::new(Recovery::new()), Arc::new(AccessLog)],
            Handler::into_boxed_handler(explode),
        );
        let res = pipeline.handle(get("/panic")).await;
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let events = access_events(&capture);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].field("status"), Some("500"));
    }

    #[tokio::test]
    async fn answered_request_is_not_marked_cancelled() {
        let capture = Capture::default();
        let _guard = capture.install();

        single(AccessLog, |_req: Request| async { "plain" })
            .handle(get("/"))
            .await;

        let events = access_events(&capture);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].field("cancelled"), None);
    }
}
