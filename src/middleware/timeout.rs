//! Request deadline.
//!
//! The [`Timeout`] stage bounds everything below it. When the deadline fires
//! first, the downstream future is dropped, so nothing it was about to write
//! can reach the client, and the stage answers with the unified timeout
//! envelope instead.
//!
//! Dropping the future stops the handler at its next `.await`. Work that does
//! not yield (or was moved to the blocking pool) keeps running, so handlers
//! should call [`check`] before anything expensive:
//!
//! ```rust
//! use spike::{Request, Response, envelope};
//! use spike::middleware::timeout;
//!
//! async fn report(req: Request) -> Response {
//!     if let Some(res) = timeout::check(req.context()) {
//!         return res;
//!     }
//!     // ... expensive work ...
//!     envelope::success("done", req.context().request_id(), req.context().trace_id())
//! }
//! ```

use std::time::Duration;

use tokio::time::Instant;

use super::{Middleware, Next};
use crate::context::RequestContext;
use crate::envelope::{self, Code};
use crate::handler::BoxFuture;
use crate::request::Request;
use crate::response::Response;

/// Enforces a maximum processing time per request.
pub struct Timeout {
    duration: Duration,
}

impl Timeout {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

impl Middleware for Timeout {
    fn handle(&self, req: Request, next: Next) -> BoxFuture {
        let duration = self.duration;
        let deadline = Instant::now() + duration;
        let req = req.map_context(|ctx| ctx.with_deadline(deadline));
        let ctx = req.context().clone();

        Box::pin(async move {
            match tokio::time::timeout_at(deadline, next.run(req)).await {
                Ok(res) => res,
                Err(_) => {
                    tracing::warn!(
                        request_id = %ctx.request_id(),
                        timeout_ms = duration.as_millis() as u64,
                        "request timed out"
                    );
                    timed_out(&ctx)
                }
            }
        })
    }
}

/// Returns the unified timeout envelope if `ctx`'s deadline has passed.
///
/// `Some` means the request is already answered: return the response and
/// stop. `None` means there is still time.
pub fn check(ctx: &RequestContext) -> Option<Response> {
    ctx.is_expired().then(|| timed_out(ctx))
}

fn timed_out(ctx: &RequestContext) -> Response {
    envelope::error(
        Code::TIMEOUT.http_status(),
        Code::TIMEOUT,
        "request timeout",
        ctx.request_id(),
        ctx.trace_id(),
    )
}
