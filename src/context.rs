//! Per-request context.
//!
//! Every [`Request`](crate::Request) carries one [`RequestContext`]. Stages of
//! the pipeline never mutate it in place: they derive a new context with one
//! of the `with_*` builders and hand that to the next stage. Handlers only
//! read it.

use tokio::time::Instant;

/// Typed request-scope values shared by every stage and handler.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    request_id: Option<String>,
    trace_id: Option<String>,
    deadline: Option<Instant>,
}

impl RequestContext {
    /// Correlation id assigned by the request-id stage, or `""` before it ran.
    pub fn request_id(&self) -> &str {
        self.request_id.as_deref().unwrap_or_default()
    }

    /// W3C trace id taken from an inbound `traceparent` header, or `""`.
    pub fn trace_id(&self) -> &str {
        self.trace_id.as_deref().unwrap_or_default()
    }

    /// Instant after which the timeout stage gives up on this request.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// True once the deadline has passed. Handlers should stop work early.
    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    pub fn with_request_id(self, id: impl Into<String>) -> Self {
        Self { request_id: Some(id.into()), ..self }
    }

    pub fn with_trace_id(self, id: impl Into<String>) -> Self {
        Self { trace_id: Some(id.into()), ..self }
    }

    /// Attaches a deadline. An earlier existing deadline is kept.
    pub fn with_deadline(self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(current) if current < deadline => current,
            _ => deadline,
        };
        Self { deadline: Some(deadline), ..self }
    }
}
