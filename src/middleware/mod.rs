//! Middleware pipeline.
//!
//! Cross-cutting behavior lives in stages that implement [`Middleware`]. A
//! stage receives the request and a [`Next`] handle; it may answer on its own
//! (short-circuit) or call `next.run(req)` and adjust what comes back.
//!
//! The service uses one fixed chain, outermost first:
//!
//! ```text
//! RequestId → Recovery → Timeout → Cors → AccessLog → Router
//! ```
//!
//! - request id first, so everything below (including the recovery and
//!   timeout envelopes) can be tagged with the correlation id;
//! - recovery around everything else, so no panic escapes unlogged;
//! - timeout bounds CORS handling and routing;
//! - CORS before routing, so preflights never reach a handler;
//! - access log innermost, so it sees real handler latency and status.
//!
//! The order is not configurable. [`Pipeline::new`] is the only public way to
//! assemble one.

mod access_log;
mod cors;
mod recovery;
pub(crate) mod request_id;
pub mod timeout;

use std::sync::Arc;
use std::time::Duration;

use crate::error::Error;
use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler};
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;

pub use access_log::AccessLog;
pub use cors::{Cors, CorsConfig};
pub use recovery::Recovery;
pub use request_id::{RequestId, X_REQUEST_ID};
pub use timeout::Timeout;

/// One stage of the pipeline.
///
/// `handle` returns a `'static` future, so a stage clones whatever it needs
/// from `self` into the future. Stage state is immutable and cheap to clone.
pub trait Middleware: Send + Sync + 'static {
    fn handle(&self, req: Request, next: Next) -> BoxFuture;
}

/// The remainder of the chain below the current stage.
pub struct Next {
    stages: Arc<[Arc<dyn Middleware>]>,
    endpoint: BoxedHandler,
    index: usize,
}

impl Next {
    /// Runs the next stage, or the endpoint once every stage has run.
    pub fn run(self, req: Request) -> BoxFuture {
        let Some(stage) = self.stages.get(self.index).cloned() else {
            return self.endpoint.call(req);
        };
        let next = Next { index: self.index + 1, ..self };
        stage.handle(req, next)
    }
}

/// Settings the pipeline needs, validated by the caller beforehand.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub request_timeout: Duration,
    pub cors: CorsConfig,
}

/// The assembled request pipeline.
#[derive(Clone)]
pub struct Pipeline {
    stages: Arc<[Arc<dyn Middleware>]>,
    endpoint: BoxedHandler,
}

impl Pipeline {
    /// Builds the fixed chain in front of `router`.
    ///
    /// Fails only if a CORS allow-list cannot be expressed as a header value.
    pub fn new(config: &PipelineConfig, router: Router) -> Result<Self, Error> {
        let stages: Vec<Arc<dyn Middleware>> = vec![
            Arc::new(RequestId),
            Arc::new(Recovery::new()),
            Arc::new(Timeout::new(config.request_timeout)),
            Arc::new(Cors::new(&config.cors)?),
            Arc::new(AccessLog),
        ];
        Ok(Self::from_parts(stages, Arc::new(router)))
    }

    pub(crate) fn from_parts(stages: Vec<Arc<dyn Middleware>>, endpoint: BoxedHandler) -> Self {
        Self { stages: stages.into(), endpoint }
    }

    /// Runs one request through every stage and returns its only response.
    pub async fn handle(&self, req: Request) -> Response {
        let next = Next {
            stages: Arc::clone(&self.stages),
            endpoint: Arc::clone(&self.endpoint),
            index: 0,
        };
        next.run(req).await
    }
}


#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::testing::get;
    use super::*;

    struct Tag(&'static str, Arc<Mutex<Vec<&'static str>>>);

    impl Middleware for Tag {
        fn handle(&self, req: Request, next: Next) -> BoxFuture {
            let (name, seen) = (self.0, Arc::clone(&self.1));
            Box::pin(async move {
                seen.lock().unwrap().push(name);
                next.run(req).await
            })
        }
    }

    #[tokio::test]
    async fn stages_run_in_declared_order_before_endpoint() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let endpoint_seen = Arc::clone(&seen);
        let endpoint = move |_req: Request| {
            let seen = Arc::clone(&endpoint_seen);
            async move {
                seen.lock().unwrap().push("endpoint");
                Response::text("ok")
            }
        };
        let pipeline = Pipeline::from_parts(
            vec![
                Arc::new(Tag("outer", Arc::clone(&seen))),
                Arc::new(Tag("inner", Arc::clone(&seen))),
            ],
            crate::handler::Handler::into_boxed_handler(endpoint),
        );

        pipeline.handle(get("/")).await;

        assert_eq!(*seen.lock().unwrap(), vec!["outer", "inner", "endpoint"]);
    }
}
