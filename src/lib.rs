//! # spike
//!
//! A user registration and login service behind a fixed HTTP middleware
//! pipeline.
//!
//! ## The pipeline
//!
//! Every request walks the same chain, outermost first:
//!
//! ```text
//! RequestId → Recovery → Timeout → Cors → AccessLog → Router
//! ```
//!
//! - **RequestId** keeps or generates `X-Request-ID` and echoes it on every
//!   response.
//! - **Recovery** turns a handler panic into one `500` envelope.
//! - **Timeout** answers `504` once the per-request deadline passes.
//! - **Cors** answers preflights and decorates everything else.
//! - **AccessLog** emits one `http_access` event per request.
//!
//! Every body the service produces is an [`envelope::Envelope`]:
//!
//! ```json
//! {"code":0,"message":"OK","data":{"status":"ok"},"request_id":"…","timestamp":1700000000}
//! ```
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use spike::middleware::{CorsConfig, Pipeline, PipelineConfig};
//! use spike::{Method, Request, Response, Router, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), spike::Error> {
//!     let router = Router::new().on(Method::GET, "/ping", ping);
//!     let config = PipelineConfig {
//!         request_timeout: Duration::from_secs(5),
//!         cors: CorsConfig::default(),
//!     };
//!     let pipeline = Pipeline::new(&config, router)?;
//!     Server::bind(([0, 0, 0, 0], 8080).into()).serve(pipeline).await
//! }
//!
//! async fn ping(req: Request) -> Response {
//!     let ctx = req.context();
//!     spike::envelope::success("pong", ctx.request_id(), ctx.trace_id())
//! }
//! ```

mod context;
mod error;
mod handler;
mod request;
mod response;
mod router;
mod server;

pub mod app;
pub mod config;
pub mod db;
pub mod envelope;
pub mod health;
pub mod middleware;
pub mod telemetry;
pub mod users;

pub use context::RequestContext;
pub use error::Error;
pub use handler::Handler;
pub use http::{Method, StatusCode};
pub use middleware::{Pipeline, PipelineConfig};
pub use request::Request;
pub use response::{IntoResponse, Response, ResponseBuilder};
pub use router::Router;
pub use server::Server;
