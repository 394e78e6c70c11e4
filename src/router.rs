//! Radix-tree request router.
//!
//! One tree per HTTP method, O(path-length) lookup. The router is the
//! innermost endpoint of the [`Pipeline`](crate::Pipeline); misses are
//! answered with envelope errors so clients always get the same JSON shape.

use std::collections::HashMap;
use std::sync::Arc;

use http::{Method, StatusCode};
use matchit::Router as MatchitRouter;

use crate::envelope::{self, Code};
use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler, Handler};
use crate::request::Request;

/// The application router.
///
/// Build it once at startup and hand it to [`Pipeline::new`](crate::Pipeline::new).
/// Each [`Router::on`] call returns `self` so registrations chain naturally.
pub struct Router {
    routes: HashMap<Method, MatchitRouter<BoxedHandler>>,
}

enum Lookup {
    Found(BoxedHandler, HashMap<String, String>),
    MethodNotAllowed,
    NotFound,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: HashMap::new() }
    }

    /// Register a handler for a method + path pair.
    ///
    /// Path parameters use `{name}` syntax; `req.param("name")` retrieves them.
    ///
    /// # Panics
    ///
    /// Panics if `path` is not a valid route or conflicts with an existing one.
    /// Routes are fixed at startup, so this is a programming error.
    pub fn on(mut self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.routes
            .entry(method)
            .or_default()
            .insert(path, handler.into_boxed_handler())
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    fn lookup(&self, method: &Method, path: &str) -> Lookup {
        if let Some(matched) = self.routes.get(method).and_then(|tree| tree.at(path).ok()) {
            let params = matched.params.iter()
                .map(|(k, v)| (k.to_owned(), v.to_owned()))
                .collect();
            return Lookup::Found(Arc::clone(matched.value), params);
        }

        let other_method = self.routes.iter()
            .any(|(m, tree)| m != method && tree.at(path).is_ok());
        if other_method { Lookup::MethodNotAllowed } else { Lookup::NotFound }
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

impl ErasedHandler for Router {
    fn call(&self, req: Request) -> BoxFuture {
        let (status, message) = match self.lookup(req.method(), req.path()) {
            Lookup::Found(handler, params) => return handler.call(req.with_params(params)),
            Lookup::MethodNotAllowed => (StatusCode::METHOD_NOT_ALLOWED, "method not allowed"),
            Lookup::NotFound => (StatusCode::NOT_FOUND, "not found"),
        };
        let ctx = req.context();
        let res = envelope::error(status, Code::INVALID_PARAM, message, ctx.request_id(), ctx.trace_id());
        Box::pin(async move { res })
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::response::Response;

    fn request(method: Method, uri: &str) -> Request {
        Request::from(
            http::Request::builder().method(method).uri(uri).body(Bytes::new()).unwrap(),
        )
    }

    fn router() -> Router {
        Router::new().on(Method::GET, "/users/{id}", |req: Request| async move {
            Response::text(req.param("id").unwrap_or_default().to_owned())
        })
    }

    #[tokio::test]
    async fn dispatches_with_path_params() {
        let res = router().call(request(Method::GET, "/users/42")).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.body(), b"42");
    }

    #[tokio::test]
    async fn unknown_path_is_404_envelope() {
        let res = router().call(request(Method::GET, "/nope")).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["code"], 10001);
    }

    #[tokio::test]
    async fn wrong_method_is_405() {
        let res = router().call(request(Method::DELETE, "/users/42")).await;
        assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
