//! CORS headers and preflight handling.

use http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    HeaderMap, HeaderValue, VARY,
};
use http::{Method, StatusCode};

use super::{Middleware, Next};
use crate::error::Error;
use crate::handler::BoxFuture;
use crate::request::Request;
use crate::response::Response;

/// All three tokens in one value. Three separate `insert`s would leave only
/// the last one. Tokens the handler already set are kept in front.
const VARY_VALUE: &str = "Origin, Access-Control-Request-Method, Access-Control-Request-Headers";

/// Allow-lists for cross-origin requests.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
}

/// Adds the `Access-Control-Allow-*` and `Vary` headers to every response and
/// answers `OPTIONS` preflights with `204` without calling downstream.
#[derive(Clone, Debug)]
pub struct Cors {
    origins: HeaderValue,
    methods: HeaderValue,
    headers: HeaderValue,
}

impl Cors {
    /// Joins each allow-list into its header value once, up front.
    pub fn new(config: &CorsConfig) -> Result<Self, Error> {
        Ok(Self {
            origins: joined("allowed origins", &config.allowed_origins)?,
            methods: joined("allowed methods", &config.allowed_methods)?,
            headers: joined("allowed headers", &config.allowed_headers)?,
        })
    }

    fn decorate(&self, res: &mut Response) {
        let headers = res.headers_mut();
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, self.origins.clone());
        headers.insert(ACCESS_CONTROL_ALLOW_METHODS, self.methods.clone());
        headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, self.headers.clone());
        let vary = merged_vary(headers);
        headers.insert(VARY, vary);
    }
}

fn merged_vary(headers: &HeaderMap) -> HeaderValue {
    let existing: Vec<&str> = headers
        .get_all(VARY)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .collect();
    if existing.is_empty() {
        return HeaderValue::from_static(VARY_VALUE);
    }
    HeaderValue::from_str(&format!("{}, {VARY_VALUE}", existing.join(", ")))
        .unwrap_or_else(|_| HeaderValue::from_static(VARY_VALUE))
}

fn joined(what: &'static str, values: &[String]) -> Result<HeaderValue, Error> {
    HeaderValue::from_str(&values.join(", "))
        .map_err(|source| Error::InvalidHeader { what, source })
}

impl Middleware for Cors {
    fn handle(&self, req: Request, next: Next) -> BoxFuture {
        let cors = self.clone();

        if *req.method() == Method::OPTIONS {
            let mut res = Response::empty(StatusCode::NO_CONTENT);
            cors.decorate(&mut res);
            return Box::pin(async move { res });
        }

        Box::pin(async move {
            let mut res = next.run(req).await;
            cors.decorate(&mut res);
            res
        })
    }
}
