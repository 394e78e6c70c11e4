//! Route table.

use std::sync::Arc;

use http::Method;

use crate::health;
use crate::router::Router;
use crate::users::{UserRepository, UserService, handlers};

/// Shared state behind the routes.
#[derive(Clone)]
pub struct AppState {
    pub users: Arc<UserService>,
    pub repo: Arc<dyn UserRepository>,
    pub version: String,
}

impl AppState {
    pub fn new(users: UserService, repo: Arc<dyn UserRepository>, version: impl Into<String>) -> Self {
        Self { users: Arc::new(users), repo, version: version.into() }
    }
}

/// Every route the service answers.
pub fn router(state: &AppState) -> Router {
    Router::new()
        .on(Method::GET, "/healthz", health::liveness(state.version.clone()))
        .on(Method::GET, "/readyz", health::readiness(Arc::clone(&state.repo)))
        .on(Method::POST, "/api/v1/auth/register", handlers::register(Arc::clone(&state.users)))
        .on(Method::POST, "/api/v1/auth/login", handlers::login(Arc::clone(&state.users)))
        .on(Method::GET, "/api/v1/users/profile", handlers::profile(Arc::clone(&state.users)))
}
