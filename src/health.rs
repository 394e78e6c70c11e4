//! Kubernetes health-check handlers.
//!
//! | Check | Path | Question |
//! |---|---|---|
//! | **Liveness** | `/healthz` | Is the process alive? Failure → restart. |
//! | **Readiness** | `/readyz` | Can the store be reached? Failure → pulled from the load balancer. |
//!
//! Both answer with the standard envelope.

use std::sync::Arc;

use http::StatusCode;
use serde::Serialize;
use tracing::warn;

use crate::envelope::{self, Code};
use crate::handler::Handler;
use crate::request::Request;
use crate::users::UserRepository;

#[derive(Serialize)]
struct Liveness {
    status: &'static str,
    version: String,
}

#[derive(Serialize)]
struct Readiness {
    status: &'static str,
}

/// `GET /healthz`: always `{"status":"ok","version":…}`. No dependencies.
pub fn liveness(version: String) -> impl Handler {
    move |req: Request| {
        let body = Liveness { status: "ok", version: version.clone() };
        async move {
            let ctx = req.context();
            envelope::success(body, ctx.request_id(), ctx.trace_id())
        }
    }
}

/// `GET /readyz`: `{"status":"ready"}` while the store answers a ping,
/// `503` otherwise.
pub fn readiness(repo: Arc<dyn UserRepository>) -> impl Handler {
    move |req: Request| {
        let repo = Arc::clone(&repo);
        async move {
            let ctx = req.context();
            match repo.ping().await {
                Ok(()) => envelope::success(Readiness { status: "ready" }, ctx.request_id(), ctx.trace_id()),
                Err(e) => {
                    warn!(request_id = ctx.request_id(), error = %e, "readiness check failed");
                    envelope::error(
                        StatusCode::SERVICE_UNAVAILABLE,
                        Code::INTERNAL_ERROR,
                        "not ready",
                        ctx.request_id(),
                        ctx.trace_id(),
                    )
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use bytes::Bytes;

    use super::*;
    use crate::handler::ErasedHandler;
    use crate::response::Response;
    use crate::users::{MemoryUserRepository, NewUser, StoreError, User};

    struct Unreachable;

    #[async_trait]
    impl UserRepository for Unreachable {
        async fn create(&self, _: NewUser) -> Result<User, StoreError> { Err(StoreError::Database(sqlx::Error::PoolTimedOut)) }
        async fn get_by_id(&self, _: i64) -> Result<Option<User>, StoreError> { Ok(None) }
        async fn get_by_username(&self, _: &str) -> Result<Option<User>, StoreError> { Ok(None) }
        async fn get_by_email(&self, _: &str) -> Result<Option<User>, StoreError> { Ok(None) }
        async fn update(&self, user: &User) -> Result<(), StoreError> { Err(StoreError::NotFound(user.id)) }
        async fn delete(&self, id: i64) -> Result<(), StoreError> { Err(StoreError::NotFound(id)) }
        async fn ping(&self) -> Result<(), StoreError> { Err(StoreError::Database(sqlx::Error::PoolTimedOut)) }
    }

    async fn call(handler: impl Handler) -> (Response, serde_json::Value) {
        let req = Request::from(http::Request::get("/").body(Bytes::new()).unwrap());
        let res = handler.into_boxed_handler().call(req).await;
        let json = serde_json::from_slice(res.body()).unwrap();
        (res, json)
    }

    #[tokio::test]
    async fn liveness_reports_version() {
        let (res, json) = call(liveness("1.2.3".to_owned())).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(json["data"]["status"], "ok");
        assert_eq!(json["data"]["version"], "1.2.3");
    }

    #[tokio::test]
    async fn readiness_follows_store() {
        let (res, json) = call(readiness(Arc::new(MemoryUserRepository::new()))).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(json["data"]["status"], "ready");

        let (res, json) = call(readiness(Arc::new(Unreachable))).await;
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["code"], 10000);
        assert_eq!(json["message"], "not ready");
    }
}
