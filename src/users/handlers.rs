//! HTTP handlers for the account routes.
//!
//! Each constructor closes over the shared [`UserService`] and returns a
//! [`Handler`] ready for [`Router::on`](crate::Router::on).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use http::StatusCode;
use serde::Serialize;
use tracing::{error, warn};

use super::model::{LoginRequest, RegisterRequest, Role, User};
use super::service::{ServiceError, UserService};
use crate::envelope::{self, Code};
use crate::handler::Handler;
use crate::middleware::timeout;
use crate::request::Request;
use crate::response::Response;

#[derive(Serialize)]
struct UserBody<'a> {
    id: i64,
    username: &'a str,
    email: &'a str,
    role: Role,
    is_active: bool,
    created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime<Utc>>,
}

impl<'a> UserBody<'a> {
    fn new(user: &'a User) -> Self {
        Self {
            id: user.id,
            username: &user.username,
            email: &user.email,
            role: user.role,
            is_active: user.is_active,
            created_at: user.created_at,
            updated_at: None,
        }
    }

    fn with_updated_at(user: &'a User) -> Self {
        Self { updated_at: Some(user.updated_at), ..Self::new(user) }
    }
}

#[derive(Serialize)]
struct LoginBody<'a> {
    user: UserBody<'a>,
}

/// `POST /api/v1/auth/register`
pub fn register(service: Arc<UserService>) -> impl Handler {
    move |req: Request| {
        let service = Arc::clone(&service);
        async move { register_user(&service, req).await }
    }
}

/// `POST /api/v1/auth/login`
pub fn login(service: Arc<UserService>) -> impl Handler {
    move |req: Request| {
        let service = Arc::clone(&service);
        async move { login_user(&service, req).await }
    }
}

/// `GET /api/v1/users/profile?user_id=N`
pub fn profile(service: Arc<UserService>) -> impl Handler {
    move |req: Request| {
        let service = Arc::clone(&service);
        async move { get_profile(&service, req).await }
    }
}

async fn register_user(service: &UserService, req: Request) -> Response {
    let ctx = req.context().clone();
    let (rid, tid) = (ctx.request_id(), ctx.trace_id());

    let body: RegisterRequest = match req.json() {
        Ok(body) => body,
        Err(e) => return invalid_body(rid, tid, &e),
    };
    if let Err(message) = body.validate() {
        warn!(request_id = rid, reason = message, "validation failed");
        return bad_request(message, rid, tid);
    }
    if let Some(res) = timeout::check(&ctx) {
        return res;
    }

    match service.register(body).await {
        Ok(user) => envelope::success(UserBody::new(&user), rid, tid),
        Err(ServiceError::UserExists) => envelope::error(
            StatusCode::CONFLICT,
            Code::INVALID_PARAM,
            "username or email already exists",
            rid,
            tid,
        ),
        Err(e) => internal(e, "register failed", rid, tid),
    }
}

async fn login_user(service: &UserService, req: Request) -> Response {
    let ctx = req.context().clone();
    let (rid, tid) = (ctx.request_id(), ctx.trace_id());

    let body: LoginRequest = match req.json() {
        Ok(body) => body,
        Err(e) => return invalid_body(rid, tid, &e),
    };
    if let Err(message) = body.validate() {
        warn!(request_id = rid, reason = message, "validation failed");
        return bad_request(message, rid, tid);
    }
    if let Some(res) = timeout::check(&ctx) {
        return res;
    }

    match service.login(body).await {
        Ok(user) => envelope::success(LoginBody { user: UserBody::new(&user) }, rid, tid),
        Err(ServiceError::UserNotFound | ServiceError::InvalidCredentials) => envelope::error(
            StatusCode::UNAUTHORIZED,
            Code::INVALID_PARAM,
            "invalid username or password",
            rid,
            tid,
        ),
        Err(ServiceError::UserInactive) => envelope::error(
            StatusCode::FORBIDDEN,
            Code::INVALID_PARAM,
            "user is inactive",
            rid,
            tid,
        ),
        Err(e) => internal(e, "login failed", rid, tid),
    }
}

async fn get_profile(service: &UserService, req: Request) -> Response {
    let ctx = req.context();
    let (rid, tid) = (ctx.request_id(), ctx.trace_id());

    let Some(raw) = req.query("user_id").filter(|v| !v.is_empty()) else {
        return bad_request("user_id is required", rid, tid);
    };
    let Ok(user_id) = raw.parse::<i64>() else {
        return bad_request("invalid user_id", rid, tid);
    };

    match service.get_by_id(user_id).await {
        Ok(user) => envelope::success(UserBody::with_updated_at(&user), rid, tid),
        Err(ServiceError::UserNotFound) => envelope::error(
            StatusCode::NOT_FOUND,
            Code::INVALID_PARAM,
            "user not found",
            rid,
            tid,
        ),
        Err(e) => internal(e, "get profile failed", rid, tid),
    }
}

fn invalid_body(rid: &str, tid: &str, err: &serde_json::Error) -> Response {
    warn!(request_id = rid, error = %err, "invalid request body");
    bad_request("invalid request body", rid, tid)
}

fn bad_request(message: &str, rid: &str, tid: &str) -> Response {
    envelope::error(StatusCode::BAD_REQUEST, Code::INVALID_PARAM, message, rid, tid)
}

fn internal(err: ServiceError, message: &str, rid: &str, tid: &str) -> Response {
    error!(request_id = rid, error = %err, "{message}");
    envelope::error(
        StatusCode::INTERNAL_SERVER_ERROR,
        Code::INTERNAL_ERROR,
        message,
        rid,
        tid,
    )
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use serde_json::Value;

    use super::*;
    use crate::handler::ErasedHandler;
    use crate::users::{BcryptHasher, MemoryUserRepository};

    fn service() -> Arc<UserService> {
        Arc::new(UserService::new(
            Arc::new(MemoryUserRepository::new()),
            Arc::new(BcryptHasher::new(4)),
        ))
    }

    fn post(uri: &str, body: &str) -> Request {
        Request::from(
            http::Request::post(uri)
                .body(Bytes::from(body.to_owned()))
                .unwrap(),
        )
    }

    fn get(uri: &str) -> Request {
        Request::from(http::Request::get(uri).body(Bytes::new()).unwrap())
    }

    fn body(res: &Response) -> Value {
        serde_json::from_slice(res.body()).unwrap()
    }

    async fn call(handler: impl Handler, req: Request) -> Response {
        handler.into_boxed_handler().call(req).await
    }

    const ALICE: &str = r#"{"username":"alice","email":"alice@example.com","password":"secret1"}"#;

    #[tokio::test]
    async fn register_returns_user_without_hash() {
        let res = call(register(service()), post("/register", ALICE)).await;
        assert_eq!(res.status(), StatusCode::OK);
        let json = body(&res);
        assert_eq!(json["code"], 0);
        assert_eq!(json["data"]["username"], "alice");
        assert_eq!(json["data"]["role"], "user");
        assert!(json["data"].get("password_hash").is_none());
        assert!(json["data"].get("updated_at").is_none());
    }

    #[tokio::test]
    async fn register_rejects_bad_input() {
        let svc = service();
        let res = call(register(svc.clone()), post("/register", "{not json")).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body(&res)["message"], "invalid request body");

        let short = r#"{"username":"al","email":"a@example.com","password":"secret1"}"#;
        let res = call(register(svc.clone()), post("/register", short)).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body(&res)["code"], 10001);
        assert_eq!(body(&res)["message"], "username must be between 3 and 32 characters");

        call(register(svc.clone()), post("/register", ALICE)).await;
        let res = call(register(svc), post("/register", ALICE)).await;
        assert_eq!(res.status(), StatusCode::CONFLICT);
        assert_eq!(body(&res)["message"], "username or email already exists");
    }

    #[tokio::test]
    async fn login_maps_failures() {
        let svc = service();
        call(register(svc.clone()), post("/register", ALICE)).await;

        let ok = r#"{"username":"alice@example.com","password":"secret1"}"#;
        let res = call(login(svc.clone()), post("/login", ok)).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body(&res)["data"]["user"]["username"], "alice");

        let wrong = r#"{"username":"alice","password":"nope-nope"}"#;
        let res = call(login(svc.clone()), post("/login", wrong)).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let missing = r#"{"username":"alice"}"#;
        let res = call(login(svc), post("/login", missing)).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body(&res)["message"], "password is required");
    }

    #[tokio::test]
    async fn profile_by_query_parameter() {
        let svc = service();
        call(register(svc.clone()), post("/register", ALICE)).await;

        let res = call(profile(svc.clone()), get("/profile?user_id=1")).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert!(body(&res)["data"]["updated_at"].is_string());

        let res = call(profile(svc.clone()), get("/profile")).await;
        assert_eq!(body(&res)["message"], "user_id is required");
        let res = call(profile(svc.clone()), get("/profile?user_id=abc")).await;
        assert_eq!(body(&res)["message"], "invalid user_id");
        let res = call(profile(svc), get("/profile?user_id=9")).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
}
