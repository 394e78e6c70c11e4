//! Unified JSON response envelope.
//!
//! Every body the service produces has the same shape:
//!
//! ```json
//! {"code":0,"message":"OK","data":{...},"request_id":"...","timestamp":1700000000}
//! ```
//!
//! `code` is the business status, separate from the HTTP status. `data` is
//! only ever present on success; `request_id` and `trace_id` are left out of
//! the JSON when empty.

use std::fmt;

use http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::response::Response;

/// Business status code. `0` is success.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Code(pub i32);

impl Code {
    pub const OK: Code = Code(0);
    pub const INTERNAL_ERROR: Code = Code(10000);
    pub const INVALID_PARAM: Code = Code(10001);
    pub const TIMEOUT: Code = Code(10002);

    pub fn is_success(self) -> bool {
        self == Self::OK
    }

    /// Default HTTP status for callers that only know the business code.
    pub fn http_status(self) -> StatusCode {
        match self {
            Self::OK => StatusCode::OK,
            Self::INVALID_PARAM => StatusCode::BAD_REQUEST,
            Self::TIMEOUT => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Wire form of every JSON response.
#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub code: Code,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub request_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub trace_id: String,
    pub timestamp: i64,
}

impl<T> Envelope<T> {
    fn new(code: Code, message: &str, data: Option<T>, request_id: &str, trace_id: &str) -> Self {
        // An error never carries a payload.
        let data = if code.is_success() { data } else { None };
        Self {
            code,
            message: message.to_owned(),
            data,
            request_id: request_id.to_owned(),
            trace_id: trace_id.to_owned(),
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// Serializes an envelope into a JSON response with the given HTTP status.
pub fn write<T: Serialize>(
    status: StatusCode,
    code: Code,
    message: &str,
    data: Option<T>,
    request_id: &str,
    trace_id: &str,
) -> Response {
    let envelope = Envelope::new(code, message, data, request_id, trace_id);
    match serde_json::to_vec(&envelope) {
        Ok(body) => Response::builder().status(status).json(body),
        Err(e) => {
            tracing::error!(error = %e, request_id, "failed to serialize response envelope");
            let fallback = Envelope::<()>::new(
                Code::INTERNAL_ERROR,
                "internal server error",
                None,
                request_id,
                trace_id,
            );
            // Only strings and integers remain, so this cannot fail.
            let body = serde_json::to_vec(&fallback).unwrap_or_default();
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .json(body)
        }
    }
}

/// `200 OK`, code `0`, message `"OK"`.
pub fn success<T: Serialize>(data: T, request_id: &str, trace_id: &str) -> Response {
    write(StatusCode::OK, Code::OK, "OK", Some(data), request_id, trace_id)
}

/// Failure envelope. Never carries `data`.
pub fn error(
    status: StatusCode,
    code: Code,
    message: &str,
    request_id: &str,
    trace_id: &str,
) -> Response {
    write::<()>(status, code, message, None, request_id, trace_id)
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;

    fn body(res: &Response) -> Value {
        serde_json::from_slice(res.body()).unwrap()
    }

    #[test]
    fn success_envelope_round_trips_without_blank_ids() {
        let res = success(json!({"status": "ok"}), "", "");
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.header("content-type"), Some("application/json; charset=utf-8"));

        let raw = body(&res);
        let keys = raw.as_object().unwrap();
        assert!(!keys.contains_key("request_id"));
        assert!(!keys.contains_key("trace_id"));

        let parsed: Envelope<Value> = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(parsed.code, Code::OK);
        assert_eq!(parsed.message, "OK");
        assert_eq!(parsed.data, Some(json!({"status": "ok"})));
        assert!(parsed.timestamp > 0);
    }

    #[test]
    fn error_envelope_has_no_data_key() {
        let res = error(StatusCode::BAD_REQUEST, Code::INVALID_PARAM, "bad", "rid-1", "");
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let raw = body(&res);
        assert_eq!(raw["code"], 10001);
        assert_eq!(raw["message"], "bad");
        assert_eq!(raw["request_id"], "rid-1");
        assert!(raw.get("data").is_none());
    }

    #[test]
    fn failure_code_drops_supplied_payload() {
        let res = write(
            StatusCode::CONFLICT,
            Code::INVALID_PARAM,
            "exists",
            Some(json!({"id": 1})),
            "",
            "",
        );
        assert!(body(&res).get("data").is_none());
    }

    #[test]
    fn business_codes_map_to_http_statuses() {
        assert_eq!(Code::OK.http_status(), StatusCode::OK);
        assert_eq!(Code::INVALID_PARAM.http_status(), StatusCode::BAD_REQUEST);
        assert_eq!(Code::TIMEOUT.http_status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(Code::INTERNAL_ERROR.http_status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(Code(42).http_status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
