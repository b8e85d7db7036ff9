//! Output envelope: `{"status", "response"?, "meta"?}` on success,
//! `{"status", "error": {"code", "message"}}` on failure.

use crate::error::AppError;
use crate::service::{Meta, Outcome};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;

#[derive(Serialize)]
struct SuccessBody {
    status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    response: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    meta: Option<Meta>,
}

pub fn error_body(status: u16, code: &str, message: String) -> Value {
    serde_json::json!({
        "status": status,
        "error": {
            "code": code,
            "message": message
        }
    })
}

/// Final result of one request. `status` always lives in the body; the transport reports 200
/// instead when the client asked for suppressed status codes.
#[derive(Clone, Debug, PartialEq)]
pub struct ResultObject {
    pub status: u16,
    pub body: Value,
    pub suppress_status_codes: bool,
}

impl ResultObject {
    pub fn from_outcome(outcome: Outcome) -> Self {
        let body = serde_json::to_value(SuccessBody {
            status: outcome.status,
            response: outcome.response,
            meta: outcome.meta,
        })
        .unwrap_or_else(|_| serde_json::json!({ "status": outcome.status }));
        ResultObject {
            status: outcome.status,
            body,
            suppress_status_codes: false,
        }
    }

    pub fn from_error(error: &AppError) -> Self {
        let status = error.status_code().as_u16();
        ResultObject {
            status,
            body: error_body(status, error.code(), error.public_message()),
            suppress_status_codes: false,
        }
    }

    pub fn suppressed(mut self, suppress: bool) -> Self {
        self.suppress_status_codes = suppress;
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Status the transport should report.
    pub fn transport_status(&self) -> StatusCode {
        if self.suppress_status_codes {
            return StatusCode::OK;
        }
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for ResultObject {
    fn into_response(self) -> Response {
        (self.transport_status(), Json(self.body)).into_response()
    }
}
