use axum::body::BoxBody;
use axum::http::header::{HeaderMap, HeaderName, HeaderValue};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use coda_store::Error;

/// A fully assembled gateway response: status, headers and a boxed body.
#[derive(Debug)]
pub struct GatewayResponse {
    pub status_code: StatusCode,
    pub body: BoxBody,
    pub headers: HeaderMap,
}

impl GatewayResponse {
    pub fn new(status_code: StatusCode, body: BoxBody, headers: HeaderMap) -> Self {
        GatewayResponse {
            status_code,
            body,
            headers,
        }
    }

    pub fn empty(headers: HeaderMap) -> Self {
        GatewayResponse {
            status_code: StatusCode::OK,
            body: axum::body::boxed(axum::body::Empty::new()),
            headers,
        }
    }
}

impl IntoResponse for GatewayResponse {
    fn into_response(self) -> Response {
        let mut rb = Response::builder().status(self.status_code);
        if let Some(headers) = rb.headers_mut() {
            headers.extend(self.headers);
        }
        rb.body(self.body).expect("valid response")
    }
}

/// Error shape returned to clients as JSON, with the stable status code
/// for each error kind.
#[derive(Debug, Clone, Serialize)]
pub struct GatewayError {
    #[serde(skip)]
    pub status_code: StatusCode,
    pub error: String,
}

impl GatewayError {
    pub fn new(status_code: StatusCode, message: impl Into<String>) -> Self {
        GatewayError {
            status_code,
            error: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        (self.status_code, Json(self.clone())).into_response()
    }
}

impl From<Error> for GatewayError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::Locked(_) => StatusCode::LOCKED,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::RangeNotSatisfiable => StatusCode::RANGE_NOT_SATISFIABLE,
            Error::ClockConflict { .. } => StatusCode::CONFLICT,
            Error::Regression { .. } | Error::NonContiguous { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Error::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        GatewayError::new(status, err.to_string())
    }
}

/// Insert a header, replacing any previous value. Panics only on
/// malformed header values we construct ourselves.
pub fn insert_header(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}
