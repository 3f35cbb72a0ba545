//! Shared HTTP responses for rejected and failed requests

use bytes::Bytes;
use http_body_util::{combinators::BoxBody, BodyExt, Empty, Full};
use hyper::{Response, StatusCode};

use crate::auth::AuthDecision;

pub type ProxyBody = BoxBody<Bytes, hyper::Error>;

pub fn full_body(body: impl Into<Bytes>) -> ProxyBody {
    Full::new(body.into()).map_err(|e| match e {}).boxed()
}

pub fn empty_body() -> ProxyBody {
    Empty::<Bytes>::new().map_err(|e| match e {}).boxed()
}

fn text_response(status: StatusCode, body: String) -> Response<ProxyBody> {
    let mut resp = Response::new(full_body(body));
    *resp.status_mut() = status;
    resp.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("text/plain"),
    );
    resp
}

/// HTTP 401 carrying the generic denial reason
pub fn unauthorized_response(reason: &str) -> Response<ProxyBody> {
    text_response(StatusCode::UNAUTHORIZED, reason.to_string())
}

/// HTTP 500 with no body, so nothing about the credential store leaks
pub fn internal_error_response() -> Response<ProxyBody> {
    let mut resp = Response::new(empty_body());
    *resp.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    resp
}

/// HTTP 502 for upstream failures
pub fn bad_gateway_response(message: &str) -> Response<ProxyBody> {
    text_response(StatusCode::BAD_GATEWAY, format!("Proxy error: {}\n", message))
}

/// Response to send for a refused decision, or `None` to continue forwarding.
pub fn decision_response(decision: &AuthDecision) -> Option<Response<ProxyBody>> {
    match decision {
        AuthDecision::Allowed => None,
        AuthDecision::Denied(denial) => Some(unauthorized_response(&denial.to_string())),
        AuthDecision::Error(_) => Some(internal_error_response()),
    }
}
