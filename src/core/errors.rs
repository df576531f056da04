//! Error taxonomy and coded responses.
//!
//! Every failure the gateway surfaces to a client maps to a [`ResponseCode`]
//! carrying an HTTP status and a stable message. [`GatewayError`] is the
//! domain error flowing through the filter chain; the ingress adapter turns
//! it into a synthesized response via `GatewayResponse::from_code`.
use http::StatusCode;
use thiserror::Error;

/// Coded outcomes the gateway can synthesize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    Success,
    PathNoMatched,
    ServiceInstanceNotFound,
    TooManyRequests,
    GatewayFallback,
    HttpResponseError,
    ServiceUnavailable,
    InternalError,
}

impl ResponseCode {
    pub fn status(&self) -> StatusCode {
        match self {
            ResponseCode::Success => StatusCode::OK,
            ResponseCode::PathNoMatched => StatusCode::NOT_FOUND,
            ResponseCode::ServiceInstanceNotFound => StatusCode::NOT_FOUND,
            ResponseCode::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ResponseCode::GatewayFallback => StatusCode::OK,
            ResponseCode::HttpResponseError => StatusCode::BAD_GATEWAY,
            ResponseCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ResponseCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            ResponseCode::Success => "success",
            ResponseCode::PathNoMatched => "no route matched the request path",
            ResponseCode::ServiceInstanceNotFound => "no available service instance",
            ResponseCode::TooManyRequests => "too many requests",
            ResponseCode::GatewayFallback => "gateway fallback",
            ResponseCode::HttpResponseError => "upstream service error",
            ResponseCode::ServiceUnavailable => "service unavailable",
            ResponseCode::InternalError => "internal server error",
        }
    }
}

/// Domain error carried through the filter chain. Each variant resolves to
/// the coded response written back to the client.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Path or instance lookup failed; no upstream call is made.
    #[error("{}", .0.message())]
    NotFound(ResponseCode),

    /// Rejected by a rate limiter.
    #[error("too many requests")]
    Limited,

    /// The upstream call failed (connect, timeout, protocol).
    #[error("upstream call failed: {0}")]
    Upstream(String),

    /// Rejected by a resilience primitive (open breaker, full bulkhead).
    #[error("rejected by resilience policy: {0}")]
    Rejected(String),

    /// Anything else; maps to INTERNAL_ERROR.
    #[error("{0}")]
    Internal(String),
}

impl GatewayError {
    pub fn code(&self) -> ResponseCode {
        match self {
            GatewayError::NotFound(code) => *code,
            GatewayError::Limited => ResponseCode::TooManyRequests,
            GatewayError::Upstream(_) => ResponseCode::HttpResponseError,
            GatewayError::Rejected(_) => ResponseCode::ServiceUnavailable,
            GatewayError::Internal(_) => ResponseCode::InternalError,
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
