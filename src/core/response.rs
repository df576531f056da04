//! The outbound response carrier.
//!
//! A [`GatewayResponse`] either wraps a buffered upstream response, forwarded
//! verbatim, or is synthesized by the gateway itself (errors, preflight,
//! fallback). Exactly one variant exists per request; post-filters may add
//! headers to either.
use axum::body::Body;
use bytes::Bytes;
use http::{header, HeaderMap, HeaderName, HeaderValue, Response, StatusCode};

use crate::core::errors::ResponseCode;

const JSON_CONTENT_TYPE: &str = "application/json;charset=utf-8";

#[derive(Debug)]
pub enum GatewayResponse {
    /// Response received from a backend instance.
    Upstream {
        status: StatusCode,
        headers: HeaderMap,
        body: Bytes,
    },
    /// Response synthesized by the gateway.
    Synthesized {
        status: StatusCode,
        headers: HeaderMap,
        content: String,
    },
}

impl GatewayResponse {
    pub fn from_upstream(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        GatewayResponse::Upstream {
            status,
            headers,
            body,
        }
    }

    /// Synthesize the coded response for `code`: JSON content type and the
    /// code's message serialized as a JSON string.
    pub fn from_code(code: ResponseCode) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(JSON_CONTENT_TYPE),
        );
        GatewayResponse::Synthesized {
            status: code.status(),
            headers,
            content: serde_json::to_string(code.message()).unwrap_or_default(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GatewayResponse::Upstream { status, .. } => *status,
            GatewayResponse::Synthesized { status, .. } => *status,
        }
    }

    pub fn set_status(&mut self, new_status: StatusCode) {
        match self {
            GatewayResponse::Upstream { status, .. } => *status = new_status,
            GatewayResponse::Synthesized { status, .. } => *status = new_status,
        }
    }

    pub fn headers(&self) -> &HeaderMap {
        match self {
            GatewayResponse::Upstream { headers, .. } => headers,
            GatewayResponse::Synthesized { headers, .. } => headers,
        }
    }

    pub fn add_header(&mut self, name: HeaderName, value: HeaderValue) {
        match self {
            GatewayResponse::Upstream { headers, .. } => headers.insert(name, value),
            GatewayResponse::Synthesized { headers, .. } => headers.insert(name, value),
        };
    }

    /// Build the wire response. Upstream payloads forward status, headers
    /// and body bytes verbatim; synthesized ones get a `Content-Length`.
    /// `Transfer-Encoding` is stripped since the buffered body is re-framed,
    /// and the `Connection` header reflects `keep_alive`.
    pub fn into_http(self, keep_alive: bool) -> Response<Body> {
        let mut response = match self {
            GatewayResponse::Upstream {
                status,
                mut headers,
                body,
            } => {
                headers.remove(header::TRANSFER_ENCODING);
                let mut response = Response::new(Body::from(body));
                *response.status_mut() = status;
                *response.headers_mut() = headers;
                response
            }
            GatewayResponse::Synthesized {
                status,
                mut headers,
                content,
            } => {
                let body = Bytes::from(content);
                headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
                let mut response = Response::new(Body::from(body));
                *response.status_mut() = status;
                *response.headers_mut() = headers;
                response
            }
        };

        let connection = if keep_alive {
            HeaderValue::from_static("keep-alive")
        } else {
            HeaderValue::from_static("close")
        };
        response.headers_mut().insert(header::CONNECTION, connection);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coded_response_is_json_with_message() {
        let response = GatewayResponse::from_code(ResponseCode::TooManyRequests);
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            JSON_CONTENT_TYPE
        );
        match &response {
            GatewayResponse::Synthesized { content, .. } => {
                assert_eq!(content, "\"too many requests\"");
            }
            _ => panic!("expected synthesized response"),
        }
    }

    #[test]
    fn synthesized_write_back_sets_content_length_and_connection() {
        let response = GatewayResponse::from_code(ResponseCode::Success).into_http(true);
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(header::CONTENT_LENGTH).is_some());
        assert_eq!(response.headers().get(header::CONNECTION).unwrap(), "keep-alive");
    }

    #[test]
    fn upstream_write_back_forwards_headers_and_strips_transfer_encoding() {
        let mut headers = HeaderMap::new();
        headers.insert("x-backend", HeaderValue::from_static("demo"));
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));

        let response =
            GatewayResponse::from_upstream(StatusCode::CREATED, headers, Bytes::from_static(b"ok"))
                .into_http(false);

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers().get("x-backend").unwrap(), "demo");
        assert!(response.headers().get(header::TRANSFER_ENCODING).is_none());
        assert_eq!(response.headers().get(header::CONNECTION).unwrap(), "close");
    }
}
