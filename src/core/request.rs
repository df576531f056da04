//! The inbound request carrier.
//!
//! A [`GatewayRequest`] is built once per inbound request from the parsed
//! HTTP parts and the aggregated body. Pre-filters mutate only the
//! `modify_*` fields and the gray flag; the route filter consumes the
//! carrier to build the upstream request, re-buildable for retries because
//! the body is buffered.
use std::collections::HashMap;

use axum::body::Body;
use bytes::Bytes;
use http::{header, request::Parts, HeaderMap, Method, Request};

use crate::core::errors::{GatewayError, GatewayResult};

const HTTP_SCHEME_PREFIX: &str = "http://";

/// Hop-by-hop headers never forwarded upstream.
const HOP_BY_HOP: [header::HeaderName; 5] = [
    header::CONNECTION,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
    header::TE,
    header::HOST,
];

#[derive(Debug)]
pub struct GatewayRequest {
    /// `timestamp---uuid` identifier for log correlation.
    pub id: String,
    /// Service the matched route points at.
    pub service_name: String,
    pub begin_time: std::time::Instant,
    pub charset: String,
    /// First forwarding-header token, else the peer address.
    pub client_ip: String,
    /// Inbound `Host` header value.
    pub host: String,
    /// Path component of the request target.
    pub path: String,
    /// Full request target including the query string.
    pub uri: String,
    pub method: Method,
    pub content_type: Option<String>,
    pub headers: HeaderMap,
    /// Decoded query parameters.
    pub query_params: Vec<(String, String)>,
    /// Aggregated request body.
    pub body: Bytes,

    // Mutable routing surface, written by pre-filters.
    pub modify_scheme: String,
    pub modify_host: String,
    pub modify_path: String,
    pub is_gray: bool,

    cookies: Option<HashMap<String, String>>,
}

impl GatewayRequest {
    /// Mint a `timestamp---uuid` request id. The ingress handler generates
    /// it up front so the request span and the carrier share one id.
    pub fn generate_id() -> String {
        format!(
            "{}---{}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            uuid::Uuid::new_v4()
        )
    }

    pub fn new(service_name: String, parts: &Parts, body: Bytes, client_ip: String) -> Self {
        Self::with_id(Self::generate_id(), service_name, parts, body, client_ip)
    }

    pub fn with_id(
        id: String,
        service_name: String,
        parts: &Parts,
        body: Bytes,
        client_ip: String,
    ) -> Self {
        let host = parts
            .headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let content_type = parts
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        let charset = content_type
            .as_deref()
            .and_then(|ct| {
                ct.split(';')
                    .filter_map(|part| part.trim().strip_prefix("charset="))
                    .next()
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "utf-8".to_string());

        let uri = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| parts.uri.path().to_string());
        let path = parts.uri.path().to_string();

        let query_params = parts
            .uri
            .query()
            .map(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            id,
            service_name,
            begin_time: std::time::Instant::now(),
            charset,
            client_ip,
            modify_host: host.clone(),
            host,
            modify_path: path.clone(),
            path,
            uri,
            method: parts.method.clone(),
            content_type,
            headers: parts.headers.clone(),
            query_params,
            body,
            modify_scheme: HTTP_SCHEME_PREFIX.to_string(),
            is_gray: false,
            cookies: None,
        }
    }

    /// Look up a cookie by its name, parsing the `Cookie` header lazily.
    pub fn cookie(&mut self, name: &str) -> Option<String> {
        if self.cookies.is_none() {
            let mut map = HashMap::new();
            if let Some(raw) = self
                .headers
                .get(header::COOKIE)
                .and_then(|v| v.to_str().ok())
            {
                for pair in raw.split(';') {
                    if let Some((k, v)) = pair.trim().split_once('=') {
                        map.insert(k.to_string(), v.to_string());
                    }
                }
            }
            self.cookies = Some(map);
        }
        self.cookies.as_ref().and_then(|m| m.get(name).cloned())
    }

    /// Target URL of the upstream call: `modify_scheme + modify_host +
    /// modify_path` with the original query string appended.
    pub fn upstream_url(&self) -> String {
        let query = self
            .uri
            .split_once('?')
            .map(|(_, q)| format!("?{q}"))
            .unwrap_or_default();
        format!(
            "{}{}{}{}",
            self.modify_scheme, self.modify_host, self.modify_path, query
        )
    }

    /// Snapshot everything needed to (re)build the upstream request. The
    /// template is cloneable so resilience decorators can restart attempts
    /// without touching the context.
    pub fn upstream_template(&self) -> UpstreamRequestTemplate {
        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            if HOP_BY_HOP.iter().any(|h| h == name) {
                continue;
            }
            headers.append(name.clone(), value.clone());
        }
        UpstreamRequestTemplate {
            method: self.method.clone(),
            url: self.upstream_url(),
            headers,
            body: self.body.clone(),
        }
    }

    /// Build the upstream HTTP request from the buffered carrier.
    pub fn build_upstream_request(&self) -> GatewayResult<Request<Body>> {
        self.upstream_template().build()
    }
}

/// Cloneable blueprint of one upstream request.
#[derive(Debug, Clone)]
pub struct UpstreamRequestTemplate {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl UpstreamRequestTemplate {
    pub fn build(&self) -> GatewayResult<Request<Body>> {
        let mut builder = Request::builder()
            .method(self.method.clone())
            .uri(self.url.as_str());
        if let Some(headers) = builder.headers_mut() {
            *headers = self.headers.clone();
        }
        builder
            .body(Body::from(self.body.clone()))
            .map_err(|e| GatewayError::Internal(format!("failed to build upstream request: {e}")))
    }
}
