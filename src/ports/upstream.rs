//! Port for the shared upstream HTTP client.
use async_trait::async_trait;
use axum::body::Body;
use http::{Request, Response};
use thiserror::Error;

/// Errors the upstream client surfaces to the route filter.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum UpstreamError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("request timed out after {0} ms")]
    Timeout(u64),

    #[error("invalid upstream request: {0}")]
    InvalidRequest(String),
}

pub type UpstreamResult<T> = Result<T, UpstreamError>;

/// Executes a prepared request against a backend instance, returning the
/// streaming response. One pooled implementation is shared process-wide.
#[async_trait]
pub trait UpstreamClient: Send + Sync + 'static {
    async fn execute(&self, request: Request<Body>) -> UpstreamResult<Response<Body>>;
}
