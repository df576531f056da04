//! Cross-origin resource sharing.
//!
//! Preflight OPTIONS requests are answered by the gateway itself and never
//! reach a backend; every proxied response gets the permissive CORS headers
//! on the way out.
use async_trait::async_trait;
use http::{header::HeaderName, HeaderValue, Method};

use crate::core::{
    chain::{Filter, FilterAction},
    context::GatewayContext,
    errors::{GatewayResult, ResponseCode},
    filters::{CORS_FILTER_NAME, CORS_FILTER_ORDER},
    response::GatewayResponse,
};

pub struct CorsFilter;

fn apply_cors_headers(response: &mut GatewayResponse) {
    response.add_header(
        HeaderName::from_static("access-control-allow-origin"),
        HeaderValue::from_static("*"),
    );
    response.add_header(
        HeaderName::from_static("access-control-allow-methods"),
        HeaderValue::from_static("GET, POST, PUT, DELETE, OPTIONS"),
    );
    response.add_header(
        HeaderName::from_static("access-control-allow-headers"),
        HeaderValue::from_static("Content-Type, Authorization"),
    );
    response.add_header(
        HeaderName::from_static("access-control-allow-credentials"),
        HeaderValue::from_static("true"),
    );
}

#[async_trait]
impl Filter for CorsFilter {
    async fn pre_filter(&self, ctx: &mut GatewayContext) -> GatewayResult<FilterAction> {
        if ctx.request.method == Method::OPTIONS {
            // Preflight skips the post-phase, so the headers go on here.
            let mut response = GatewayResponse::from_code(ResponseCode::Success);
            apply_cors_headers(&mut response);
            ctx.set_response(response);
            return Ok(FilterAction::WriteBack);
        }
        Ok(FilterAction::Continue)
    }

    async fn post_filter(&self, ctx: &mut GatewayContext) -> GatewayResult<()> {
        if let Some(response) = ctx.response.as_mut() {
            apply_cors_headers(response);
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        CORS_FILTER_NAME
    }

    fn order(&self) -> i32 {
        CORS_FILTER_ORDER
    }
}
