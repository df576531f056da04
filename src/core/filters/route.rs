//! Terminal filter: the upstream call, optionally wrapped in the
//! resilience stack.
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use http_body_util::BodyExt;

use crate::{
    core::{
        chain::{Filter, FilterAction},
        context::GatewayContext,
        errors::{GatewayError, GatewayResult, ResponseCode},
        filters::{ROUTE_FILTER_NAME, ROUTE_FILTER_ORDER},
        request::UpstreamRequestTemplate,
        resilience::{ResilienceExecutor, UpstreamCall, UpstreamOutcome},
        response::GatewayResponse,
    },
    ports::UpstreamClient,
};

/// Dispatches the buffered request to the selected instance. Without
/// resilience a failure becomes `HTTP_RESPONSE_ERROR`; with resilience the
/// composed stack decides, and an uncaught failure becomes
/// `SERVICE_UNAVAILABLE`. Success advances the chain into the post-phase.
pub struct RouteFilter {
    client: Arc<dyn UpstreamClient>,
    resilience: Arc<ResilienceExecutor>,
}

impl RouteFilter {
    pub fn new(client: Arc<dyn UpstreamClient>, resilience: Arc<ResilienceExecutor>) -> Self {
        Self { client, resilience }
    }

    /// Wrap one upstream attempt as a repeatable supplier over the
    /// buffered request template.
    fn build_call(client: Arc<dyn UpstreamClient>, template: UpstreamRequestTemplate) -> UpstreamCall {
        Arc::new(move || {
            let client = client.clone();
            let template = template.clone();
            async move { dispatch(client, &template).await }.boxed()
        })
    }
}

/// Execute one attempt: build the request, send it, buffer the response.
async fn dispatch(
    client: Arc<dyn UpstreamClient>,
    template: &UpstreamRequestTemplate,
) -> GatewayResult<GatewayResponse> {
    let request = template.build()?;
    let response = client
        .execute(request)
        .await
        .map_err(|e| GatewayError::Upstream(e.to_string()))?;

    let (parts, body) = response.into_parts();
    let bytes = body
        .collect()
        .await
        .map_err(|e| GatewayError::Upstream(format!("failed to read upstream body: {e}")))?
        .to_bytes();
    Ok(GatewayResponse::from_upstream(
        parts.status,
        parts.headers,
        bytes,
    ))
}

#[async_trait]
impl Filter for RouteFilter {
    async fn pre_filter(&self, ctx: &mut GatewayContext) -> GatewayResult<FilterAction> {
        let resilience_config = ctx.route.resilience.clone();
        let template = ctx.request.upstream_template();

        if !resilience_config.enabled {
            return match dispatch(self.client.clone(), &template).await {
                Ok(response) => {
                    ctx.set_response(response);
                    Ok(FilterAction::Continue)
                }
                Err(error) => {
                    tracing::error!(request_id = %ctx.request.id, error = %error, "upstream call failed");
                    ctx.error = Some(error);
                    ctx.set_response(GatewayResponse::from_code(ResponseCode::HttpResponseError));
                    Ok(FilterAction::WriteBack)
                }
            };
        }

        let call = Self::build_call(self.client.clone(), template);
        match self
            .resilience
            .execute(&ctx.request.service_name, &resilience_config, call)
            .await
        {
            UpstreamOutcome::Response(response) => {
                ctx.set_response(response);
                Ok(FilterAction::Continue)
            }
            UpstreamOutcome::Fallback(response) => {
                ctx.set_response(response);
                Ok(FilterAction::WriteBack)
            }
            UpstreamOutcome::Failed(error) => {
                tracing::error!(request_id = %ctx.request.id, error = %error, "resilient upstream call failed");
                ctx.error = Some(error);
                ctx.set_response(GatewayResponse::from_code(ResponseCode::ServiceUnavailable));
                Ok(FilterAction::WriteBack)
            }
        }
    }

    fn name(&self) -> &'static str {
        ROUTE_FILTER_NAME
    }

    fn order(&self) -> i32 {
        ROUTE_FILTER_ORDER
    }
}
