//! Route resolution: request path to the unique best-matching route.
//!
//! A route `uri` is a literal path pattern where `**` matches any sequence
//! of characters. Among matches the smallest `order` wins; on a tie the
//! longer (more specific) `uri` does.
use regex::Regex;

use crate::{
    config::{models::RouteDefinition, registry::DynamicConfigRegistry},
    core::errors::{GatewayError, GatewayResult, ResponseCode},
};

/// Compile a route uri pattern into an anchored regex: `**` becomes `.*`,
/// everything else matches literally.
fn pattern_to_regex(uri: &str) -> Option<Regex> {
    let mut pattern = String::with_capacity(uri.len() + 8);
    pattern.push('^');
    let mut rest = uri;
    while let Some(idx) = rest.find("**") {
        pattern.push_str(&regex::escape(&rest[..idx]));
        pattern.push_str(".*");
        rest = &rest[idx + 2..];
    }
    pattern.push_str(&regex::escape(rest));
    pattern.push('$');
    Regex::new(&pattern).ok()
}

/// Resolve `path` against the registry's uri-indexed routes.
///
/// Fails with `PATH_NO_MATCHED` when nothing matches.
pub fn matching_route_by_uri(
    registry: &DynamicConfigRegistry,
    path: &str,
) -> GatewayResult<RouteDefinition> {
    let mut matched: Vec<RouteDefinition> = registry
        .uri_routes()
        .into_iter()
        .filter(|route| {
            pattern_to_regex(&route.uri)
                .map(|re| re.is_match(path))
                .unwrap_or(false)
        })
        .collect();

    if matched.is_empty() {
        return Err(GatewayError::NotFound(ResponseCode::PathNoMatched));
    }

    matched.sort_by(|a, b| {
        a.order
            .cmp(&b.order)
            .then_with(|| b.uri.len().cmp(&a.uri.len()))
    });
    Ok(matched.remove(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(id: &str, uri: &str, order: i32) -> RouteDefinition {
        RouteDefinition {
            id: id.to_string(),
            service_name: format!("svc-{id}"),
            uri: uri.to_string(),
            order,
            filter_configs: Vec::new(),
            resilience: Default::default(),
        }
    }

    fn registry_with(routes: Vec<RouteDefinition>) -> DynamicConfigRegistry {
        let registry = DynamicConfigRegistry::new();
        registry.update_routes(routes, false);
        registry
    }

    #[test]
    fn wildcard_matches_any_suffix() {
        let registry = registry_with(vec![route("r1", "/api/**", 0)]);
        assert_eq!(
            matching_route_by_uri(&registry, "/api/users/42").unwrap().id,
            "r1"
        );
        assert!(matching_route_by_uri(&registry, "/other").is_err());
    }

    #[test]
    fn literal_characters_are_not_regex() {
        // A dot in the pattern must not match an arbitrary character.
        let registry = registry_with(vec![route("r1", "/v1.0/**", 0)]);
        assert!(matching_route_by_uri(&registry, "/v1x0/thing").is_err());
        assert!(matching_route_by_uri(&registry, "/v1.0/thing").is_ok());
    }

    #[test]
    fn smaller_order_wins() {
        let registry = registry_with(vec![route("low", "/a/**", 1), route("high", "/a/**/b", 5)]);
        assert_eq!(matching_route_by_uri(&registry, "/a/x/b").unwrap().id, "low");
    }

    #[test]
    fn equal_order_prefers_longer_uri() {
        let registry = registry_with(vec![route("r1", "/a/**", 1), route("r2", "/a/b/**", 1)]);
        assert_eq!(matching_route_by_uri(&registry, "/a/b/c").unwrap().id, "r2");
    }

    #[test]
    fn no_match_is_path_no_matched() {
        let registry = registry_with(vec![route("r1", "/api/**", 0)]);
        match matching_route_by_uri(&registry, "/nope") {
            Err(GatewayError::NotFound(code)) => assert_eq!(code, ResponseCode::PathNoMatched),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
