//! In-memory authoritative view of routes, services and instances.
//!
//! The registry keeps three route indices (id, service name, uri pattern)
//! plus the service definitions and per-service instance sets, all backed by
//! `scc::HashMap` so readers stay lock-free while writers serialize per key.
//! Consumers that cache anything derived from a route (filter chains, rate
//! limiters, resilience primitives) register a [`RouteListener`] and drop
//! their entry when the route changes; the next request rebuilds it.
use std::{collections::HashMap, sync::Arc};

use scc::hash_map::Entry;

use crate::config::models::{RouteDefinition, ServiceDefinition, ServiceInstance};

/// Callback invoked with the new definition when a service's route changes.
pub type RouteListener = Arc<dyn Fn(&RouteDefinition) + Send + Sync>;

/// Dynamic configuration registry. One instance is shared process-wide.
#[derive(Default)]
pub struct DynamicConfigRegistry {
    route_listeners: scc::HashMap<String, Vec<RouteListener>>,
    routes_by_id: scc::HashMap<String, RouteDefinition>,
    routes_by_service: scc::HashMap<String, RouteDefinition>,
    routes_by_uri: scc::HashMap<String, RouteDefinition>,
    services: scc::HashMap<String, ServiceDefinition>,
    instances: scc::HashMap<String, HashMap<String, ServiceInstance>>,
}

fn upsert<V>(map: &scc::HashMap<String, V>, key: String, value: V) {
    match map.entry(key) {
        Entry::Occupied(mut entry) => {
            *entry.get_mut() = value;
        }
        Entry::Vacant(entry) => {
            entry.insert_entry(value);
        }
    }
}

impl DynamicConfigRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index a single route under all three keys.
    pub fn update_route(&self, route: RouteDefinition) {
        upsert(&self.routes_by_id, route.id.clone(), route.clone());
        upsert(
            &self.routes_by_service,
            route.service_name.clone(),
            route.clone(),
        );
        upsert(&self.routes_by_uri, route.uri.clone(), route);
    }

    /// Replace or merge the route set. With `clear` the three indices are
    /// dropped first so stale routes disappear. An empty set is a no-op.
    pub fn update_routes(&self, routes: Vec<RouteDefinition>, clear: bool) {
        if routes.is_empty() {
            return;
        }
        if clear {
            self.routes_by_id.clear();
            self.routes_by_service.clear();
            self.routes_by_uri.clear();
        }
        for route in routes {
            self.update_route(route);
        }
    }

    pub fn route_by_id(&self, id: &str) -> Option<RouteDefinition> {
        self.routes_by_id.read(id, |_, route| route.clone())
    }

    pub fn route_by_service_name(&self, service_name: &str) -> Option<RouteDefinition> {
        self.routes_by_service
            .read(service_name, |_, route| route.clone())
    }

    /// Snapshot of every uri-indexed route, for the resolver.
    pub fn uri_routes(&self) -> Vec<RouteDefinition> {
        let mut routes = Vec::new();
        self.routes_by_uri.scan(|_, route| {
            routes.push(route.clone());
        });
        routes
    }

    pub fn update_service(&self, definition: ServiceDefinition) {
        upsert(&self.services, definition.service_name.clone(), definition);
    }

    pub fn service_by_name(&self, service_name: &str) -> Option<ServiceDefinition> {
        self.services.read(service_name, |_, def| def.clone())
    }

    /// Full replace of a service's instance set.
    pub fn update_instances(
        &self,
        definition: &ServiceDefinition,
        new_instances: Vec<ServiceInstance>,
    ) {
        let mut entry = self
            .instances
            .entry(definition.service_name.clone())
            .or_default();
        let map = entry.get_mut();
        map.clear();
        for instance in new_instances {
            map.insert(instance.instance_id.clone(), instance);
        }
    }

    pub fn add_service_instance(&self, service_name: &str, instance: ServiceInstance) {
        self.instances
            .entry(service_name.to_string())
            .or_default()
            .get_mut()
            .insert(instance.instance_id.clone(), instance);
    }

    pub fn remove_service_instance(&self, service_name: &str, instance_id: &str) {
        self.instances.update(service_name, |_, map| {
            map.remove(instance_id);
        });
    }

    /// Snapshot of a service's instances; empty when unknown.
    pub fn instances_by_service_name(&self, service_name: &str) -> Vec<ServiceInstance> {
        self.instances
            .read(service_name, |_, map| map.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Register a listener for route changes of `service_name`. Listener
    /// lists are snapshotted on delivery so fan-out stays consistent with
    /// concurrent registration.
    pub fn add_route_listener(&self, service_name: &str, listener: RouteListener) {
        self.route_listeners
            .entry(service_name.to_string())
            .or_default()
            .get_mut()
            .push(listener);
    }

    /// Fan a route change out to the listeners registered for its service.
    pub fn change_route(&self, route: &RouteDefinition) {
        let listeners = self
            .route_listeners
            .read(&route.service_name, |_, listeners| listeners.clone());
        let Some(listeners) = listeners else {
            return;
        };
        for listener in &listeners {
            listener(route);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn route(id: &str, service: &str, uri: &str) -> RouteDefinition {
        RouteDefinition {
            id: id.to_string(),
            service_name: service.to_string(),
            uri: uri.to_string(),
            order: 0,
            filter_configs: Vec::new(),
            resilience: Default::default(),
        }
    }

    fn instance(id: &str, port: u16) -> ServiceInstance {
        ServiceInstance {
            instance_id: id.to_string(),
            ip: "127.0.0.1".to_string(),
            port,
            weight: 1,
            threshold: 0.0,
            enabled: true,
            gray: false,
        }
    }

    #[test]
    fn routes_are_indexed_three_ways() {
        let registry = DynamicConfigRegistry::new();
        registry.update_routes(vec![route("r1", "demo", "/api/**")], false);

        assert!(registry.route_by_id("r1").is_some());
        assert!(registry.route_by_service_name("demo").is_some());
        assert_eq!(registry.uri_routes().len(), 1);
    }

    #[test]
    fn clear_replaces_the_whole_route_set() {
        let registry = DynamicConfigRegistry::new();
        registry.update_routes(vec![route("r1", "demo", "/api/**")], false);
        registry.update_routes(vec![route("r2", "other", "/other/**")], true);

        assert!(registry.route_by_id("r1").is_none());
        assert!(registry.route_by_id("r2").is_some());
        assert_eq!(registry.uri_routes().len(), 1);
    }

    #[test]
    fn empty_update_is_a_no_op_even_with_clear() {
        let registry = DynamicConfigRegistry::new();
        registry.update_routes(vec![route("r1", "demo", "/api/**")], false);
        registry.update_routes(Vec::new(), true);
        assert!(registry.route_by_id("r1").is_some());
    }

    #[test]
    fn instance_set_is_fully_replaced() {
        let registry = DynamicConfigRegistry::new();
        let def = ServiceDefinition {
            service_name: "demo".to_string(),
            metadata: Default::default(),
        };
        registry.update_service(def.clone());
        registry.update_instances(&def, vec![instance("a", 8001), instance("b", 8002)]);
        registry.update_instances(&def, vec![instance("c", 8003)]);

        let instances = registry.instances_by_service_name("demo");
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].instance_id, "c");
    }

    #[test]
    fn add_and_remove_single_instances() {
        let registry = DynamicConfigRegistry::new();
        registry.add_service_instance("demo", instance("a", 8001));
        registry.add_service_instance("demo", instance("b", 8002));
        registry.remove_service_instance("demo", "a");

        let instances = registry.instances_by_service_name("demo");
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].instance_id, "b");
    }

    #[test]
    fn change_route_fans_out_to_service_listeners() {
        let registry = DynamicConfigRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = hits.clone();
        registry.add_route_listener(
            "demo",
            Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        registry.change_route(&route("r1", "demo", "/api/**"));
        registry.change_route(&route("r2", "other", "/other/**"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
