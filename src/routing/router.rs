//! Route registry and lookup.
//!
//! # Responsibilities
//! - Own the canonical set of live routes
//! - Reject ambiguous registrations before they become visible
//! - Look up the route for a request: exact-path index first, then the
//!   cached pattern store
//!
//! # Design Decisions
//! - Copy-on-write table behind an `ArcSwap`: lookups never lock and never
//!   observe a half-applied update
//! - Writers are serialised by a mutex; a failed registration publishes
//!   nothing
//! - Explicit `None` for no match rather than a silent default

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use thiserror::Error;

use crate::http::request::RequestContext;
use crate::observability::metrics;
use crate::routing::ambiguity::find_conflict;
use crate::routing::cache::{CachedRoute, CachedRouteStore, ReorderPolicy};
use crate::routing::mapping::Mapping;
use crate::routing::path::normalize_path;
use crate::routing::route::Route;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The candidate could match the same requests as an existing route.
    #[error("route {candidate} is ambiguous with existing route {existing}")]
    Conflict { candidate: String, existing: String },
}

/// Immutable view of the registered routes.
#[derive(Debug)]
struct RouteTable {
    /// All routes in registration order.
    routes: Vec<Arc<Route>>,
    /// Literal path → routes registered under it, in registration order.
    exact: HashMap<String, Vec<Arc<Route>>>,
    patterns: Arc<CachedRouteStore>,
    /// Scheduler names bound by at least one route.
    schedulers: HashSet<String>,
    next_seq: u64,
}

impl RouteTable {
    fn empty(policy: ReorderPolicy) -> Self {
        Self {
            routes: Vec::new(),
            exact: HashMap::new(),
            patterns: Arc::new(CachedRouteStore::new(policy)),
            schedulers: HashSet::new(),
            next_seq: 0,
        }
    }

    fn collect_schedulers(routes: &[Arc<Route>]) -> HashSet<String> {
        routes
            .iter()
            .filter_map(|r| r.scheduler().map(str::to_string))
            .collect()
    }
}

/// Registry of live routes.
#[derive(Debug)]
pub struct RouteRegistry {
    table: ArcSwap<RouteTable>,
    write_lock: Mutex<()>,
    check_ambiguity: bool,
}

impl RouteRegistry {
    pub fn new() -> Self {
        Self::with_options(true, ReorderPolicy::default())
    }

    pub fn with_options(check_ambiguity: bool, policy: ReorderPolicy) -> Self {
        Self {
            table: ArcSwap::from_pointee(RouteTable::empty(policy)),
            write_lock: Mutex::new(()),
            check_ambiguity,
        }
    }

    /// Register a route, rejecting it if it is ambiguous with an existing one.
    pub fn register(&self, route: Route) -> Result<Arc<Route>, RegistryError> {
        let _guard = self.write_lock.lock().expect("registry write lock poisoned");
        let current = self.table.load_full();

        if self.check_ambiguity {
            if let Some(existing) = find_conflict(&current.routes, route.mapping()) {
                tracing::warn!(
                    candidate = %route.mapping(),
                    existing = %existing.mapping(),
                    "Rejecting ambiguous route"
                );
                return Err(RegistryError::Conflict {
                    candidate: route.mapping().to_string(),
                    existing: existing.mapping().to_string(),
                });
            }
        }

        let route = Arc::new(route);
        let seq = current.next_seq;

        let mut routes = current.routes.clone();
        routes.push(route.clone());

        let mut exact = current.exact.clone();
        let patterns = match route.mapping().literal_paths() {
            Some(keys) => {
                for key in keys {
                    exact.entry(key.clone()).or_default().push(route.clone());
                }
                current.patterns.clone()
            }
            None => Arc::new(current.patterns.with_added(route.clone(), seq)),
        };

        let mut schedulers = current.schedulers.clone();
        if let Some(name) = route.scheduler() {
            schedulers.insert(name.to_string());
        }

        let count = routes.len();
        self.table.store(Arc::new(RouteTable {
            routes,
            exact,
            patterns,
            schedulers,
            next_seq: seq + 1,
        }));

        metrics::set_registered_routes(count);
        tracing::info!(
            route = %route.mapping().label(),
            scheduler = route.scheduler().unwrap_or("default"),
            "Route registered"
        );
        Ok(route)
    }

    /// Remove every route whose mapping equals `mapping`. Returns the removed routes.
    pub fn deregister(&self, mapping: &Mapping) -> Vec<Arc<Route>> {
        let _guard = self.write_lock.lock().expect("registry write lock poisoned");
        let current = self.table.load_full();

        let (removed, routes): (Vec<_>, Vec<_>) = current
            .routes
            .iter()
            .cloned()
            .partition(|r| r.mapping() == mapping);
        if removed.is_empty() {
            return removed;
        }

        let mut exact = current.exact.clone();
        if let Some(keys) = mapping.literal_paths() {
            for key in keys {
                if let Some(bucket) = exact.get_mut(key) {
                    bucket.retain(|r| r.mapping() != mapping);
                    if bucket.is_empty() {
                        exact.remove(key);
                    }
                }
            }
        }

        let patterns = if mapping.literal_paths().is_some() {
            current.patterns.clone()
        } else {
            Arc::new(current.patterns.with_retained(|r| r.mapping() != mapping))
        };

        let count = routes.len();
        self.table.store(Arc::new(RouteTable {
            schedulers: RouteTable::collect_schedulers(&routes),
            routes,
            exact,
            patterns,
            next_seq: current.next_seq,
        }));

        metrics::set_registered_routes(count);
        tracing::info!(route = %mapping.label(), removed = removed.len(), "Route deregistered");
        removed
    }

    /// Find the route for a request.
    pub fn route(&self, ctx: &RequestContext) -> Option<Arc<Route>> {
        let table = self.table.load();

        if !table.exact.is_empty() {
            if let Some(candidates) = table.exact.get(&normalize_path(ctx.path())) {
                if let Some(route) = candidates.iter().find(|r| r.mapping().test(ctx)) {
                    return Some(route.clone());
                }
            }
        }

        table.patterns.find(ctx)
    }

    pub fn len(&self) -> usize {
        self.table.load().routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all routes in registration order.
    pub fn routes(&self) -> Vec<Arc<Route>> {
        self.table.load().routes.clone()
    }

    /// Pattern routes in current scan order, with their hit counts.
    pub fn pattern_entries(&self) -> Vec<Arc<CachedRoute>> {
        self.table.load().patterns.entries()
    }

    /// True if no route binds a scheduler other than `name`.
    pub fn all_bound_to(&self, name: &str) -> bool {
        self.table.load().schedulers.iter().all(|s| s == name)
    }
}

impl Default for RouteRegistry {
    fn default() -> Self {
        Self::new()
    }
}
