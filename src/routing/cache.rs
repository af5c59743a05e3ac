//! Self-reordering store for pattern routes.
//!
//! # Responsibilities
//! - Scan pattern routes in priority order
//! - Count hits per route (atomic, lock-free)
//! - Move hot routes towards the front
//!
//! # Reorder Policies
//! - `SwapOnOvertake`: after a hit, if the entry now has more hits than its
//!   predecessor, the two swap places. O(1) per promotion.
//! - `Periodic { every }`: every `every` lookups the whole list is stably
//!   re-sorted by descending hits, ties by insertion order.
//!
//! # Design Decisions
//! - Reordering only changes scan cost: the set of candidate routes is the
//!   same regardless of order
//! - Promotions use `try_write`; under contention a promotion is skipped
//!   rather than making lookups wait
//! - Entries (and their counters) are shared between successive stores so
//!   registry updates keep accumulated hit counts

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::http::request::RequestContext;
use crate::routing::route::Route;

/// How the store reorders itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReorderPolicy {
    SwapOnOvertake,
    Periodic { every: u64 },
}

impl Default for ReorderPolicy {
    fn default() -> Self {
        ReorderPolicy::SwapOnOvertake
    }
}

/// A route plus its hit counter.
#[derive(Debug)]
pub struct CachedRoute {
    route: Arc<Route>,
    hits: AtomicU64,
    seq: u64,
}

impl CachedRoute {
    pub fn new(route: Arc<Route>, seq: u64) -> Self {
        Self {
            route,
            hits: AtomicU64::new(0),
            seq,
        }
    }

    pub fn route(&self) -> &Arc<Route> {
        &self.route
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Registration sequence number.
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

#[derive(Debug)]
pub struct CachedRouteStore {
    entries: RwLock<Vec<Arc<CachedRoute>>>,
    policy: ReorderPolicy,
    lookups: AtomicU64,
}

impl CachedRouteStore {
    pub fn new(policy: ReorderPolicy) -> Self {
        Self::with_entries(policy, Vec::new())
    }

    fn with_entries(policy: ReorderPolicy, entries: Vec<Arc<CachedRoute>>) -> Self {
        Self {
            entries: RwLock::new(entries),
            policy,
            lookups: AtomicU64::new(0),
        }
    }

    pub fn policy(&self) -> ReorderPolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("route store lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current entries in scan order.
    pub fn entries(&self) -> Vec<Arc<CachedRoute>> {
        self.entries.read().expect("route store lock poisoned").clone()
    }

    /// A new store with `route` appended, keeping current order and counters.
    pub fn with_added(&self, route: Arc<Route>, seq: u64) -> Self {
        let mut entries = self.entries();
        entries.push(Arc::new(CachedRoute::new(route, seq)));
        Self::with_entries(self.policy, entries)
    }

    /// A new store without the routes rejected by `keep`.
    pub fn with_retained(&self, keep: impl Fn(&Route) -> bool) -> Self {
        let entries = self
            .entries()
            .into_iter()
            .filter(|e| keep(&e.route))
            .collect();
        Self::with_entries(self.policy, entries)
    }

    /// First route whose mapping accepts the request.
    pub fn find(&self, ctx: &RequestContext) -> Option<Arc<Route>> {
        let found = {
            let entries = self.entries.read().expect("route store lock poisoned");
            entries
                .iter()
                .enumerate()
                .find(|(_, e)| e.route.mapping().test(ctx))
                .map(|(i, e)| (i, e.clone()))
        };

        let lookups = self.lookups.fetch_add(1, Ordering::Relaxed) + 1;
        let (index, entry) = found?;
        let hits = entry.hits.fetch_add(1, Ordering::Relaxed) + 1;

        match self.policy {
            ReorderPolicy::SwapOnOvertake => self.promote(index, &entry, hits),
            ReorderPolicy::Periodic { every } => {
                if every > 0 && lookups % every == 0 {
                    self.resort();
                }
            }
        }
        Some(entry.route.clone())
    }

    fn promote(&self, index: usize, entry: &Arc<CachedRoute>, hits: u64) {
        if index == 0 {
            return;
        }
        let Ok(mut entries) = self.entries.try_write() else {
            return;
        };
        // The list may have moved since the read; only swap if still in place.
        if index < entries.len()
            && Arc::ptr_eq(&entries[index], entry)
            && entries[index - 1].hits() < hits
        {
            entries.swap(index - 1, index);
        }
    }

    /// Stable sort by descending hits, ties by registration order.
    pub fn resort(&self) {
        let mut entries = self.entries.write().expect("route store lock poisoned");
        entries.sort_by(|a, b| b.hits().cmp(&a.hits()).then(a.seq.cmp(&b.seq)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::mapping::Mapping;
    use axum::http::Method;

    fn route(path: &str) -> Arc<Route> {
        Arc::new(Route::builder(Mapping::builder().name(path).path(path).build().unwrap()).build())
    }

    fn order(store: &CachedRouteStore) -> Vec<String> {
        store
            .entries()
            .iter()
            .map(|e| e.route().name().unwrap_or_default().to_string())
            .collect()
    }

    fn hit(store: &CachedRouteStore, path: &str) -> Option<Arc<Route>> {
        store.find(&RequestContext::new(Method::GET, path))
    }

    #[test]
    fn test_swap_on_overtake() {
        let store = CachedRouteStore::new(ReorderPolicy::SwapOnOvertake)
            .with_added(route("/a/*"), 0)
            .with_added(route("/b/*"), 1)
            .with_added(route("/c/*"), 2);

        hit(&store, "/c/1").unwrap();
        assert_eq!(order(&store), vec!["/a/*", "/c/*", "/b/*"]);
        hit(&store, "/c/1").unwrap();
        assert_eq!(order(&store), vec!["/c/*", "/a/*", "/b/*"]);

        // Every route is still reachable after reordering.
        for p in ["/a/x", "/b/x", "/c/x"] {
            assert!(hit(&store, p).is_some());
        }
        assert!(hit(&store, "/d/x").is_none());
    }

    #[test]
    fn test_no_promotion_without_overtake() {
        let store = CachedRouteStore::new(ReorderPolicy::SwapOnOvertake)
            .with_added(route("/a/*"), 0)
            .with_added(route("/b/*"), 1);
        hit(&store, "/a/1");
        hit(&store, "/a/1");
        hit(&store, "/b/1");
        assert_eq!(order(&store), vec!["/a/*", "/b/*"]);
        hit(&store, "/b/1");
        assert_eq!(order(&store), vec!["/a/*", "/b/*"]);
        hit(&store, "/b/1");
        assert_eq!(order(&store), vec!["/b/*", "/a/*"]);
    }

    #[test]
    fn test_periodic_resort() {
        let store = CachedRouteStore::new(ReorderPolicy::Periodic { every: 4 })
            .with_added(route("/a/*"), 0)
            .with_added(route("/b/*"), 1)
            .with_added(route("/c/*"), 2);
        hit(&store, "/c/1");
        hit(&store, "/c/1");
        hit(&store, "/b/1");
        assert_eq!(order(&store), vec!["/a/*", "/b/*", "/c/*"]);
        hit(&store, "/c/1");
        assert_eq!(order(&store), vec!["/c/*", "/b/*", "/a/*"]);
    }

    #[test]
    fn test_counters_survive_rebuild() {
        let store = CachedRouteStore::new(ReorderPolicy::SwapOnOvertake)
            .with_added(route("/a/*"), 0)
            .with_added(route("/b/*"), 1);
        hit(&store, "/b/1");
        let next = store.with_added(route("/c/*"), 2);
        assert_eq!(order(&next), vec!["/b/*", "/a/*", "/c/*"]);
        assert_eq!(next.entries()[0].hits(), 1);

        let trimmed = next.with_retained(|r| r.name() != Some("/a/*"));
        assert_eq!(order(&trimmed), vec!["/b/*", "/c/*"]);
    }
}
