//! Registration-time ambiguity checks.
//!
//! Two mappings are ambiguous when every predicate kind defined by both
//! may match a common request. A kind defined by only one side does not
//! restrict anything, so it never separates the two.

use std::sync::Arc;

use crate::routing::mapping::Mapping;
use crate::routing::route::Route;

/// Whether some request could be matched by both mappings.
pub fn is_ambiguous(a: &Mapping, b: &Mapping) -> bool {
    a.predicates().iter().all(|pa| match b.predicate(pa.kind()) {
        Some(pb) => pa.may_ambiguous_with(pb),
        None => true,
    })
}

/// First registered route whose mapping is ambiguous with `candidate`.
pub fn find_conflict<'a>(routes: &'a [Arc<Route>], candidate: &Mapping) -> Option<&'a Arc<Route>> {
    routes
        .iter()
        .find(|existing| is_ambiguous(existing.mapping(), candidate))
}
