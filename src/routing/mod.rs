//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Registration:
//!     MappingBuilder (raw expressions)
//!     → path.rs / expression.rs (parse templates, name/value and media types)
//!     → matcher.rs (compile into predicates)
//!     → ambiguity.rs (reject overlaps with live routes)
//!     → router.rs (publish new table: exact index + cache.rs pattern store)
//!
//! Lookup:
//!     RequestContext
//!     → router.rs exact-path index (O(1))
//!     → cache.rs pattern store (hot routes first)
//!     → Some(Route) | None
//! ```
//!
//! # Design Decisions
//! - Predicates are a closed sum type, not trait objects
//! - Exact index is always consulted before wildcard patterns
//! - Lookups read an immutable snapshot; writers swap in a new one

pub mod ambiguity;
pub mod cache;
pub mod expression;
pub mod mapping;
pub mod matcher;
pub mod path;
pub mod route;
pub mod router;

pub use cache::ReorderPolicy;
pub use mapping::{Mapping, MappingBuilder, MappingError};
pub use matcher::{Predicate, PredicateKind};
pub use route::{Handler, Route, RouteBuilder};
pub use router::{RegistryError, RouteRegistry};
