//! Query routing: classification, backend selection, and execution with
//! fallback.
//!
//! Control flow for one call: classify the query, pick a backend slot,
//! invoke it (falling back to the general-purpose slot once on failure),
//! then emit an audit entry.

pub mod classify;
pub mod executor;
pub mod select;

pub use classify::{classify, Complexity, QueryAnalysis, QueryType};
pub use executor::{Executor, RouteParams, RoutingDecision};
pub use select::select_backend;
