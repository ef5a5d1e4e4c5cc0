//! Twinroute -- rule-based LLM request router.
//!
//! Classifies natural-language queries, selects one of three chat backends
//! (math-optimized, general-purpose, creative), executes with a single
//! fallback to the general slot, and audits every routing decision.

pub mod api;
pub mod audit;
pub mod auth;
pub mod backends;
pub mod config;
pub mod db;
pub mod error;
pub mod personas;
pub mod routing;

use std::sync::Arc;

use crate::backends::BackendRegistry;
use crate::config::Config;
use crate::db::Database;
use crate::routing::Executor;

/// Shared application state accessible from all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Database,
    pub registry: Arc<BackendRegistry>,
    pub executor: Arc<Executor>,
}
