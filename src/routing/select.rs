//! Backend selection.

use crate::backends::BackendKind;
use crate::routing::classify::{QueryAnalysis, QueryType};

/// Map a classification to a backend slot. Total over all query types.
///
/// `custom_focus` deliberately routes to the general-purpose backend rather
/// than the math or creative one: persona tone comes from the injected
/// system prompt, not from model choice.
pub fn select_backend(analysis: &QueryAnalysis) -> BackendKind {
    match analysis.query_type {
        QueryType::Mathematical => BackendKind::Math,
        QueryType::Creative => BackendKind::Creative,
        QueryType::Geopolitical | QueryType::CustomFocus | QueryType::General => {
            BackendKind::General
        }
    }
}
