use axum::extract::State;
use axum::Extension;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::personas;
use crate::routing::{classify, Complexity, QueryType, RouteParams};
use crate::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct RouteRequest {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub context: Option<RouteContext>,
    #[serde(default)]
    pub custom_persona_id: Option<String>,
}

/// Caller-supplied context. Unknown keys are ignored.
#[derive(Debug, Default, Deserialize)]
pub struct RouteContext {
    #[serde(rename = "systemPrompt")]
    pub system_prompt: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RouteResponse {
    pub response: String,
    pub metadata: RouteMetadata,
}

#[derive(Debug, Serialize)]
pub struct RouteMetadata {
    pub model_used: String,
    pub query_type: QueryType,
    pub complexity: Complexity,
    pub response_time_ms: u64,
    pub reasoning: String,
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

/// POST /v1/route (also mounted at the legacy /intelligentLLMRouter path).
///
/// Classifies the query, routes it to a backend, and returns the generated
/// text with routing metadata. Validation happens before any side effect:
/// an empty query produces a 400 with no backend call and no audit entry.
pub async fn route_query(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<RouteRequest>,
) -> Result<Json<RouteResponse>, AppError> {
    let query = match request.query.as_deref() {
        Some(q) if !q.trim().is_empty() => q,
        _ => return Err(AppError::BadRequest("Query is required".to_string())),
    };

    let request_id = Uuid::new_v4().to_string();

    tracing::info!(
        request_id = %request_id,
        user_id = %user.user_id,
        persona_id = request.custom_persona_id.as_deref().unwrap_or("-"),
        "Routing request"
    );

    // Persona lookup is best-effort: a bad ID degrades to no persona.
    let persona = match request.custom_persona_id.as_deref() {
        Some(id) => match personas::get_persona(&state.db, id) {
            Ok(p) => Some(p),
            Err(e) => {
                tracing::warn!(persona_id = %id, error = %e, "Persona lookup failed, continuing without");
                None
            }
        },
        None => None,
    };

    let analysis = classify(query, persona.as_ref());

    tracing::debug!(
        request_id = %request_id,
        query_type = %analysis.query_type,
        complexity = %analysis.complexity,
        "Query classified"
    );

    let decision = state
        .executor
        .execute(
            RouteParams {
                user_id: &user.user_id,
                request_id: &request_id,
                query,
                persona: persona.as_ref(),
                context_system_prompt: request
                    .context
                    .as_ref()
                    .and_then(|c| c.system_prompt.as_deref()),
            },
            &analysis,
        )
        .await?;

    Ok(Json(RouteResponse {
        response: decision.response_text,
        metadata: RouteMetadata {
            model_used: decision.model_used,
            query_type: analysis.query_type,
            complexity: analysis.complexity,
            response_time_ms: decision.latency_ms,
            reasoning: analysis.reasoning,
        },
    }))
}
