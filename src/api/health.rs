use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::backends::registry::BackendStatus;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub backends: Vec<BackendStatus>,
}

/// GET /health
///
/// Returns overall status and per-backend reachability.
/// No authentication required.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let backends = state.registry.health_check_all().await;
    let status = if backends.iter().any(|b| b.healthy) {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status: status.to_string(),
        backends,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: "ok".to_string(),
            backends: vec![BackendStatus {
                backend: "math".to_string(),
                model: "o3-mini".to_string(),
                healthy: true,
            }],
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["backends"][0]["backend"], "math");
        assert_eq!(json["backends"][0]["healthy"], true);
    }
}
