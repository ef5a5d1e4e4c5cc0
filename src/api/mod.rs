pub mod admin;
pub mod health;
pub mod personas;
pub mod route;

use axum::Router;
use axum::routing::{delete, get, post, put};

use crate::AppState;

/// Build the authenticated API router. `require_auth` is layered on top of
/// this whole router by the caller.
///
/// Route layout:
/// ```text
/// /v1/route                      POST   (auth required)
/// /intelligentLLMRouter          POST   (auth required, legacy alias)
/// /v1/personas                   POST   (auth required)
/// /v1/personas                   GET    (auth required)
/// /v1/personas/:id               GET    (auth required)
/// /v1/personas/:id               PUT    (auth required)
/// /v1/personas/:id               DELETE (auth required)
/// /admin/users                   POST   (admin)
/// /admin/users                   GET    (admin)
/// /admin/users/:id               DELETE (admin)
/// /admin/users/:id/keys          POST   (admin)
/// /admin/users/:id/keys          GET    (admin)
/// /admin/keys/:id                DELETE (admin)
/// /admin/audit                   GET    (admin)
/// ```
pub fn build_api_router() -> Router<AppState> {
    let admin_routes = Router::new()
        .route("/users", post(admin::create_user))
        .route("/users", get(admin::list_users))
        .route("/users/{id}", delete(admin::delete_user))
        .route("/users/{id}/keys", post(admin::create_api_key))
        .route("/users/{id}/keys", get(admin::list_api_keys))
        .route("/keys/{id}", delete(admin::revoke_api_key))
        .route("/audit", get(admin::query_audit));

    Router::new()
        .route("/v1/route", post(route::route_query))
        // Legacy path kept for clients of the original deployment.
        .route("/intelligentLLMRouter", post(route::route_query))
        .route("/v1/personas", post(personas::create_persona))
        .route("/v1/personas", get(personas::list_personas))
        .route("/v1/personas/{id}", get(personas::get_persona))
        .route("/v1/personas/{id}", put(personas::update_persona))
        .route("/v1/personas/{id}", delete(personas::delete_persona))
        .nest("/admin", admin_routes)
}

/// Build the unauthenticated router (health only).
pub fn build_public_router() -> Router<AppState> {
    Router::new().route("/health", get(health::health_check))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routers_build() {
        // Smoke test: ensure the routers build without panicking.
        let _api: Router<AppState> = build_api_router();
        let _public: Router<AppState> = build_public_router();
    }
}
