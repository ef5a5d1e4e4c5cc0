use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::auth::users;
use crate::auth::AuthUser;
use crate::error::AppError;
use crate::AppState;

/// Axum middleware that extracts a Bearer token from the Authorization
/// header, validates it against the database, and injects an `AuthUser` into
/// request extensions.
///
/// When auth is disabled in config, a synthetic anonymous admin is injected
/// instead (useful for local development and tests).
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if !state.config.auth.enabled {
        let anon = AuthUser {
            user_id: "anonymous".to_string(),
            name: "anonymous".to_string(),
            role: "admin".to_string(),
        };
        request.extensions_mut().insert(anon);
        return Ok(next.run(request).await);
    }

    let token = extract_bearer_token(&request)?;
    let auth_user = users::validate_api_key(&state.db, &token)?;

    tracing::debug!(
        user_id = %auth_user.user_id,
        name = %auth_user.name,
        role = %auth_user.role,
        "Authenticated request"
    );

    request.extensions_mut().insert(auth_user);
    Ok(next.run(request).await)
}

/// Extract the Bearer token from the Authorization header.
fn extract_bearer_token(request: &Request) -> Result<String, AppError> {
    let header = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".to_string()))?;

    let value = header
        .to_str()
        .map_err(|_| AppError::Unauthorized("Invalid Authorization header encoding".to_string()))?;

    let token = value
        .strip_prefix("Bearer ")
        .ok_or_else(|| {
            AppError::Unauthorized("Authorization header must use Bearer scheme".to_string())
        })?
        .trim();

    if token.is_empty() {
        return Err(AppError::Unauthorized("Empty Bearer token".to_string()));
    }

    Ok(token.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request as HttpRequest, StatusCode};
    use axum::middleware;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    use crate::auth::users::{create_api_key, create_user};
    use crate::test_support::test_state;

    async fn whoami(request: Request) -> String {
        let user = request.extensions().get::<AuthUser>().unwrap();
        user.name.clone()
    }

    fn auth_router(state: AppState) -> Router {
        Router::new()
            .route("/whoami", get(whoami))
            .layer(middleware::from_fn_with_state(state.clone(), require_auth))
            .with_state(state)
    }

    #[test]
    fn test_extract_bearer_token_valid() {
        let req = HttpRequest::builder()
            .header(header::AUTHORIZATION, "Bearer sk-twr-abc123")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_bearer_token(&req).unwrap(), "sk-twr-abc123");
    }

    #[test]
    fn test_extract_bearer_token_missing_header() {
        let req = HttpRequest::builder().body(Body::empty()).unwrap();
        assert!(extract_bearer_token(&req).is_err());
    }

    #[test]
    fn test_extract_bearer_token_wrong_scheme() {
        let req = HttpRequest::builder()
            .header(header::AUTHORIZATION, "Basic dXNlcjpwYXNz")
            .body(Body::empty())
            .unwrap();
        assert!(extract_bearer_token(&req).is_err());
    }

    #[test]
    fn test_extract_bearer_token_empty() {
        let req = HttpRequest::builder()
            .header(header::AUTHORIZATION, "Bearer   ")
            .body(Body::empty())
            .unwrap();
        assert!(extract_bearer_token(&req).is_err());
    }

    #[tokio::test]
    async fn test_auth_disabled_injects_anonymous_admin() {
        let state = test_state(false);
        let app = auth_router(state);

        let response = app
            .oneshot(
                HttpRequest::builder()
                    .uri("/whoami")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"anonymous");
    }

    #[tokio::test]
    async fn test_missing_token_rejected() {
        let state = test_state(true);
        let app = auth_router(state);

        let response = app
            .oneshot(
                HttpRequest::builder()
                    .uri("/whoami")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_valid_key_authenticates() {
        let state = test_state(true);
        let user = create_user(&state.db, "alice", "member").unwrap();
        let key = create_api_key(&state.db, &user.id, "test").unwrap();
        let app = auth_router(state);

        let response = app
            .oneshot(
                HttpRequest::builder()
                    .uri("/whoami")
                    .header(header::AUTHORIZATION, format!("Bearer {}", key.plaintext))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"alice");
    }

}
