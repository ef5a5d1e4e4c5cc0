use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Extension;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::audit::{self, AuditRecord};
use crate::auth::users;
use crate::auth::AuthUser;
use crate::error::AppError;
use crate::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateApiKeyRequest {
    #[serde(default)]
    pub label: String,
}

#[derive(Debug, Serialize)]
pub struct CreatedApiKeyResponse {
    pub id: String,
    pub user_id: String,
    pub key_prefix: String,
    pub label: String,
    pub created_at: String,
    /// The full plaintext key. Shown exactly once.
    pub plaintext: String,
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub query_type: Option<String>,
}

fn default_limit() -> u32 {
    100
}

#[derive(Debug, Serialize)]
pub struct AuditResponse {
    pub data: Vec<AuditRecord>,
}

/// Guard helper: all admin handlers check the caller's role first.
fn require_admin(user: &AuthUser) -> Result<(), AppError> {
    if !user.is_admin() {
        return Err(AppError::Forbidden(format!(
            "Admin role required, but user '{}' has role '{}'",
            user.name, user.role
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /admin/users
pub async fn create_user(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<users::User>), AppError> {
    require_admin(&user)?;
    let created = users::create_user(&state.db, &request.name, &request.role)?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /admin/users
pub async fn list_users(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<users::User>>, AppError> {
    require_admin(&user)?;
    Ok(Json(users::list_users(&state.db)?))
}

/// DELETE /admin/users/:id
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    require_admin(&user)?;
    users::delete_user(&state.db, &id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /admin/users/:id/keys
pub async fn create_api_key(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(request): Json<CreateApiKeyRequest>,
) -> Result<(StatusCode, Json<CreatedApiKeyResponse>), AppError> {
    require_admin(&user)?;
    let created = users::create_api_key(&state.db, &id, &request.label)?;
    Ok((
        StatusCode::CREATED,
        Json(CreatedApiKeyResponse {
            id: created.info.id,
            user_id: created.info.user_id,
            key_prefix: created.info.key_prefix,
            label: created.info.label,
            created_at: created.info.created_at,
            plaintext: created.plaintext,
        }),
    ))
}

/// GET /admin/users/:id/keys
pub async fn list_api_keys(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<Vec<users::ApiKeyInfo>>, AppError> {
    require_admin(&user)?;
    Ok(Json(users::list_api_keys(&state.db, &id)?))
}

/// DELETE /admin/keys/:id
pub async fn revoke_api_key(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    require_admin(&user)?;
    users::revoke_api_key(&state.db, &id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /admin/audit
pub async fn query_audit(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<AuditQuery>,
) -> Result<Json<AuditResponse>, AppError> {
    require_admin(&user)?;
    let filter = audit::AuditFilter {
        user_id: params.user_id,
        query_type: params.query_type,
        limit: params.limit.min(1000),
    };
    let data = audit::query_recent(&state.db, &filter)?;
    Ok(Json(AuditResponse { data }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_with_role(role: &str) -> AuthUser {
        AuthUser {
            user_id: "u1".to_string(),
            name: "test".to_string(),
            role: role.to_string(),
        }
    }

    #[test]
    fn test_require_admin_allows_admin() {
        assert!(require_admin(&user_with_role("admin")).is_ok());
    }

    #[test]
    fn test_require_admin_rejects_member() {
        assert!(require_admin(&user_with_role("member")).is_err());
    }

    #[test]
    fn test_audit_query_default_limit() {
        let q: AuditQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(q.limit, 100);
    }
}
