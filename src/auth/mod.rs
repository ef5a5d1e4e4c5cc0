pub mod keys;
pub mod middleware;
pub mod users;

use serde::Serialize;

/// Authenticated caller identity attached to request extensions by the auth
/// middleware.
#[derive(Debug, Clone, Serialize)]
pub struct AuthUser {
    pub user_id: String,
    pub name: String,
    pub role: String,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}
