use rusqlite::params;
use serde::Serialize;
use uuid::Uuid;

use crate::auth::keys::{self, GeneratedKey};
use crate::db::Database;
use crate::error::AppError;

/// Stored user record.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub role: String,
    pub created_at: String,
}

/// Stored API key metadata (never includes the hash).
#[derive(Debug, Clone, Serialize)]
pub struct ApiKeyInfo {
    pub id: String,
    pub user_id: String,
    pub key_prefix: String,
    pub label: String,
    pub created_at: String,
    pub last_used: Option<String>,
}

/// Result of creating a new API key: metadata plus the one-time plaintext.
#[derive(Debug)]
pub struct CreatedApiKey {
    pub info: ApiKeyInfo,
    pub plaintext: String,
}

/// Result of bootstrapping the first admin user.
#[derive(Debug)]
pub struct BootstrapResult {
    pub user: User,
    pub api_key_plaintext: String,
}

// ---------------------------------------------------------------------------
// User CRUD
// ---------------------------------------------------------------------------

/// Create a new user with the given name and role.
pub fn create_user(db: &Database, name: &str, role: &str) -> Result<User, AppError> {
    if role != "admin" && role != "member" {
        return Err(AppError::BadRequest(format!(
            "Invalid role '{role}': must be 'admin' or 'member'"
        )));
    }

    let id = Uuid::new_v4().to_string();
    let user = db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO users (id, name, role) VALUES (?1, ?2, ?3)",
            params![id, name, role],
        )?;

        let mut stmt =
            conn.prepare("SELECT id, name, role, created_at FROM users WHERE id = ?1")?;
        stmt.query_row(params![id], row_to_user)
    })?;

    tracing::info!(user_id = %user.id, name = %user.name, role = %user.role, "User created");
    Ok(user)
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        role: row.get(2)?,
        created_at: row.get(3)?,
    })
}

/// List all users.
pub fn list_users(db: &Database) -> Result<Vec<User>, AppError> {
    let users = db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT id, name, role, created_at FROM users ORDER BY created_at")?;
        let rows = stmt.query_map([], row_to_user)?;
        rows.collect::<Result<Vec<_>, _>>()
    })?;
    Ok(users)
}

/// Get a single user by ID.
pub fn get_user(db: &Database, user_id: &str) -> Result<User, AppError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT id, name, role, created_at FROM users WHERE id = ?1")?;
        stmt.query_row(params![user_id], row_to_user)
    })
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => {
            AppError::NotFound(format!("User '{user_id}' not found"))
        }
        other => AppError::Database(other.to_string()),
    })
}

/// Delete a user and all associated API keys (cascade).
pub fn delete_user(db: &Database, user_id: &str) -> Result<(), AppError> {
    let deleted =
        db.with_conn(|conn| conn.execute("DELETE FROM users WHERE id = ?1", params![user_id]))?;

    if deleted == 0 {
        return Err(AppError::NotFound(format!("User '{user_id}' not found")));
    }

    tracing::info!(user_id = %user_id, "User deleted");
    Ok(())
}

// ---------------------------------------------------------------------------
// API key CRUD
// ---------------------------------------------------------------------------

/// Create a new API key for a user.
pub fn create_api_key(
    db: &Database,
    user_id: &str,
    label: &str,
) -> Result<CreatedApiKey, AppError> {
    // The owner must exist.
    get_user(db, user_id)?;

    let GeneratedKey {
        plaintext,
        hash,
        prefix,
    } = keys::generate_api_key()
        .map_err(|e| AppError::Internal(format!("Failed to generate API key: {e}")))?;

    let key_id = Uuid::new_v4().to_string();

    let info = db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO api_keys (id, user_id, key_hash, key_prefix, label) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![key_id, user_id, hash, prefix, label],
        )?;

        let mut stmt = conn.prepare(
            "SELECT id, user_id, key_prefix, label, created_at, last_used FROM api_keys WHERE id = ?1",
        )?;
        stmt.query_row(params![key_id], row_to_key_info)
    })?;

    tracing::info!(
        key_id = %info.id,
        user_id = %user_id,
        prefix = %info.key_prefix,
        "API key created"
    );

    Ok(CreatedApiKey { info, plaintext })
}

fn row_to_key_info(row: &rusqlite::Row<'_>) -> rusqlite::Result<ApiKeyInfo> {
    Ok(ApiKeyInfo {
        id: row.get(0)?,
        user_id: row.get(1)?,
        key_prefix: row.get(2)?,
        label: row.get(3)?,
        created_at: row.get(4)?,
        last_used: row.get(5)?,
    })
}

/// List all API keys for a user (metadata only, no hashes).
pub fn list_api_keys(db: &Database, user_id: &str) -> Result<Vec<ApiKeyInfo>, AppError> {
    let keys = db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id, user_id, key_prefix, label, created_at, last_used \
             FROM api_keys WHERE user_id = ?1 ORDER BY created_at",
        )?;
        let rows = stmt.query_map(params![user_id], row_to_key_info)?;
        rows.collect::<Result<Vec<_>, _>>()
    })?;
    Ok(keys)
}

/// Revoke (delete) an API key by its ID.
pub fn revoke_api_key(db: &Database, key_id: &str) -> Result<(), AppError> {
    let deleted =
        db.with_conn(|conn| conn.execute("DELETE FROM api_keys WHERE id = ?1", params![key_id]))?;

    if deleted == 0 {
        return Err(AppError::NotFound(format!("API key '{key_id}' not found")));
    }

    tracing::info!(key_id = %key_id, "API key revoked");
    Ok(())
}

// ---------------------------------------------------------------------------
// Auth validation (used by middleware)
// ---------------------------------------------------------------------------

/// Validate a plaintext API key against the database.
///
/// Iterates all stored key hashes and verifies with argon2. On success,
/// updates `last_used` and returns the associated `AuthUser`.
pub fn validate_api_key(db: &Database, plaintext: &str) -> Result<crate::auth::AuthUser, AppError> {
    let rows = db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT ak.id, ak.key_hash, u.id, u.name, u.role \
             FROM api_keys ak \
             JOIN users u ON ak.user_id = u.id",
        )?;
        let mapped = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;
        mapped.collect::<Result<Vec<_>, _>>()
    })?;

    for (key_id, key_hash, user_id, name, role) in &rows {
        let ok = keys::verify_key(plaintext, key_hash)
            .map_err(|e| AppError::Internal(format!("Key verification error: {e}")))?;

        if ok {
            // Best-effort timestamp; a failed update is not worth failing auth.
            let _ = db.with_conn(|conn| {
                conn.execute(
                    "UPDATE api_keys SET last_used = datetime('now') WHERE id = ?1",
                    params![key_id],
                )
            });

            return Ok(crate::auth::AuthUser {
                user_id: user_id.clone(),
                name: name.clone(),
                role: role.clone(),
            });
        }
    }

    Err(AppError::Unauthorized("Invalid API key".to_string()))
}

// ---------------------------------------------------------------------------
// Bootstrap
// ---------------------------------------------------------------------------

/// If no users exist, create a default admin user and generate an API key.
///
/// The plaintext key is printed to stdout so the operator can use it.
/// Returns `None` if users already exist.
pub fn bootstrap_admin(
    db: &Database,
    admin_name: &str,
) -> Result<Option<BootstrapResult>, AppError> {
    let user_count: i64 =
        db.with_conn(|conn| conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0)))?;

    if user_count > 0 {
        return Ok(None);
    }

    tracing::info!("No users found -- bootstrapping default admin");

    let user = create_user(db, admin_name, "admin")?;
    let key = create_api_key(db, &user.id, "bootstrap")?;

    println!();
    println!("=========================================================");
    println!("  TWINROUTE first-run bootstrap");
    println!("---------------------------------------------------------");
    println!("  Admin user : {}", user.name);
    println!("  API key    : {}", key.plaintext);
    println!("---------------------------------------------------------");
    println!("  Save this key now -- it will not be shown again.");
    println!("=========================================================");
    println!();

    Ok(Some(BootstrapResult {
        user,
        api_key_plaintext: key.plaintext,
    }))
}
