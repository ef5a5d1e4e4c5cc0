//! Custom personas.
//!
//! A persona is a caller-defined override bundle: focus areas that can
//! short-circuit classification, plus optional sampling parameters and a
//! system prompt that take precedence over the classifier's suggestions.
//! Personas live in SQLite; the router only ever reads them and bumps
//! `usage_count`.

use rusqlite::params;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::Database;
use crate::error::AppError;

/// Stored persona record.
#[derive(Debug, Clone, Serialize)]
pub struct Persona {
    pub id: String,
    pub name: String,
    pub role: String,
    pub focus_areas: Vec<String>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub system_prompt: Option<String>,
    pub usage_count: i64,
    pub created_at: String,
}

/// Caller-supplied fields for creating or updating a persona.
#[derive(Debug, Clone, Deserialize)]
pub struct PersonaInput {
    pub name: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub focus_areas: Vec<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

const SELECT_COLS: &str =
    "id, name, role, focus_areas, temperature, top_p, system_prompt, usage_count, created_at";

fn row_to_persona(row: &rusqlite::Row<'_>) -> rusqlite::Result<Persona> {
    let focus_json: String = row.get(3)?;
    Ok(Persona {
        id: row.get(0)?,
        name: row.get(1)?,
        role: row.get(2)?,
        focus_areas: serde_json::from_str(&focus_json).unwrap_or_default(),
        temperature: row.get(4)?,
        top_p: row.get(5)?,
        system_prompt: row.get(6)?,
        usage_count: row.get(7)?,
        created_at: row.get(8)?,
    })
}

// ---------------------------------------------------------------------------
// Persona CRUD
// ---------------------------------------------------------------------------

/// Create a new persona.
pub fn create_persona(db: &Database, input: &PersonaInput) -> Result<Persona, AppError> {
    if input.name.trim().is_empty() {
        return Err(AppError::BadRequest("Persona name is required".into()));
    }
    validate_sampling(input)?;

    let id = Uuid::new_v4().to_string();
    let focus_json = serde_json::to_string(&input.focus_areas)?;

    let persona = db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO personas (id, name, role, focus_areas, temperature, top_p, system_prompt) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id,
                input.name,
                input.role,
                focus_json,
                input.temperature,
                input.top_p,
                input.system_prompt,
            ],
        )?;

        let mut stmt =
            conn.prepare(&format!("SELECT {SELECT_COLS} FROM personas WHERE id = ?1"))?;
        stmt.query_row(params![id], row_to_persona)
    })?;

    tracing::info!(persona_id = %persona.id, name = %persona.name, "Persona created");
    Ok(persona)
}

/// Get a single persona by ID.
pub fn get_persona(db: &Database, persona_id: &str) -> Result<Persona, AppError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare(&format!("SELECT {SELECT_COLS} FROM personas WHERE id = ?1"))?;
        stmt.query_row(params![persona_id], row_to_persona)
    })
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => {
            AppError::NotFound(format!("Persona '{persona_id}' not found"))
        }
        other => AppError::Database(other.to_string()),
    })
}

/// List all personas.
pub fn list_personas(db: &Database) -> Result<Vec<Persona>, AppError> {
    let personas = db.with_conn(|conn| {
        let mut stmt =
            conn.prepare(&format!("SELECT {SELECT_COLS} FROM personas ORDER BY created_at"))?;
        let rows = stmt.query_map([], row_to_persona)?;
        rows.collect::<Result<Vec<_>, _>>()
    })?;
    Ok(personas)
}

/// Replace the caller-editable fields of a persona. `usage_count` is never
/// writable through this path.
pub fn update_persona(
    db: &Database,
    persona_id: &str,
    input: &PersonaInput,
) -> Result<Persona, AppError> {
    if input.name.trim().is_empty() {
        return Err(AppError::BadRequest("Persona name is required".into()));
    }
    validate_sampling(input)?;

    let focus_json = serde_json::to_string(&input.focus_areas)?;

    let updated = db.with_conn(|conn| {
        conn.execute(
            "UPDATE personas SET name = ?1, role = ?2, focus_areas = ?3, \
             temperature = ?4, top_p = ?5, system_prompt = ?6 WHERE id = ?7",
            params![
                input.name,
                input.role,
                focus_json,
                input.temperature,
                input.top_p,
                input.system_prompt,
                persona_id,
            ],
        )
    })?;

    if updated == 0 {
        return Err(AppError::NotFound(format!(
            "Persona '{persona_id}' not found"
        )));
    }

    get_persona(db, persona_id)
}

/// Delete a persona.
pub fn delete_persona(db: &Database, persona_id: &str) -> Result<(), AppError> {
    let deleted = db.with_conn(|conn| {
        conn.execute("DELETE FROM personas WHERE id = ?1", params![persona_id])
    })?;

    if deleted == 0 {
        return Err(AppError::NotFound(format!(
            "Persona '{persona_id}' not found"
        )));
    }

    tracing::info!(persona_id = %persona_id, "Persona deleted");
    Ok(())
}

/// Bump `usage_count` by one. A single server-side UPDATE, so concurrent
/// routing calls for the same persona never lose increments.
pub fn increment_usage(db: &Database, persona_id: &str) -> Result<(), AppError> {
    let updated = db.with_conn(|conn| {
        conn.execute(
            "UPDATE personas SET usage_count = usage_count + 1 WHERE id = ?1",
            params![persona_id],
        )
    })?;

    if updated == 0 {
        return Err(AppError::NotFound(format!(
            "Persona '{persona_id}' not found"
        )));
    }
    Ok(())
}

fn validate_sampling(input: &PersonaInput) -> Result<(), AppError> {
    if let Some(t) = input.temperature {
        if !(0.0..=1.0).contains(&t) {
            return Err(AppError::BadRequest(format!(
                "temperature must be in [0, 1], got {t}"
            )));
        }
    }
    if let Some(p) = input.top_p {
        if !(0.0..=1.0).contains(&p) {
            return Err(AppError::BadRequest(format!(
                "top_p must be in [0, 1], got {p}"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn sample_input() -> PersonaInput {
        PersonaInput {
            name: "Market Analyst".to_string(),
            role: "analyst".to_string(),
            focus_areas: vec!["commodity markets".to_string(), "inflação".to_string()],
            temperature: Some(0.4),
            top_p: None,
            system_prompt: Some("You are a terse market analyst.".to_string()),
        }
    }

    #[test]
    fn test_create_and_get_persona() {
        let db = test_db();
        let persona = create_persona(&db, &sample_input()).unwrap();
        assert_eq!(persona.name, "Market Analyst");
        assert_eq!(persona.focus_areas.len(), 2);
        assert_eq!(persona.usage_count, 0);

        let fetched = get_persona(&db, &persona.id).unwrap();
        assert_eq!(fetched.id, persona.id);
        assert_eq!(fetched.focus_areas, persona.focus_areas);
        assert_eq!(fetched.temperature, Some(0.4));
    }

    #[test]
    fn test_get_persona_not_found() {
        let db = test_db();
        let result = get_persona(&db, "nonexistent");
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_create_persona_requires_name() {
        let db = test_db();
        let mut input = sample_input();
        input.name = "  ".to_string();
        assert!(create_persona(&db, &input).is_err());
    }

    #[test]
    fn test_create_persona_rejects_bad_temperature() {
        let db = test_db();
        let mut input = sample_input();
        input.temperature = Some(1.5);
        assert!(create_persona(&db, &input).is_err());
    }

    #[test]
    fn test_create_persona_duplicate_name() {
        let db = test_db();
        create_persona(&db, &sample_input()).unwrap();
        assert!(create_persona(&db, &sample_input()).is_err());
    }

    #[test]
    fn test_list_personas() {
        let db = test_db();
        create_persona(&db, &sample_input()).unwrap();
        let mut other = sample_input();
        other.name = "Storyteller".to_string();
        create_persona(&db, &other).unwrap();

        let personas = list_personas(&db).unwrap();
        assert_eq!(personas.len(), 2);
    }

    #[test]
    fn test_update_persona() {
        let db = test_db();
        let persona = create_persona(&db, &sample_input()).unwrap();

        let mut input = sample_input();
        input.temperature = None;
        input.focus_areas = vec!["energy policy".to_string()];
        let updated = update_persona(&db, &persona.id, &input).unwrap();

        assert_eq!(updated.temperature, None);
        assert_eq!(updated.focus_areas, vec!["energy policy".to_string()]);
    }

    #[test]
    fn test_update_persona_not_found() {
        let db = test_db();
        let result = update_persona(&db, "nonexistent", &sample_input());
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_delete_persona() {
        let db = test_db();
        let persona = create_persona(&db, &sample_input()).unwrap();
        delete_persona(&db, &persona.id).unwrap();
        assert!(get_persona(&db, &persona.id).is_err());
    }

    #[test]
    fn test_increment_usage_is_single_step() {
        let db = test_db();
        let persona = create_persona(&db, &sample_input()).unwrap();

        increment_usage(&db, &persona.id).unwrap();
        increment_usage(&db, &persona.id).unwrap();

        let fetched = get_persona(&db, &persona.id).unwrap();
        assert_eq!(fetched.usage_count, 2);
    }

    #[test]
    fn test_increment_usage_unknown_persona() {
        let db = test_db();
        let result = increment_usage(&db, "nonexistent");
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_update_does_not_touch_usage_count() {
        let db = test_db();
        let persona = create_persona(&db, &sample_input()).unwrap();
        increment_usage(&db, &persona.id).unwrap();

        let updated = update_persona(&db, &persona.id, &sample_input()).unwrap();
        assert_eq!(updated.usage_count, 1);
    }
}
