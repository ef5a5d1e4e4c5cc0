use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::error::AppError;
use crate::personas::{self, Persona, PersonaInput};
use crate::AppState;

/// POST /v1/personas
pub async fn create_persona(
    State(state): State<AppState>,
    Json(input): Json<PersonaInput>,
) -> Result<(StatusCode, Json<Persona>), AppError> {
    let persona = personas::create_persona(&state.db, &input)?;
    Ok((StatusCode::CREATED, Json(persona)))
}

/// GET /v1/personas
pub async fn list_personas(State(state): State<AppState>) -> Result<Json<Vec<Persona>>, AppError> {
    Ok(Json(personas::list_personas(&state.db)?))
}

/// GET /v1/personas/:id
pub async fn get_persona(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Persona>, AppError> {
    Ok(Json(personas::get_persona(&state.db, &id)?))
}

/// PUT /v1/personas/:id
pub async fn update_persona(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<PersonaInput>,
) -> Result<Json<Persona>, AppError> {
    Ok(Json(personas::update_persona(&state.db, &id, &input)?))
}

/// DELETE /v1/personas/:id
pub async fn delete_persona(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    personas::delete_persona(&state.db, &id)?;
    Ok(StatusCode::NO_CONTENT)
}
