//! `environment/*` routes. The wire shape is kept separate from the stored document so
//! the two can evolve independently; the stored form additionally carries `version`.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{guarded, AppState};
use crate::error::{AppError, AppResult};
use crate::repository::Environment;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/environment", get(list).put(create))
        .route("/environment/", get(list).put(create))
        .route("/environment/{id}", get(fetch).put(update).delete(remove))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentBody {
    #[serde(rename = "_key", default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub created_on: Option<DateTime<Utc>>,
    #[serde(default)]
    pub destroyed_on: Option<DateTime<Utc>>,
    #[serde(default)]
    pub destruction_planned_on: Option<DateTime<Utc>>,
}

impl From<Environment> for EnvironmentBody {
    fn from(env: Environment) -> Self {
        Self {
            id: env.id,
            name: env.name,
            description: env.description,
            created_on: env.created_on,
            destroyed_on: env.destroyed_on,
            destruction_planned_on: env.destruction_planned_on,
        }
    }
}

impl From<EnvironmentBody> for Environment {
    fn from(body: EnvironmentBody) -> Self {
        let mut env = Environment::new(body.id, body.name).with_description(body.description);
        env.created_on = body.created_on;
        env.destroyed_on = body.destroyed_on;
        env.destruction_planned_on = body.destruction_planned_on;
        env
    }
}

fn read_body(body: Result<Json<EnvironmentBody>, JsonRejection>) -> AppResult<EnvironmentBody> {
    body.map(|Json(b)| b).map_err(|e| AppError::user("malformed_request".to_string(), e.body_text()))
}

async fn list(State(state): State<AppState>) -> AppResult<Json<Vec<EnvironmentBody>>> {
    let envs = guarded("environment list", state.repository.fetch_all()).await?;
    Ok(Json(envs.into_iter().map(EnvironmentBody::from).collect()))
}

async fn fetch(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Json<EnvironmentBody>> {
    let env = guarded("environment fetch", state.repository.fetch_by_id(&id)).await?;
    Ok(Json(env.into()))
}

async fn create(
    State(state): State<AppState>,
    body: Result<Json<EnvironmentBody>, JsonRejection>,
) -> AppResult<(StatusCode, Json<EnvironmentBody>)> {
    let body = read_body(body)?;
    let env = Environment::from(body.clone());
    guarded("environment create", state.repository.create(&env)).await?;
    Ok((StatusCode::CREATED, Json(body)))
}

/// The path ID wins; a body naming a different ID is rejected.
async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<EnvironmentBody>, JsonRejection>,
) -> AppResult<Json<EnvironmentBody>> {
    let mut body = read_body(body)?;
    if body.id.is_empty() {
        body.id = id.clone();
    } else if body.id != id {
        return Err(AppError::user("id_mismatch".to_string(), format!("body ID '{}' does not match path ID '{}'", body.id, id)));
    }
    let env = Environment::from(body.clone());
    guarded("environment update", state.repository.update(&env)).await?;
    Ok(Json(body))
}

async fn remove(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<StatusCode> {
    guarded("environment delete", state.repository.delete(&id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
