use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::middleware::{auth::require_auth, session::AppState};
use crate::api::{required, DeletedResponse};
use crate::error::{AppError, Result};
use crate::models::role::Role;

#[derive(Debug, Deserialize)]
struct RoleRequest {
    name: Option<String>,
}

async fn list_roles(State(state): State<AppState>) -> Result<Json<Vec<Role>>> {
    Ok(Json(Role::list(&state.pool).await?))
}

async fn get_role(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Role>> {
    Role::find_by_id(&state.pool, id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("Role"))
}

async fn create_role(
    State(state): State<AppState>,
    Json(body): Json<RoleRequest>,
) -> Result<(StatusCode, Json<Role>)> {
    let name = required(body.name, "name")?;

    let role = Role::create(&state.pool, &name)
        .await
        .map_err(|e| AppError::from_write(e, "Role"))?;

    Ok((StatusCode::CREATED, Json(role)))
}

async fn update_role(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<RoleRequest>,
) -> Result<Json<Role>> {
    let name = required(body.name, "name")?;

    Role::update(&state.pool, id, &name)
        .await
        .map_err(|e| AppError::from_write(e, "Role"))?
        .map(Json)
        .ok_or_else(|| AppError::not_found("Role"))
}

async fn delete_role(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeletedResponse>> {
    let deleted = Role::delete(&state.pool, id)
        .await
        .map_err(|e| AppError::from_write(e, "Role"))?;

    if !deleted {
        return Err(AppError::not_found("Role"));
    }

    Ok(DeletedResponse::new("Role"))
}

pub fn router() -> Router<AppState> {
    let public = Router::new()
        .route("/api/roles", get(list_roles))
        .route("/api/roles/:id", get(get_role));

    let protected = Router::new()
        .route("/api/roles", post(create_role))
        .route("/api/roles/:id", put(update_role).delete(delete_role))
        .route_layer(middleware::from_fn(require_auth));

    public.merge(protected)
}
