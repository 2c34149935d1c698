use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tower_sessions::Session;
use uuid::Uuid;

use crate::api::auth::{create_user, ensure_role_exists, normalize_email, RegisterRequest};
use crate::api::middleware::{
    auth::{require_admin, require_auth},
    session::AppState,
};
use crate::api::{optional, DeletedResponse};
use crate::error::{AppError, Result};
use crate::models::user::{UpdateUserData, User};

#[derive(Debug, Deserialize)]
struct UpdateUserRequest {
    email: Option<String>,
    name: Option<String>,
    role_id: Option<Uuid>,
    company_id: Option<Uuid>,
}

async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<User>>> {
    Ok(Json(User::list(&state.pool).await?))
}

async fn get_user(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<User>> {
    User::find_by_id(&state.pool, id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("User"))
}

/// Handing out a role is an admin decision
async fn guard_role_change(
    state: &AppState,
    session: &Session,
    role_id: Option<Uuid>,
) -> Result<()> {
    if let Some(role_id) = role_id {
        let admin_id = require_admin(&state.pool, session).await?;
        ensure_role_exists(state, role_id).await?;
        tracing::info!(admin_id = %admin_id, role_id = %role_id, "Role assignment");
    }
    Ok(())
}

async fn add_user(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<User>)> {
    guard_role_change(&state, &session, body.role_id).await?;
    let user = create_user(&state, body).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    session: Session,
    Json(body): Json<UpdateUserRequest>,
) -> Result<Json<User>> {
    guard_role_change(&state, &session, body.role_id).await?;

    let email = match optional(body.email) {
        Some(raw) => Some(
            normalize_email(&raw)
                .ok_or_else(|| AppError::Validation("A valid email is required".to_string()))?,
        ),
        None => None,
    };

    let data = UpdateUserData {
        email,
        name: optional(body.name),
        role_id: body.role_id,
        company_id: body.company_id,
    };

    User::update(&state.pool, id, data)
        .await
        .map_err(|e| AppError::from_write(e, "User"))?
        .map(Json)
        .ok_or_else(|| AppError::not_found("User"))
}

async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeletedResponse>> {
    let deleted = User::delete(&state.pool, id)
        .await
        .map_err(|e| AppError::from_write(e, "User"))?;

    if !deleted {
        return Err(AppError::not_found("User"));
    }

    tracing::info!(user_id = %id, "Deleted user");

    Ok(DeletedResponse::new("User"))
}

/// User administration. Everything here needs a session; self-service
/// sign-up lives under `/api/auth`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/users", get(list_users).post(add_user))
        .route(
            "/api/users/:id",
            get(get_user).put(update_user).delete(delete_user),
        )
        .route_layer(middleware::from_fn(require_auth))
}
