use axum::{
    extract::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use sqlx::PgPool;
use tower_sessions::Session;
use uuid::Uuid;

use super::session::SESSION_KEY_USER_ID;
use crate::error::AppError;
use crate::models::user::User;

/// Authentication error responses
#[derive(Debug)]
pub enum AuthError {
    Unauthorized,
    SessionError,
}

/// Rejections share the JSON error body of every other endpoint
impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        AppError::from(self).into_response()
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Unauthorized => AppError::Unauthorized,
            AuthError::SessionError => AppError::Session("failed to read session".to_string()),
        }
    }
}

/// Rejects requests without a logged-in user before they reach the handler
pub async fn require_auth(
    session: Session,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let user = get_authenticated_user(&session).await?;
    tracing::debug!(user_id = %user.user_id, path = %request.uri().path(), "Authenticated request");

    Ok(next.run(request).await)
}

/// The user bound to the current session
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
}

/// Extracts the authenticated user ID from the session
pub async fn get_authenticated_user(session: &Session) -> Result<AuthenticatedUser, AuthError> {
    let user_id: Uuid = session
        .get(SESSION_KEY_USER_ID)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to read session");
            AuthError::SessionError
        })?
        .ok_or(AuthError::Unauthorized)?;

    Ok(AuthenticatedUser { user_id })
}

/// Like `get_authenticated_user`, but the user must also hold the `admin` role
pub async fn require_admin(pool: &PgPool, session: &Session) -> Result<Uuid, AppError> {
    let current = get_authenticated_user(session).await?;
    if !User::is_admin(pool, current.user_id).await? {
        tracing::warn!(user_id = %current.user_id, "Admin-only operation refused");
        return Err(AppError::Forbidden);
    }
    Ok(current.user_id)
}
