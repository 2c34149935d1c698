use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use uuid::Uuid;

use crate::api::middleware::{
    auth::get_authenticated_user,
    session::{AppState, SESSION_KEY_SESSION_STARTED_AT, SESSION_KEY_USER_ID},
};
use crate::error::{AppError, Result};
use crate::models::{
    company::Company,
    role::Role,
    user::{CreateUserData, User},
};
use crate::services::password;

/// Lowercases and trims an email, rejecting anything that is not shaped
/// like `local@domain.tld`
pub fn normalize_email(raw: &str) -> Option<String> {
    let email = raw.trim().to_lowercase();
    let (local, domain) = email.split_once('@')?;

    if local.is_empty() || domain.contains('@') || email.chars().any(char::is_whitespace) {
        return None;
    }
    let (host, tld) = domain.rsplit_once('.')?;
    if host.is_empty() || tld.is_empty() {
        return None;
    }

    Some(email)
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: Option<String>,
    pub company_id: Option<Uuid>,
    pub role_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub message: String,
}

/// Validates, hashes and stores a new user. Shared with `POST /api/users`.
pub async fn create_user(state: &AppState, request: RegisterRequest) -> Result<User> {
    let email = normalize_email(&request.email)
        .ok_or_else(|| AppError::Validation("A valid email is required".to_string()))?;

    if let Some(company_id) = request.company_id {
        Company::find_by_id(&state.pool, company_id)
            .await?
            .ok_or_else(|| AppError::Validation("Company not found".to_string()))?;
    }

    if let Some(role_id) = request.role_id {
        ensure_role_exists(state, role_id).await?;
    }

    if User::find_by_email(&state.pool, &email).await?.is_some() {
        return Err(AppError::Conflict("Email already registered".to_string()));
    }

    let password_hash = password::hash_password(&request.password)?;

    let name = request
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());

    // The unique index still catches a concurrent registration of the same email
    let user = User::create(
        &state.pool,
        CreateUserData {
            email,
            password_hash,
            name,
            role_id: request.role_id,
            company_id: request.company_id,
        },
    )
    .await
    .map_err(|e| AppError::from_write(e, "User"))?;

    tracing::info!(user_id = %user.id, "Created user");

    Ok(user)
}

/// An unknown role is a bad request, not a write conflict
pub(crate) async fn ensure_role_exists(state: &AppState, role_id: Uuid) -> Result<()> {
    Role::find_by_id(&state.pool, role_id)
        .await?
        .ok_or_else(|| AppError::Validation("Role not found".to_string()))?;
    Ok(())
}

/// Sign-up never grants a role; roles are handed out by an admin
fn self_service_request(request: &RegisterRequest) -> Result<()> {
    if request.role_id.is_some() {
        return Err(AppError::Forbidden);
    }
    Ok(())
}

async fn start_session(session: &Session, user_id: Uuid) -> Result<()> {
    // New identity, new session id
    session.cycle_id().await?;
    session.insert(SESSION_KEY_USER_ID, user_id).await?;
    session
        .insert(SESSION_KEY_SESSION_STARTED_AT, Utc::now().to_rfc3339())
        .await?;
    Ok(())
}

async fn register(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<User>)> {
    self_service_request(&request)?;
    let user = create_user(&state, request).await?;
    start_session(&session, user.id).await?;

    Ok((StatusCode::CREATED, Json(user)))
}

async fn login(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<LoginRequest>,
) -> Result<Json<User>> {
    let email = normalize_email(&request.email)
        .ok_or_else(|| AppError::Validation("A valid email is required".to_string()))?;

    let Some(user) = User::find_by_email(&state.pool, &email).await? else {
        // Same hashing cost as a wrong password
        password::verify_dummy(&request.password);
        tracing::info!("Login attempt for unknown email");
        return Err(AppError::InvalidCredentials);
    };

    let matches = match password::verify_password(&request.password, &user.password_hash) {
        Ok(matches) => matches,
        Err(e) => {
            tracing::error!(user_id = %user.id, error = %e, "Stored password hash unreadable");
            false
        }
    };
    if !matches {
        tracing::info!(user_id = %user.id, "Login rejected");
        return Err(AppError::InvalidCredentials);
    }

    start_session(&session, user.id).await?;
    tracing::info!(user_id = %user.id, "User logged in");

    Ok(Json(user))
}

async fn logout(session: Session) -> Result<Json<LogoutResponse>> {
    session.flush().await?;

    Ok(Json(LogoutResponse {
        message: "Logged out".to_string(),
    }))
}

async fn me(State(state): State<AppState>, session: Session) -> Result<Json<User>> {
    let current = get_authenticated_user(&session).await?;

    let user = User::find_by_id(&state.pool, current.user_id)
        .await?
        .ok_or(AppError::Unauthorized)?;

    Ok(Json(user))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/me", get(me))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;

    #[test]
    fn test_normalize_email() {
        assert_eq!(
            normalize_email("  Rider@Example.COM "),
            Some("rider@example.com".to_string())
        );
        assert_eq!(normalize_email("a@b.co"), Some("a@b.co".to_string()));

        assert_eq!(normalize_email("no-at-sign.com"), None);
        assert_eq!(normalize_email("@example.com"), None);
        assert_eq!(normalize_email("rider@localhost"), None);
        assert_eq!(normalize_email("rider@.com"), None);
        assert_eq!(normalize_email("rider@example."), None);
        assert_eq!(normalize_email("a@b@c.com"), None);
        assert_eq!(normalize_email("ri der@example.com"), None);
    }

    fn sign_up(role_id: Option<Uuid>) -> RegisterRequest {
        RegisterRequest {
            email: "rider@example.com".to_string(),
            password: "secret123".to_string(),
            name: Some("Rider".to_string()),
            company_id: None,
            role_id,
        }
    }

    #[test]
    fn test_sign_up_cannot_pick_a_role() {
        assert!(self_service_request(&sign_up(None)).is_ok());

        let err = self_service_request(&sign_up(Some(Uuid::new_v4()))).unwrap_err();
        assert!(matches!(err, AppError::Forbidden));
        assert_eq!(err.into_response().status(), StatusCode::FORBIDDEN);
    }
}
