// API module - HTTP endpoints

pub mod auth;
pub mod buses;
pub mod companies;
pub mod health;
pub mod middleware;
pub mod municipalities;
pub mod roles;
pub mod route_stops;
pub mod routes;
pub mod tickets;
pub mod trips;
pub mod users;

use axum::{routing::get, Json, Router};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::Path;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tower_sessions::SessionManagerLayer;
use tower_sessions_sqlx_store::PostgresStore;

use crate::error::{AppError, Result};
use middleware::session::AppState;

/// Returns the trimmed value, or a validation error naming the field
pub(crate) fn required(value: Option<String>, field: &str) -> Result<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Validation(format!("{} is required", field)))
}

/// Trims an optional update field; blank counts as "not provided"
pub(crate) fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(crate) fn non_negative_cents(value: i64, field: &str) -> Result<i64> {
    if value < 0 {
        return Err(AppError::Validation(format!("{} cannot be negative", field)));
    }
    Ok(value)
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub message: String,
}

impl DeletedResponse {
    pub fn new(what: &str) -> Json<Self> {
        Json(Self {
            message: format!("{} deleted", what),
        })
    }
}

async fn ping() -> Json<Value> {
    Json(json!({ "message": "pong" }))
}

/// All JSON endpoints
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/ping", get(ping))
        .merge(auth::router())
        .merge(companies::router())
        .merge(roles::router())
        .merge(municipalities::router())
        .merge(routes::router())
        .merge(route_stops::router())
        .merge(buses::router())
        .merge(trips::router())
        .merge(users::router())
        .merge(tickets::router())
}

/// Full application: API, health, ticket pages and the static frontend
pub fn app(state: AppState, session_layer: SessionManagerLayer<PostgresStore>) -> Router {
    let static_dir = Path::new(&state.config.static_dir).to_path_buf();

    Router::new()
        .route("/health", get(health::health_check))
        .merge(router())
        .merge(tickets::page_router())
        .nest_service("/static", ServeDir::new(static_dir.clone()))
        .fallback_service(ServeDir::new(static_dir))
        .layer(session_layer)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use secrecy::Secret;
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;

    fn test_app() -> Router {
        let config = Config {
            database_url: "postgres://localhost/buspass_test".to_string(),
            base_url: "http://localhost:4004".to_string(),
            host: "127.0.0.1".to_string(),
            port: 4004,
            db_max_connections: 1,
            static_dir: "web/static".to_string(),
            session_secret: Secret::new("test-secret".to_string()),
            secure_cookies: false,
        };
        // Never connects unless a handler touches the database
        let pool = PgPoolOptions::new()
            .connect_lazy(&config.database_url)
            .unwrap();
        let layer = middleware::session::session_layer(PostgresStore::new(pool.clone()), false);

        app(AppState::new(pool, config), layer)
    }

    #[test]
    fn test_required_field() {
        assert_eq!(required(Some("  Tunja ".into()), "name").unwrap(), "Tunja");
        assert!(matches!(
            required(Some("   ".into()), "name"),
            Err(AppError::Validation(_))
        ));
        assert!(required(None, "name").is_err());
        assert_eq!(optional(Some(" ".into())), None);
        assert!(non_negative_cents(-1, "fare_cents").is_err());
    }

    #[tokio::test]
    async fn test_ping() {
        let response = test_app()
            .oneshot(Request::get("/api/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["message"], "pong");
    }

    #[tokio::test]
    async fn test_purchase_requires_login() {
        let request = Request::post("/api/tickets")
            .header("content-type", "application/json")
            .body(Body::from(
                r#"{"trip_id":"6f1c3a8e-8a53-4c61-9d0e-2b5e8f1a7c11","seat_label":"A1"}"#,
            ))
            .unwrap();

        let response = test_app().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["message"], "Unauthorized");
    }

    #[tokio::test]
    async fn test_catalog_writes_require_login() {
        let request = Request::post("/api/companies")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"name":"Expreso Andino"}"#))
            .unwrap();

        let response = test_app().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_sign_up_cannot_request_a_role() {
        let request = Request::post("/api/auth/register")
            .header("content-type", "application/json")
            .body(Body::from(
                r#"{"email":"rider@example.com","password":"secret123","role_id":"6f1c3a8e-8a53-4c61-9d0e-2b5e8f1a7c11"}"#,
            ))
            .unwrap();

        let response = test_app().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["message"], "Forbidden");
    }
}
