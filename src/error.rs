use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::db;
use crate::services::password::PasswordError;
use crate::services::qr_generator::QrGenerationError;
use crate::services::seat_admission::AdmissionError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Seat {seat_label} is already taken on this trip")]
    SeatTaken { seat_label: String },

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Service temporarily unavailable: {0}")]
    Unavailable(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn not_found(what: &str) -> Self {
        AppError::NotFound(format!("{} not found", what))
    }

    /// Translates a failed write into the outcome the caller can act on.
    /// Referential and uniqueness violations are client conflicts, lost
    /// connectivity is retryable, anything else stays a database error.
    pub fn from_write(err: sqlx::Error, what: &str) -> Self {
        if db::is_unique_violation(&err) {
            let detail = db::constraint_name(&err).unwrap_or("unique constraint");
            return AppError::Conflict(format!("{} already exists ({})", what, detail));
        }
        if db::is_foreign_key_violation(&err) {
            return AppError::Conflict(format!(
                "{} references a missing record or is still referenced",
                what
            ));
        }
        if db::is_connectivity_error(&err) {
            return AppError::Unavailable(err.to_string());
        }
        AppError::Database(err)
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Database(e) if db::is_connectivity_error(e) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) | AppError::SeatTaken { .. } => StatusCode::CONFLICT,
            AppError::Unauthorized | AppError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Session(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<AdmissionError> for AppError {
    fn from(err: AdmissionError) -> Self {
        match err {
            AdmissionError::TripNotFound(_) => AppError::not_found("Trip"),
            AdmissionError::UserNotFound(_) => AppError::not_found("User"),
            AdmissionError::TicketNotFound(_) => AppError::not_found("Ticket"),
            AdmissionError::InvalidInput(msg) => AppError::Validation(msg),
            AdmissionError::SeatTaken { seat_label, .. } => AppError::SeatTaken { seat_label },
            AdmissionError::Transient(msg) => AppError::Unavailable(msg),
            AdmissionError::Internal(msg) => AppError::Internal(anyhow::anyhow!(msg)),
        }
    }
}

impl From<PasswordError> for AppError {
    fn from(err: PasswordError) -> Self {
        match err {
            PasswordError::TooShort(_) => AppError::Validation(err.to_string()),
            other => AppError::Internal(other.into()),
        }
    }
}

impl From<QrGenerationError> for AppError {
    fn from(err: QrGenerationError) -> Self {
        AppError::Internal(err.into())
    }
}

impl From<tower_sessions::session::Error> for AppError {
    fn from(err: tower_sessions::session::Error) -> Self {
        AppError::Session(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_debug = format!("{:?}", self);

        let error_message = match &self {
            AppError::Database(_) if status == StatusCode::SERVICE_UNAVAILABLE => {
                "Database unavailable, please retry".to_string()
            }
            AppError::Database(_) => "Database error".to_string(),
            AppError::Validation(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg)
            | AppError::Unavailable(msg) => msg.clone(),
            AppError::SeatTaken { .. }
            | AppError::Unauthorized
            | AppError::Forbidden
            | AppError::InvalidCredentials => {
                self.to_string()
            }
            AppError::Session(_) => "Session error".to_string(),
            AppError::Internal(_) => "Internal server error".to_string(),
        };

        if status.is_server_error() {
            tracing::error!(error = %error_debug, "Request failed");
        }

        let body = Json(json!({
            "error": error_debug,
            "message": error_message,
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_admission_errors_map_to_distinct_statuses() {
        let trip_id = Uuid::new_v4();

        let not_found: AppError = AdmissionError::TripNotFound(trip_id).into();
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let invalid: AppError = AdmissionError::InvalidInput("empty seat".into()).into();
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

        let taken: AppError = AdmissionError::SeatTaken {
            trip_id,
            seat_label: "A1".into(),
        }
        .into();
        assert_eq!(taken.status(), StatusCode::CONFLICT);

        let transient: AppError = AdmissionError::Transient("pool timed out".into()).into();
        assert_eq!(transient.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_pool_timeout_is_service_unavailable() {
        let err = AppError::Database(sqlx::Error::PoolTimedOut);
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);

        let err = AppError::from_write(sqlx::Error::PoolTimedOut, "Route");
        assert!(matches!(err, AppError::Unavailable(_)));
    }

    #[test]
    fn test_seat_taken_response() {
        let response = AppError::SeatTaken {
            seat_label: "B1".into(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_short_password_is_validation_error() {
        let err: AppError = PasswordError::TooShort(6).into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
