use secrecy::ExposeSecret;
use sqlx::PgPool;
use tower_sessions::{Expiry, SessionManagerLayer};
use tower_sessions_sqlx_store::PostgresStore;

use crate::config::Config;
use crate::services::seat_admission::{PgReservationStore, SeatAdmission};

/// Session keys used in the application
pub const SESSION_KEY_USER_ID: &str = "user_id";
pub const SESSION_KEY_SESSION_STARTED_AT: &str = "session_started_at";

/// Creates the Postgres-backed session layer, migrating its table first
pub async fn create_session_layer(
    pool: PgPool,
    secure_cookies: bool,
) -> Result<SessionManagerLayer<PostgresStore>, sqlx::Error> {
    let session_store = PostgresStore::new(pool);
    session_store.migrate().await?;

    Ok(session_layer(session_store, secure_cookies))
}

pub fn session_layer(
    session_store: PostgresStore,
    secure_cookies: bool,
) -> SessionManagerLayer<PostgresStore> {
    SessionManagerLayer::new(session_store)
        .with_secure(secure_cookies)
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::hours(24)))
}

/// Application state shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub seats: SeatAdmission<PgReservationStore>,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> Self {
        let seats = SeatAdmission::new(PgReservationStore::new(pool.clone()));
        Self {
            pool,
            config,
            seats,
        }
    }

    /// Key used to sign ticket QR payloads
    pub fn signing_key(&self) -> &[u8] {
        self.config.session_secret.expose_secret().as_bytes()
    }
}
