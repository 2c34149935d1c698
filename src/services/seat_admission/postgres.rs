use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::{ReservationStore, StoreError};
use crate::db;
use crate::models::ticket::{NewTicket, Ticket};
use crate::models::trip::Trip;
use crate::models::user::User;

/// Reported when the trip disappears between lookup and insert
const TRIP_FK: &str = "tickets_trip_id_fkey";

/// Reservation store backed by the shared Postgres pool.
///
/// Seat uniqueness comes from the `uq_tickets_active_seat` partial index;
/// the insert is a single statement with no prior seat lookup.
#[derive(Clone)]
pub struct PgReservationStore {
    pool: PgPool,
}

impl PgReservationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if db::is_unique_violation(&err) {
            return StoreError::UniqueViolation;
        }
        if db::is_foreign_key_violation(&err) {
            return StoreError::ForeignKeyViolation(db::constraint_name(&err).map(str::to_string));
        }
        if db::is_connectivity_error(&err) {
            return StoreError::Unavailable(err.to_string());
        }
        StoreError::Other(err.to_string())
    }
}

#[async_trait]
impl ReservationStore for PgReservationStore {
    async fn find_trip(&self, trip_id: Uuid) -> Result<Option<Trip>, StoreError> {
        Ok(Trip::find_by_id(&self.pool, trip_id).await?)
    }

    async fn user_exists(&self, user_id: Uuid) -> Result<bool, StoreError> {
        Ok(User::exists(&self.pool, user_id).await?)
    }

    async fn insert_ticket(&self, ticket: &NewTicket) -> Result<Ticket, StoreError> {
        Ticket::insert_active(&self.pool, ticket)
            .await?
            .ok_or_else(|| StoreError::ForeignKeyViolation(Some(TRIP_FK.to_string())))
    }

    async fn cancel_ticket(
        &self,
        ticket_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Ticket>, StoreError> {
        Ok(Ticket::cancel_owned(&self.pool, ticket_id, user_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connectivity_errors_are_unavailable() {
        let io = sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "connection refused",
        ));

        for err in [io, sqlx::Error::PoolTimedOut, sqlx::Error::PoolClosed] {
            assert!(matches!(StoreError::from(err), StoreError::Unavailable(_)));
        }
    }

    #[test]
    fn test_other_errors_are_not_retryable() {
        assert!(matches!(
            StoreError::from(sqlx::Error::RowNotFound),
            StoreError::Other(_)
        ));
    }
}
