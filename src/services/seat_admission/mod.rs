//! Seat admission control.
//!
//! Decides whether a purchase request may claim a seat on a trip. The
//! guarantee is that for any trip and seat label at most one active ticket
//! exists, no matter how many requests race for it. The decision is never a
//! read-then-write: the ticket insert is attempted unconditionally and the
//! store's uniqueness constraint picks the winner. Losers get
//! [`AdmissionError::SeatTaken`].

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::ticket::{NewTicket, Ticket};
use crate::models::trip::Trip;

mod memory;
mod postgres;

pub use memory::{InjectedFault, MemoryReservationStore};
pub use postgres::PgReservationStore;

#[derive(thiserror::Error, Debug)]
pub enum AdmissionError {
    #[error("Trip {0} not found")]
    TripNotFound(Uuid),

    #[error("User {0} not found")]
    UserNotFound(Uuid),

    #[error("Ticket {0} not found")]
    TicketNotFound(Uuid),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Seat {seat_label} already taken on trip {trip_id}")]
    SeatTaken { trip_id: Uuid, seat_label: String },

    /// Storage could not be reached. Retrying the whole call is safe.
    #[error("Reservation store unavailable: {0}")]
    Transient(String),

    #[error("Reservation store error: {0}")]
    Internal(String),
}

/// Failures reported by a [`ReservationStore`]
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Unique constraint violated")]
    UniqueViolation,

    /// A referenced row is gone. Carries the constraint name when known.
    #[error("Foreign key violated: {0:?}")]
    ForeignKeyViolation(Option<String>),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store error: {0}")]
    Other(String),
}

/// Datastore operations the admission controller depends on
#[async_trait]
pub trait ReservationStore: Send + Sync {
    async fn find_trip(&self, trip_id: Uuid) -> Result<Option<Trip>, StoreError>;

    async fn user_exists(&self, user_id: Uuid) -> Result<bool, StoreError>;

    /// Writes an active ticket priced at the trip's fare as of the write.
    /// Must fail with [`StoreError::UniqueViolation`] when the (trip, seat)
    /// pair already has an active ticket, atomically with the write, and with
    /// [`StoreError::ForeignKeyViolation`] when the trip or user is gone.
    async fn insert_ticket(&self, ticket: &NewTicket) -> Result<Ticket, StoreError>;

    /// Marks a ticket owned by `user_id` as cancelled. `None` when there is
    /// no such ticket for that user.
    async fn cancel_ticket(
        &self,
        ticket_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Ticket>, StoreError>;
}

/// Opaque per-trip seat identifier such as "A3"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SeatLabel(String);

impl SeatLabel {
    pub const MAX_LEN: usize = 16;

    /// Trims surrounding whitespace and rejects empty, overlong or
    /// control-character labels. Case is preserved.
    pub fn parse(raw: &str) -> Result<Self, AdmissionError> {
        let label = raw.trim();

        if label.is_empty() {
            return Err(AdmissionError::InvalidInput(
                "Seat label is required".to_string(),
            ));
        }
        if label.chars().count() > Self::MAX_LEN {
            return Err(AdmissionError::InvalidInput(format!(
                "Seat label must be at most {} characters",
                Self::MAX_LEN
            )));
        }
        if label.chars().any(char::is_control) {
            return Err(AdmissionError::InvalidInput(
                "Seat label contains control characters".to_string(),
            ));
        }

        Ok(Self(label.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReserveRequest {
    pub trip_id: Uuid,
    pub user_id: Uuid,
    pub seat_label: String,
}

/// Admission controller over an explicitly passed store handle
pub struct SeatAdmission<S> {
    store: Arc<S>,
}

impl<S> Clone for SeatAdmission<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: ReservationStore> SeatAdmission<S> {
    pub fn new(store: S) -> Self {
        Self {
            store: Arc::new(store),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Admits or rejects a reservation for one seat on one trip.
    ///
    /// On success the returned ticket carries the trip's price at the moment
    /// of the insert and a store-assigned purchase time. `SeatTaken`, `TripNotFound`,
    /// `UserNotFound` and `InvalidInput` create nothing.
    #[tracing::instrument(
        skip(self, request),
        fields(trip_id = %request.trip_id, user_id = %request.user_id)
    )]
    pub async fn reserve(&self, request: ReserveRequest) -> Result<Ticket, AdmissionError> {
        let seat = SeatLabel::parse(&request.seat_label)?;

        let trip = self
            .store
            .find_trip(request.trip_id)
            .await
            .map_err(|e| lookup_error(e, request.trip_id))?
            .ok_or(AdmissionError::TripNotFound(request.trip_id))?;

        let user_known = self
            .store
            .user_exists(request.user_id)
            .await
            .map_err(|e| lookup_error(e, request.trip_id))?;
        if !user_known {
            return Err(AdmissionError::UserNotFound(request.user_id));
        }

        let new_ticket = NewTicket {
            trip_id: trip.id,
            user_id: request.user_id,
            seat_label: seat.into_inner(),
        };

        match self.store.insert_ticket(&new_ticket).await {
            Ok(ticket) => {
                tracing::info!(
                    ticket_id = %ticket.id,
                    seat_label = %ticket.seat_label,
                    price_cents = ticket.price_cents,
                    "Seat admitted"
                );
                Ok(ticket)
            }
            Err(StoreError::UniqueViolation) => {
                tracing::warn!(seat_label = %new_ticket.seat_label, "Seat already taken");
                Err(AdmissionError::SeatTaken {
                    trip_id: new_ticket.trip_id,
                    seat_label: new_ticket.seat_label,
                })
            }
            Err(StoreError::ForeignKeyViolation(constraint)) => {
                // Trip or user removed after the lookups above
                if constraint.as_deref().is_some_and(|c| c.contains("user")) {
                    Err(AdmissionError::UserNotFound(new_ticket.user_id))
                } else {
                    Err(AdmissionError::TripNotFound(new_ticket.trip_id))
                }
            }
            Err(StoreError::Unavailable(msg)) => {
                tracing::error!(error = %msg, "Reservation store unavailable");
                Err(AdmissionError::Transient(msg))
            }
            Err(StoreError::Other(msg)) => {
                tracing::error!(error = %msg, "Reservation insert failed");
                Err(AdmissionError::Internal(msg))
            }
        }
    }

    /// Cancels the caller's own ticket, releasing the seat for new admissions.
    /// Cancelling an already cancelled ticket returns it unchanged.
    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, ticket_id: Uuid, user_id: Uuid) -> Result<Ticket, AdmissionError> {
        let ticket = self
            .store
            .cancel_ticket(ticket_id, user_id)
            .await
            .map_err(|e| match e {
                StoreError::Unavailable(msg) => AdmissionError::Transient(msg),
                other => AdmissionError::Internal(other.to_string()),
            })?
            .ok_or(AdmissionError::TicketNotFound(ticket_id))?;

        tracing::info!(ticket_id = %ticket.id, seat_label = %ticket.seat_label, "Ticket cancelled");

        Ok(ticket)
    }
}

fn lookup_error(err: StoreError, trip_id: Uuid) -> AdmissionError {
    match err {
        StoreError::Unavailable(msg) => AdmissionError::Transient(msg),
        other => {
            tracing::error!(%trip_id, error = %other, "Reservation lookup failed");
            AdmissionError::Internal(other.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ticket::TicketStatus;
    use chrono::{Duration, Utc};

    fn trip(price_cents: i64) -> Trip {
        let departure_at = Utc::now() + Duration::days(1);
        Trip {
            id: Uuid::new_v4(),
            bus_id: Uuid::new_v4(),
            route_id: Uuid::new_v4(),
            departure_at,
            arrival_at: departure_at + Duration::hours(4),
            price_cents,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn setup(price_cents: i64) -> (SeatAdmission<MemoryReservationStore>, Trip) {
        let store = MemoryReservationStore::new();
        let t = trip(price_cents);
        store.add_trip(t.clone());
        (SeatAdmission::new(store), t)
    }

    fn request(trip_id: Uuid, user_id: Uuid, seat: &str) -> ReserveRequest {
        ReserveRequest {
            trip_id,
            user_id,
            seat_label: seat.to_string(),
        }
    }

    #[test]
    fn test_seat_label_parsing() {
        assert_eq!(SeatLabel::parse("  A3 ").unwrap().as_str(), "A3");
        assert_eq!(SeatLabel::parse("b12").unwrap().as_str(), "b12");

        assert!(matches!(
            SeatLabel::parse(""),
            Err(AdmissionError::InvalidInput(_))
        ));
        assert!(matches!(
            SeatLabel::parse("   "),
            Err(AdmissionError::InvalidInput(_))
        ));
        assert!(matches!(
            SeatLabel::parse("A\n1"),
            Err(AdmissionError::InvalidInput(_))
        ));
        assert!(SeatLabel::parse(&"X".repeat(SeatLabel::MAX_LEN)).is_ok());
        assert!(SeatLabel::parse(&"X".repeat(SeatLabel::MAX_LEN + 1)).is_err());
    }

    #[tokio::test]
    async fn test_first_buyer_wins_then_other_seat_is_free() {
        let (admission, t1) = setup(45_000);
        let u1 = Uuid::new_v4();
        let u2 = Uuid::new_v4();
        admission.store().add_user(u1);
        admission.store().add_user(u2);

        let ticket = admission.reserve(request(t1.id, u1, "A1")).await.unwrap();
        assert_eq!(ticket.seat_label, "A1");
        assert_eq!(ticket.trip_id, t1.id);
        assert_eq!(ticket.user_id, u1);
        assert_eq!(ticket.price_cents, t1.price_cents);
        assert_eq!(ticket.status, TicketStatus::Active);

        let second = admission.reserve(request(t1.id, u2, "A1")).await;
        assert!(matches!(
            second,
            Err(AdmissionError::SeatTaken { ref seat_label, .. }) if seat_label == "A1"
        ));

        let other_seat = admission.reserve(request(t1.id, u2, "A2")).await.unwrap();
        assert_eq!(other_seat.seat_label, "A2");
        assert_ne!(other_seat.id, ticket.id);
    }

    #[tokio::test]
    async fn test_same_user_cannot_take_seat_twice() {
        let (admission, t1) = setup(10_000);
        let u1 = Uuid::new_v4();
        admission.store().add_user(u1);

        admission.reserve(request(t1.id, u1, "C4")).await.unwrap();
        let again = admission.reserve(request(t1.id, u1, "C4")).await;

        assert!(matches!(again, Err(AdmissionError::SeatTaken { .. })));
        assert_eq!(admission.store().active_tickets_for(t1.id, "C4"), 1);
    }

    #[tokio::test]
    async fn test_same_seat_on_different_trips_is_independent() {
        let (admission, t1) = setup(10_000);
        let t2 = trip(12_000);
        admission.store().add_trip(t2.clone());
        let u1 = Uuid::new_v4();
        admission.store().add_user(u1);

        admission.reserve(request(t1.id, u1, "A1")).await.unwrap();
        let on_t2 = admission.reserve(request(t2.id, u1, "A1")).await.unwrap();

        assert_eq!(on_t2.price_cents, 12_000);
    }

    #[tokio::test]
    async fn test_unknown_trip_creates_nothing() {
        let (admission, _) = setup(10_000);
        let u1 = Uuid::new_v4();
        admission.store().add_user(u1);
        let missing = Uuid::new_v4();

        let result = admission.reserve(request(missing, u1, "A1")).await;

        assert!(matches!(result, Err(AdmissionError::TripNotFound(id)) if id == missing));
        assert!(admission.store().tickets().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_user_creates_nothing() {
        let (admission, t1) = setup(10_000);
        let stranger = Uuid::new_v4();

        let result = admission.reserve(request(t1.id, stranger, "A1")).await;

        assert!(matches!(result, Err(AdmissionError::UserNotFound(id)) if id == stranger));
        assert!(admission.store().tickets().is_empty());
    }

    #[tokio::test]
    async fn test_blank_seat_rejected_before_lookup() {
        let (admission, _) = setup(10_000);

        // Neither trip nor user exist; validation must fire first
        let result = admission
            .reserve(request(Uuid::new_v4(), Uuid::new_v4(), "  "))
            .await;

        assert!(matches!(result, Err(AdmissionError::InvalidInput(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_ten_concurrent_buyers_one_seat() {
        let (admission, t1) = setup(30_000);
        let users: Vec<Uuid> = (0..10).map(|_| Uuid::new_v4()).collect();
        for u in &users {
            admission.store().add_user(*u);
        }

        let handles: Vec<_> = users
            .iter()
            .map(|u| {
                let admission = admission.clone();
                let req = request(t1.id, *u, "B1");
                tokio::spawn(async move { admission.reserve(req).await })
            })
            .collect();

        let mut admitted = 0;
        let mut taken = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => admitted += 1,
                Err(AdmissionError::SeatTaken { .. }) => taken += 1,
                Err(other) => panic!("unexpected outcome: {other}"),
            }
        }

        assert_eq!(admitted, 1);
        assert_eq!(taken, 9);
        assert_eq!(admission.store().active_tickets_for(t1.id, "B1"), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_buyers_on_distinct_seats_all_succeed() {
        let (admission, t1) = setup(30_000);
        let user = Uuid::new_v4();
        admission.store().add_user(user);

        let handles: Vec<_> = (1..=8)
            .map(|n| {
                let admission = admission.clone();
                let req = request(t1.id, user, &format!("D{n}"));
                tokio::spawn(async move { admission.reserve(req).await })
            })
            .collect();

        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
        assert_eq!(admission.store().tickets().len(), 8);
    }

    #[tokio::test]
    async fn test_retry_after_failure_before_write_admits_once() {
        let (admission, t1) = setup(20_000);
        let u1 = Uuid::new_v4();
        admission.store().add_user(u1);
        admission.store().inject_fault(InjectedFault::BeforeWrite);

        let first = admission.reserve(request(t1.id, u1, "A1")).await;
        assert!(matches!(first, Err(AdmissionError::Transient(_))));
        assert_eq!(admission.store().active_tickets_for(t1.id, "A1"), 0);

        admission.reserve(request(t1.id, u1, "A1")).await.unwrap();
        assert_eq!(admission.store().active_tickets_for(t1.id, "A1"), 1);
    }

    #[tokio::test]
    async fn test_retry_after_lost_acknowledgement_never_double_admits() {
        let (admission, t1) = setup(20_000);
        let u1 = Uuid::new_v4();
        admission.store().add_user(u1);
        admission.store().inject_fault(InjectedFault::AfterWrite);

        let first = admission.reserve(request(t1.id, u1, "A1")).await;
        assert!(matches!(first, Err(AdmissionError::Transient(_))));

        let retry = admission.reserve(request(t1.id, u1, "A1")).await;
        assert!(matches!(retry, Err(AdmissionError::SeatTaken { .. })));
        assert_eq!(admission.store().active_tickets_for(t1.id, "A1"), 1);
    }

    #[tokio::test]
    async fn test_cancel_releases_seat() {
        let (admission, t1) = setup(20_000);
        let u1 = Uuid::new_v4();
        let u2 = Uuid::new_v4();
        admission.store().add_user(u1);
        admission.store().add_user(u2);

        let ticket = admission.reserve(request(t1.id, u1, "A1")).await.unwrap();
        let cancelled = admission.cancel(ticket.id, u1).await.unwrap();
        assert_eq!(cancelled.status, TicketStatus::Cancelled);
        assert!(cancelled.cancelled_at.is_some());

        let again = admission.cancel(ticket.id, u1).await.unwrap();
        assert_eq!(again.cancelled_at, cancelled.cancelled_at);

        let resold = admission.reserve(request(t1.id, u2, "A1")).await.unwrap();
        assert_eq!(resold.user_id, u2);
        assert_eq!(admission.store().active_tickets_for(t1.id, "A1"), 1);
    }

    #[tokio::test]
    async fn test_cannot_cancel_someone_elses_ticket() {
        let (admission, t1) = setup(20_000);
        let owner = Uuid::new_v4();
        let other = Uuid::new_v4();
        admission.store().add_user(owner);
        admission.store().add_user(other);

        let ticket = admission.reserve(request(t1.id, owner, "A1")).await.unwrap();
        let result = admission.cancel(ticket.id, other).await;

        assert!(matches!(result, Err(AdmissionError::TicketNotFound(id)) if id == ticket.id));
        assert_eq!(admission.store().active_tickets_for(t1.id, "A1"), 1);
    }

    /// Store that runs `between` after the trip and user lookups and before
    /// the insert, standing in for a concurrent writer
    struct Interleaved<F> {
        inner: MemoryReservationStore,
        between: F,
    }

    #[async_trait]
    impl<F> ReservationStore for Interleaved<F>
    where
        F: Fn(&MemoryReservationStore) + Send + Sync,
    {
        async fn find_trip(&self, trip_id: Uuid) -> Result<Option<Trip>, StoreError> {
            self.inner.find_trip(trip_id).await
        }

        async fn user_exists(&self, user_id: Uuid) -> Result<bool, StoreError> {
            let known = self.inner.user_exists(user_id).await?;
            (self.between)(&self.inner);
            Ok(known)
        }

        async fn insert_ticket(&self, ticket: &NewTicket) -> Result<Ticket, StoreError> {
            self.inner.insert_ticket(ticket).await
        }

        async fn cancel_ticket(
            &self,
            ticket_id: Uuid,
            user_id: Uuid,
        ) -> Result<Option<Ticket>, StoreError> {
            self.inner.cancel_ticket(ticket_id, user_id).await
        }
    }

    fn interleaved<F>(t: &Trip, user_id: Uuid, between: F) -> SeatAdmission<Interleaved<F>>
    where
        F: Fn(&MemoryReservationStore) + Send + Sync,
    {
        let inner = MemoryReservationStore::new();
        inner.add_trip(t.clone());
        inner.add_user(user_id);
        SeatAdmission::new(Interleaved { inner, between })
    }

    #[tokio::test]
    async fn test_ticket_takes_price_in_effect_at_insert() {
        let t1 = trip(1_000);
        let u1 = Uuid::new_v4();
        let trip_id = t1.id;
        let admission = interleaved(&t1, u1, move |store| store.set_trip_price(trip_id, 2_000));

        let ticket = admission.reserve(request(t1.id, u1, "A1")).await.unwrap();

        assert_eq!(ticket.price_cents, 2_000);
    }

    #[tokio::test]
    async fn test_user_removed_before_insert_is_not_found() {
        let t1 = trip(1_000);
        let u1 = Uuid::new_v4();
        let admission = interleaved(&t1, u1, move |store| store.remove_user(u1));

        let result = admission.reserve(request(t1.id, u1, "A1")).await;

        assert!(matches!(result, Err(AdmissionError::UserNotFound(id)) if id == u1));
        assert!(admission.store().inner.tickets().is_empty());
    }

    #[tokio::test]
    async fn test_trip_removed_before_insert_is_not_found() {
        let t1 = trip(1_000);
        let u1 = Uuid::new_v4();
        let trip_id = t1.id;
        let admission = interleaved(&t1, u1, move |store| store.remove_trip(trip_id));

        let result = admission.reserve(request(t1.id, u1, "A1")).await;

        assert!(matches!(result, Err(AdmissionError::TripNotFound(id)) if id == trip_id));
        assert!(admission.store().inner.tickets().is_empty());
    }

    #[tokio::test]
    async fn test_lookup_outage_is_transient_and_retryable() {
        let (admission, t1) = setup(20_000);
        let u1 = Uuid::new_v4();
        admission.store().add_user(u1);
        admission.store().inject_fault(InjectedFault::Lookup);

        let first = admission.reserve(request(t1.id, u1, "A1")).await;
        assert!(matches!(first, Err(AdmissionError::Transient(_))));
        assert!(admission.store().tickets().is_empty());

        admission.reserve(request(t1.id, u1, "A1")).await.unwrap();
        assert_eq!(admission.store().active_tickets_for(t1.id, "A1"), 1);
    }
}
