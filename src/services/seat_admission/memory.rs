use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::{ReservationStore, StoreError};
use crate::models::ticket::{NewTicket, Ticket, TicketStatus};
use crate::models::trip::Trip;

/// Where an injected failure strikes relative to the ticket write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFault {
    /// Fail without writing anything
    BeforeWrite,
    /// Persist the ticket, then report the store as unreachable
    AfterWrite,
    /// Fail the next trip lookup as unreachable
    Lookup,
}

#[derive(Default)]
struct State {
    trips: HashMap<Uuid, Trip>,
    users: HashSet<Uuid>,
    tickets: Vec<Ticket>,
    faults: VecDeque<InjectedFault>,
}

/// In-process reservation store.
///
/// The uniqueness check and the insert happen under one lock, giving the
/// same guarantee as the partial unique index in Postgres.
#[derive(Default)]
pub struct MemoryReservationStore {
    state: Mutex<State>,
}

impl MemoryReservationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Other("memory store lock poisoned".to_string()))
    }

    pub fn add_trip(&self, trip: Trip) {
        if let Ok(mut state) = self.state() {
            state.trips.insert(trip.id, trip);
        }
    }

    pub fn add_user(&self, user_id: Uuid) {
        if let Ok(mut state) = self.state() {
            state.users.insert(user_id);
        }
    }

    pub fn remove_trip(&self, trip_id: Uuid) {
        if let Ok(mut state) = self.state() {
            state.trips.remove(&trip_id);
        }
    }

    pub fn remove_user(&self, user_id: Uuid) {
        if let Ok(mut state) = self.state() {
            state.users.remove(&user_id);
        }
    }

    /// Reprices a trip, as an operator edit would
    pub fn set_trip_price(&self, trip_id: Uuid, price_cents: i64) {
        if let Ok(mut state) = self.state() {
            if let Some(trip) = state.trips.get_mut(&trip_id) {
                trip.price_cents = price_cents;
            }
        }
    }

    /// Queues a failure for the next ticket insert
    pub fn inject_fault(&self, fault: InjectedFault) {
        if let Ok(mut state) = self.state() {
            state.faults.push_back(fault);
        }
    }

    pub fn tickets(&self) -> Vec<Ticket> {
        self.state()
            .map(|state| state.tickets.clone())
            .unwrap_or_default()
    }

    pub fn active_tickets_for(&self, trip_id: Uuid, seat_label: &str) -> usize {
        self.state()
            .map(|state| {
                state
                    .tickets
                    .iter()
                    .filter(|t| {
                        t.trip_id == trip_id
                            && t.seat_label == seat_label
                            && t.status == TicketStatus::Active
                    })
                    .count()
            })
            .unwrap_or(0)
    }
}

#[async_trait]
impl ReservationStore for MemoryReservationStore {
    async fn find_trip(&self, trip_id: Uuid) -> Result<Option<Trip>, StoreError> {
        let mut state = self.state()?;
        if state.faults.front() == Some(&InjectedFault::Lookup) {
            state.faults.pop_front();
            return Err(StoreError::Unavailable("injected fault on lookup".to_string()));
        }
        Ok(state.trips.get(&trip_id).cloned())
    }

    async fn user_exists(&self, user_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.state()?.users.contains(&user_id))
    }

    async fn insert_ticket(&self, ticket: &NewTicket) -> Result<Ticket, StoreError> {
        let mut state = self.state()?;
        let fault = state.faults.pop_front();

        if fault == Some(InjectedFault::BeforeWrite) {
            return Err(StoreError::Unavailable("injected fault before write".to_string()));
        }

        let Some(price_cents) = state.trips.get(&ticket.trip_id).map(|t| t.price_cents) else {
            return Err(StoreError::ForeignKeyViolation(Some(
                "tickets_trip_id_fkey".to_string(),
            )));
        };
        if !state.users.contains(&ticket.user_id) {
            return Err(StoreError::ForeignKeyViolation(Some(
                "tickets_user_id_fkey".to_string(),
            )));
        }

        let taken = state.tickets.iter().any(|t| {
            t.trip_id == ticket.trip_id
                && t.seat_label == ticket.seat_label
                && t.status == TicketStatus::Active
        });
        if taken {
            return Err(StoreError::UniqueViolation);
        }

        let created = Ticket {
            id: Uuid::new_v4(),
            trip_id: ticket.trip_id,
            user_id: ticket.user_id,
            seat_label: ticket.seat_label.clone(),
            price_cents,
            status: TicketStatus::Active,
            purchased_at: Utc::now(),
            cancelled_at: None,
        };
        state.tickets.push(created.clone());

        if fault == Some(InjectedFault::AfterWrite) {
            return Err(StoreError::Unavailable("injected fault after write".to_string()));
        }

        Ok(created)
    }

    async fn cancel_ticket(
        &self,
        ticket_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Ticket>, StoreError> {
        let mut state = self.state()?;

        let ticket = state
            .tickets
            .iter_mut()
            .find(|t| t.id == ticket_id && t.user_id == user_id);

        Ok(ticket.map(|t| {
            t.status = TicketStatus::Cancelled;
            t.cancelled_at.get_or_insert_with(Utc::now);
            t.clone()
        }))
    }
}
