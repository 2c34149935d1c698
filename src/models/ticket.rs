use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    Active,
    Cancelled,
}

/// A reservation binding one seat of one trip to one user
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Ticket {
    pub id: Uuid,
    pub trip_id: Uuid,
    pub user_id: Uuid,
    pub seat_label: String,
    pub price_cents: i64,
    pub status: TicketStatus,
    pub purchased_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

/// Ticket joined with trip, route and company, as shown on the receipt
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TicketReceipt {
    pub id: Uuid,
    pub trip_id: Uuid,
    pub user_id: Uuid,
    pub seat_label: String,
    pub price_cents: i64,
    pub status: TicketStatus,
    pub purchased_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub departure_at: DateTime<Utc>,
    pub arrival_at: DateTime<Utc>,
    pub origin: String,
    pub destination: String,
    pub company_name: String,
    pub bus_number: i32,
}

/// Purchase to record. The price is not part of it: the store copies the
/// trip's price at write time.
#[derive(Debug, Clone)]
pub struct NewTicket {
    pub trip_id: Uuid,
    pub user_id: Uuid,
    pub seat_label: String,
}

const RECEIPT_SELECT: &str = r#"
    SELECT t.id, t.trip_id, t.user_id, t.seat_label, t.price_cents, t.status,
           t.purchased_at, t.cancelled_at,
           tr.departure_at, tr.arrival_at,
           r.origin, r.destination,
           c.name AS company_name,
           b.bus_number
    FROM tickets t
    JOIN trips tr ON tr.id = t.trip_id
    JOIN routes r ON r.id = tr.route_id
    JOIN companies c ON c.id = r.company_id
    JOIN buses b ON b.id = tr.bus_id
"#;

impl Ticket {
    /// Inserts an active ticket priced at the trip's current fare.
    ///
    /// The trip row is share-locked for the length of the transaction, so a
    /// concurrent trip edit (which takes `FOR UPDATE`) either commits first
    /// and the ticket gets the new price, or waits and then sees the ticket.
    /// Fails with a unique violation when the seat already has an active
    /// ticket on this trip. `None` when the trip no longer exists.
    pub async fn insert_active(pool: &PgPool, data: &NewTicket) -> Result<Option<Self>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let price_cents: Option<i64> =
            sqlx::query_scalar("SELECT price_cents FROM trips WHERE id = $1 FOR SHARE")
                .bind(data.trip_id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(price_cents) = price_cents else {
            return Ok(None);
        };

        let ticket = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO tickets (trip_id, user_id, seat_label, price_cents, status, purchased_at)
            VALUES ($1, $2, $3, $4, 'active', NOW())
            RETURNING *
            "#,
        )
        .bind(data.trip_id)
        .bind(data.user_id)
        .bind(&data.seat_label)
        .bind(price_cents)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(ticket))
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM tickets WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM tickets ORDER BY purchased_at DESC")
            .fetch_all(pool)
            .await
    }

    pub async fn find_receipt(pool: &PgPool, id: Uuid) -> Result<Option<TicketReceipt>, sqlx::Error> {
        let query = format!("{} WHERE t.id = $1", RECEIPT_SELECT);
        sqlx::query_as::<_, TicketReceipt>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// All of a user's tickets, newest first
    pub async fn list_receipts_by_user(
        pool: &PgPool,
        user_id: Uuid,
    ) -> Result<Vec<TicketReceipt>, sqlx::Error> {
        let query = format!(
            "{} WHERE t.user_id = $1 ORDER BY t.purchased_at DESC",
            RECEIPT_SELECT
        );
        sqlx::query_as::<_, TicketReceipt>(&query)
            .bind(user_id)
            .fetch_all(pool)
            .await
    }

    /// Cancels a ticket owned by `user_id`, freeing its seat.
    ///
    /// Cancelling twice keeps the first cancellation time. Returns `None`
    /// when the ticket does not exist or belongs to someone else.
    pub async fn cancel_owned(
        pool: &PgPool,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            UPDATE tickets
            SET status = 'cancelled',
                cancelled_at = COALESCE(cancelled_at, NOW())
            WHERE id = $1 AND user_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM tickets WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

impl TicketReceipt {
    pub fn is_active(&self) -> bool {
        self.status == TicketStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(TicketStatus::Active).unwrap(),
            serde_json::json!("active")
        );
        assert_eq!(
            serde_json::from_value::<TicketStatus>(serde_json::json!("cancelled")).unwrap(),
            TicketStatus::Cancelled
        );
    }
}
