use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// A scheduled departure of one bus on one route
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Trip {
    pub id: Uuid,
    pub bus_id: Uuid,
    pub route_id: Uuid,
    pub departure_at: DateTime<Utc>,
    pub arrival_at: DateTime<Utc>,
    pub price_cents: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateTripData {
    pub bus_id: Uuid,
    pub route_id: Uuid,
    pub departure_at: DateTime<Utc>,
    pub arrival_at: DateTime<Utc>,
    pub price_cents: i64,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateTripData {
    pub bus_id: Option<Uuid>,
    pub route_id: Option<Uuid>,
    pub departure_at: Option<DateTime<Utc>>,
    pub arrival_at: Option<DateTime<Utc>>,
    pub price_cents: Option<i64>,
}

/// Outcome of an update attempt on a trip
#[derive(Debug)]
pub enum TripUpdate {
    Updated(Trip),
    NotFound,
    /// Tickets are already sold; the schedule and price are frozen
    SalesStarted,
}

/// A trip must arrive after it departs
pub fn schedule_is_valid(departure_at: DateTime<Utc>, arrival_at: DateTime<Utc>) -> bool {
    arrival_at > departure_at
}

impl Trip {
    pub async fn create(pool: &PgPool, data: CreateTripData) -> Result<Self, sqlx::Error> {
        let trip = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO trips (bus_id, route_id, departure_at, arrival_at, price_cents)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(data.bus_id)
        .bind(data.route_id)
        .bind(data.departure_at)
        .bind(data.arrival_at)
        .bind(data.price_cents)
        .fetch_one(pool)
        .await?;

        Ok(trip)
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let trip = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM trips WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(trip)
    }

    pub async fn list(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        let trips = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM trips
            ORDER BY departure_at ASC
            "#,
        )
        .fetch_all(pool)
        .await?;

        Ok(trips)
    }

    /// Upcoming departures on a route
    pub async fn list_upcoming_by_route(
        pool: &PgPool,
        route_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let trips = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM trips
            WHERE route_id = $1 AND departure_at >= NOW()
            ORDER BY departure_at ASC
            "#,
        )
        .bind(route_id)
        .fetch_all(pool)
        .await?;

        Ok(trips)
    }

    /// Updates a trip unless it already has active tickets.
    ///
    /// The trip row is locked `FOR UPDATE` before the sales check. Ticket
    /// inserts share-lock the same row, so an in-flight purchase either
    /// commits first (the update is refused) or waits for this commit and
    /// is priced at the new fare.
    pub async fn update_unsold(
        pool: &PgPool,
        id: Uuid,
        data: UpdateTripData,
    ) -> Result<TripUpdate, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let locked: Option<Uuid> = sqlx::query_scalar("SELECT id FROM trips WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Ok(TripUpdate::NotFound);
        }

        let sold: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM tickets WHERE trip_id = $1 AND status = 'active')",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        if sold {
            return Ok(TripUpdate::SalesStarted);
        }

        let trip = sqlx::query_as::<_, Self>(
            r#"
            UPDATE trips
            SET
                bus_id = COALESCE($2, bus_id),
                route_id = COALESCE($3, route_id),
                departure_at = COALESCE($4, departure_at),
                arrival_at = COALESCE($5, arrival_at),
                price_cents = COALESCE($6, price_cents),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(data.bus_id)
        .bind(data.route_id)
        .bind(data.departure_at)
        .bind(data.arrival_at)
        .bind(data.price_cents)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(TripUpdate::Updated(trip))
    }

    /// Seat labels currently held by active tickets
    pub async fn taken_seats(pool: &PgPool, id: Uuid) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT seat_label FROM tickets
            WHERE trip_id = $1 AND status = 'active'
            ORDER BY seat_label ASC
            "#,
        )
        .bind(id)
        .fetch_all(pool)
        .await
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM trips WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_schedule_requires_arrival_after_departure() {
        let departure = Utc::now();

        assert!(schedule_is_valid(departure, departure + Duration::hours(3)));
        assert!(!schedule_is_valid(departure, departure));
        assert!(!schedule_is_valid(departure, departure - Duration::minutes(5)));
    }
}
