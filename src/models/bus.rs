use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Bus {
    pub id: Uuid,
    pub bus_number: i32,
    pub plate: String,
    pub driver: String,
    pub company_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateBusData {
    pub bus_number: i32,
    pub plate: String,
    pub driver: String,
    pub company_id: Uuid,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateBusData {
    pub bus_number: Option<i32>,
    pub plate: Option<String>,
    pub driver: Option<String>,
    pub company_id: Option<Uuid>,
}

impl Bus {
    pub async fn create(pool: &PgPool, data: CreateBusData) -> Result<Self, sqlx::Error> {
        let bus = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO buses (bus_number, plate, driver, company_id)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(data.bus_number)
        .bind(&data.plate)
        .bind(&data.driver)
        .bind(data.company_id)
        .fetch_one(pool)
        .await?;

        Ok(bus)
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let bus = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM buses WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(bus)
    }

    pub async fn list(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        let buses = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM buses
            ORDER BY bus_number ASC
            "#,
        )
        .fetch_all(pool)
        .await?;

        Ok(buses)
    }

    /// Buses that run at least one trip on the given route
    pub async fn list_by_route(pool: &PgPool, route_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let buses = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM buses
            WHERE id IN (SELECT bus_id FROM trips WHERE route_id = $1)
            ORDER BY bus_number ASC
            "#,
        )
        .bind(route_id)
        .fetch_all(pool)
        .await?;

        Ok(buses)
    }

    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        data: UpdateBusData,
    ) -> Result<Option<Self>, sqlx::Error> {
        let bus = sqlx::query_as::<_, Self>(
            r#"
            UPDATE buses
            SET
                bus_number = COALESCE($2, bus_number),
                plate = COALESCE($3, plate),
                driver = COALESCE($4, driver),
                company_id = COALESCE($5, company_id),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(data.bus_number)
        .bind(data.plate)
        .bind(data.driver)
        .bind(data.company_id)
        .fetch_optional(pool)
        .await?;

        Ok(bus)
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM buses WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
