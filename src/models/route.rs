use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Route {
    pub id: Uuid,
    pub origin: String,
    pub destination: String,
    pub company_id: Uuid,
    pub fare_cents: i64, // Default price for trips on this route
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Route joined with the operating company's name, as listed to riders
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RouteWithCompany {
    pub id: Uuid,
    pub origin: String,
    pub destination: String,
    pub company_id: Uuid,
    pub company_name: String,
    pub fare_cents: i64,
}

#[derive(Debug, Clone)]
pub struct CreateRouteData {
    pub origin: String,
    pub destination: String,
    pub company_id: Uuid,
    pub fare_cents: i64,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateRouteData {
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub company_id: Option<Uuid>,
    pub fare_cents: Option<i64>,
}

impl Route {
    pub async fn create(pool: &PgPool, data: CreateRouteData) -> Result<Self, sqlx::Error> {
        let route = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO routes (origin, destination, company_id, fare_cents)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(&data.origin)
        .bind(&data.destination)
        .bind(data.company_id)
        .bind(data.fare_cents)
        .fetch_one(pool)
        .await?;

        Ok(route)
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let route = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM routes WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(route)
    }

    /// Lists all routes with their company name
    pub async fn list_with_company(pool: &PgPool) -> Result<Vec<RouteWithCompany>, sqlx::Error> {
        let routes = sqlx::query_as::<_, RouteWithCompany>(
            r#"
            SELECT r.id, r.origin, r.destination, r.company_id,
                   c.name AS company_name, r.fare_cents
            FROM routes r
            JOIN companies c ON c.id = r.company_id
            ORDER BY r.origin, r.destination
            "#,
        )
        .fetch_all(pool)
        .await?;

        Ok(routes)
    }

    /// Lists routes operated by one company
    pub async fn list_by_company(
        pool: &PgPool,
        company_id: Uuid,
    ) -> Result<Vec<RouteWithCompany>, sqlx::Error> {
        let routes = sqlx::query_as::<_, RouteWithCompany>(
            r#"
            SELECT r.id, r.origin, r.destination, r.company_id,
                   c.name AS company_name, r.fare_cents
            FROM routes r
            JOIN companies c ON c.id = r.company_id
            WHERE r.company_id = $1
            ORDER BY r.origin, r.destination
            "#,
        )
        .bind(company_id)
        .fetch_all(pool)
        .await?;

        Ok(routes)
    }

    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        data: UpdateRouteData,
    ) -> Result<Option<Self>, sqlx::Error> {
        let route = sqlx::query_as::<_, Self>(
            r#"
            UPDATE routes
            SET
                origin = COALESCE($2, origin),
                destination = COALESCE($3, destination),
                company_id = COALESCE($4, company_id),
                fare_cents = COALESCE($5, fare_cents),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(data.origin)
        .bind(data.destination)
        .bind(data.company_id)
        .bind(data.fare_cents)
        .fetch_optional(pool)
        .await?;

        Ok(route)
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM routes WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
