use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// Links a municipality to a route at a given position (0 = first stop)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RouteStop {
    pub id: Uuid,
    pub route_id: Uuid,
    pub municipality_id: Uuid,
    pub position: i32,
}

/// A stop resolved to the data the map needs
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MapStop {
    pub position: i32,
    pub municipality_id: Uuid,
    pub name: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl RouteStop {
    pub async fn create(
        pool: &PgPool,
        route_id: Uuid,
        municipality_id: Uuid,
        position: i32,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO route_stops (route_id, municipality_id, position)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(route_id)
        .bind(municipality_id)
        .bind(position)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM route_stops WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM route_stops ORDER BY route_id, position")
            .fetch_all(pool)
            .await
    }

    /// Ordered stops of a route, joined with municipality coordinates
    pub async fn list_for_map(pool: &PgPool, route_id: Uuid) -> Result<Vec<MapStop>, sqlx::Error> {
        sqlx::query_as::<_, MapStop>(
            r#"
            SELECT s.position, m.id AS municipality_id, m.name, m.latitude, m.longitude
            FROM route_stops s
            JOIN municipalities m ON m.id = s.municipality_id
            WHERE s.route_id = $1
            ORDER BY s.position ASC
            "#,
        )
        .bind(route_id)
        .fetch_all(pool)
        .await
    }

    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        route_id: Option<Uuid>,
        municipality_id: Option<Uuid>,
        position: Option<i32>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            UPDATE route_stops
            SET
                route_id = COALESCE($2, route_id),
                municipality_id = COALESCE($3, municipality_id),
                position = COALESCE($4, position)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(route_id)
        .bind(municipality_id)
        .bind(position)
        .fetch_optional(pool)
        .await
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM route_stops WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
