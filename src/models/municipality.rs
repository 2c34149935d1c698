use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// A town a route passes through. Coordinates feed the route map.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Municipality {
    pub id: Uuid,
    pub name: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MunicipalityData {
    pub name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl MunicipalityData {
    /// Latitude must be within [-90, 90] and longitude within [-180, 180]
    pub fn coordinates_valid(&self) -> bool {
        let lat_ok = self.latitude.map_or(true, |v| (-90.0..=90.0).contains(&v));
        let lng_ok = self.longitude.map_or(true, |v| (-180.0..=180.0).contains(&v));
        lat_ok && lng_ok
    }
}

impl Municipality {
    pub async fn create(
        pool: &PgPool,
        name: &str,
        latitude: Option<f64>,
        longitude: Option<f64>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO municipalities (name, latitude, longitude)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(name)
        .bind(latitude)
        .bind(longitude)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM municipalities WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM municipalities ORDER BY name ASC")
            .fetch_all(pool)
            .await
    }

    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        data: &MunicipalityData,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            UPDATE municipalities
            SET
                name = COALESCE($2, name),
                latitude = COALESCE($3, latitude),
                longitude = COALESCE($4, longitude)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&data.name)
        .bind(data.latitude)
        .bind(data.longitude)
        .fetch_optional(pool)
        .await
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM municipalities WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinate_bounds() {
        let ok = MunicipalityData {
            name: Some("Tunja".into()),
            latitude: Some(5.535),
            longitude: Some(-73.367),
        };
        assert!(ok.coordinates_valid());

        let bad = MunicipalityData {
            name: None,
            latitude: Some(91.0),
            longitude: None,
        };
        assert!(!bad.coordinates_valid());

        let missing = MunicipalityData {
            name: Some("Paipa".into()),
            latitude: None,
            longitude: None,
        };
        assert!(missing.coordinates_valid());
    }
}
