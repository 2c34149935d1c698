use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::middleware::{auth::require_auth, session::AppState};
use crate::api::{non_negative_cents, DeletedResponse};
use crate::error::{AppError, Result};
use crate::models::{
    route::Route,
    trip::{schedule_is_valid, CreateTripData, Trip, TripUpdate, UpdateTripData},
};

#[derive(Debug, Deserialize)]
struct TripRequest {
    bus_id: Option<Uuid>,
    route_id: Option<Uuid>,
    departure_at: Option<DateTime<Utc>>,
    arrival_at: Option<DateTime<Utc>>,
    price_cents: Option<i64>,
}

#[derive(Debug, Serialize)]
struct SeatMap {
    trip_id: Uuid,
    taken: Vec<String>,
}

async fn list_trips(State(state): State<AppState>) -> Result<Json<Vec<Trip>>> {
    Ok(Json(Trip::list(&state.pool).await?))
}

async fn get_trip(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Trip>> {
    Trip::find_by_id(&state.pool, id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("Trip"))
}

/// Seats already sold on a trip, for the seat picker
async fn trip_seats(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<SeatMap>> {
    Trip::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("Trip"))?;

    let taken = Trip::taken_seats(&state.pool, id).await?;

    Ok(Json(SeatMap { trip_id: id, taken }))
}

async fn create_trip(
    State(state): State<AppState>,
    Json(body): Json<TripRequest>,
) -> Result<(StatusCode, Json<Trip>)> {
    let (Some(bus_id), Some(route_id), Some(departure_at), Some(arrival_at)) =
        (body.bus_id, body.route_id, body.departure_at, body.arrival_at)
    else {
        return Err(AppError::Validation(
            "bus_id, route_id, departure_at and arrival_at are required".to_string(),
        ));
    };

    if !schedule_is_valid(departure_at, arrival_at) {
        return Err(AppError::Validation(
            "arrival_at must be after departure_at".to_string(),
        ));
    }

    let route = Route::find_by_id(&state.pool, route_id)
        .await?
        .ok_or_else(|| AppError::Validation("Route not found".to_string()))?;

    let price_cents = match body.price_cents {
        Some(price) => non_negative_cents(price, "price_cents")?,
        None => route.fare_cents,
    };

    let trip = Trip::create(
        &state.pool,
        CreateTripData {
            bus_id,
            route_id,
            departure_at,
            arrival_at,
            price_cents,
        },
    )
    .await
    .map_err(|e| AppError::from_write(e, "Trip"))?;

    tracing::info!(
        trip_id = %trip.id,
        route_id = %route_id,
        departure_at = %trip.departure_at,
        "Scheduled trip"
    );

    Ok((StatusCode::CREATED, Json(trip)))
}

async fn update_trip(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<TripRequest>,
) -> Result<Json<Trip>> {
    if let Some(price) = body.price_cents {
        non_negative_cents(price, "price_cents")?;
    }

    // A partial schedule is checked against the stored half
    if body.departure_at.is_some() || body.arrival_at.is_some() {
        let current = Trip::find_by_id(&state.pool, id)
            .await?
            .ok_or_else(|| AppError::not_found("Trip"))?;
        let departure_at = body.departure_at.unwrap_or(current.departure_at);
        let arrival_at = body.arrival_at.unwrap_or(current.arrival_at);

        if !schedule_is_valid(departure_at, arrival_at) {
            return Err(AppError::Validation(
                "arrival_at must be after departure_at".to_string(),
            ));
        }
    }

    let data = UpdateTripData {
        bus_id: body.bus_id,
        route_id: body.route_id,
        departure_at: body.departure_at,
        arrival_at: body.arrival_at,
        price_cents: body.price_cents,
    };

    match Trip::update_unsold(&state.pool, id, data)
        .await
        .map_err(|e| AppError::from_write(e, "Trip"))?
    {
        TripUpdate::Updated(trip) => Ok(Json(trip)),
        TripUpdate::NotFound => Err(AppError::not_found("Trip")),
        TripUpdate::SalesStarted => Err(AppError::Conflict(
            "Trip already has tickets sold and can no longer be changed".to_string(),
        )),
    }
}

async fn delete_trip(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeletedResponse>> {
    let deleted = Trip::delete(&state.pool, id)
        .await
        .map_err(|e| AppError::from_write(e, "Trip"))?;

    if !deleted {
        return Err(AppError::not_found("Trip"));
    }

    tracing::info!(trip_id = %id, "Deleted trip");

    Ok(DeletedResponse::new("Trip"))
}

pub fn router() -> Router<AppState> {
    let public = Router::new()
        .route("/api/trips", get(list_trips))
        .route("/api/trips/:id", get(get_trip))
        .route("/api/trips/:id/seats", get(trip_seats));

    let protected = Router::new()
        .route("/api/trips", post(create_trip))
        .route("/api/trips/:id", put(update_trip).delete(delete_trip))
        .route_layer(middleware::from_fn(require_auth));

    public.merge(protected)
}
