use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::middleware::{auth::require_auth, session::AppState};
use crate::api::{optional, required, DeletedResponse};
use crate::error::{AppError, Result};
use crate::models::bus::{Bus, CreateBusData, UpdateBusData};

#[derive(Debug, Deserialize)]
struct BusRequest {
    bus_number: Option<i32>,
    plate: Option<String>,
    driver: Option<String>,
    company_id: Option<Uuid>,
}

async fn list_buses(State(state): State<AppState>) -> Result<Json<Vec<Bus>>> {
    Ok(Json(Bus::list(&state.pool).await?))
}

/// Buses that run at least one trip on the route
async fn list_buses_by_route(
    State(state): State<AppState>,
    Path(route_id): Path<Uuid>,
) -> Result<Json<Vec<Bus>>> {
    Ok(Json(Bus::list_by_route(&state.pool, route_id).await?))
}

async fn get_bus(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Bus>> {
    Bus::find_by_id(&state.pool, id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("Bus"))
}

async fn create_bus(
    State(state): State<AppState>,
    Json(body): Json<BusRequest>,
) -> Result<(StatusCode, Json<Bus>)> {
    let bus_number = body
        .bus_number
        .ok_or_else(|| AppError::Validation("bus_number is required".to_string()))?;
    let company_id = body
        .company_id
        .ok_or_else(|| AppError::Validation("company_id is required".to_string()))?;
    let plate = required(body.plate, "plate")?.to_uppercase();
    let driver = required(body.driver, "driver")?;

    let bus = Bus::create(
        &state.pool,
        CreateBusData {
            bus_number,
            plate,
            driver,
            company_id,
        },
    )
    .await
    .map_err(|e| AppError::from_write(e, "Bus"))?;

    tracing::info!(bus_id = %bus.id, plate = %bus.plate, "Registered bus");

    Ok((StatusCode::CREATED, Json(bus)))
}

async fn update_bus(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<BusRequest>,
) -> Result<Json<Bus>> {
    let data = UpdateBusData {
        bus_number: body.bus_number,
        plate: optional(body.plate).map(|p| p.to_uppercase()),
        driver: optional(body.driver),
        company_id: body.company_id,
    };

    Bus::update(&state.pool, id, data)
        .await
        .map_err(|e| AppError::from_write(e, "Bus"))?
        .map(Json)
        .ok_or_else(|| AppError::not_found("Bus"))
}

async fn delete_bus(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeletedResponse>> {
    let deleted = Bus::delete(&state.pool, id)
        .await
        .map_err(|e| AppError::from_write(e, "Bus"))?;

    if !deleted {
        return Err(AppError::not_found("Bus"));
    }

    Ok(DeletedResponse::new("Bus"))
}

pub fn router() -> Router<AppState> {
    let public = Router::new()
        .route("/api/buses", get(list_buses))
        .route("/api/buses/:id", get(get_bus))
        .route("/api/buses/route/:route_id", get(list_buses_by_route));

    let protected = Router::new()
        .route("/api/buses", post(create_bus))
        .route("/api/buses/:id", put(update_bus).delete(delete_bus))
        .route_layer(middleware::from_fn(require_auth));

    public.merge(protected)
}
