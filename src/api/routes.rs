use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::middleware::{auth::require_auth, session::AppState};
use crate::api::{non_negative_cents, optional, required, DeletedResponse};
use crate::error::{AppError, Result};
use crate::models::{
    company::Company,
    route::{CreateRouteData, Route, RouteWithCompany, UpdateRouteData},
    route_stop::{MapStop, RouteStop},
    trip::Trip,
};

#[derive(Debug, Deserialize)]
struct RouteRequest {
    origin: Option<String>,
    destination: Option<String>,
    company_id: Option<Uuid>,
    fare_cents: Option<i64>,
}

/// Everything the route map needs in one response
#[derive(Debug, Serialize)]
struct RouteMap {
    route: Route,
    stops: Vec<MapStop>,
}

async fn list_routes(State(state): State<AppState>) -> Result<Json<Vec<RouteWithCompany>>> {
    Ok(Json(Route::list_with_company(&state.pool).await?))
}

async fn list_routes_by_company(
    State(state): State<AppState>,
    Path(company_id): Path<Uuid>,
) -> Result<Json<Vec<RouteWithCompany>>> {
    Ok(Json(Route::list_by_company(&state.pool, company_id).await?))
}

async fn get_route(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Route>> {
    Route::find_by_id(&state.pool, id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("Route"))
}

async fn route_map(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<RouteMap>> {
    let route = Route::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("Route"))?;
    let stops = RouteStop::list_for_map(&state.pool, id).await?;

    Ok(Json(RouteMap { route, stops }))
}

async fn upcoming_trips(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Trip>>> {
    Ok(Json(Trip::list_upcoming_by_route(&state.pool, id).await?))
}

async fn ensure_company(state: &AppState, company_id: Uuid) -> Result<()> {
    Company::find_by_id(&state.pool, company_id)
        .await?
        .ok_or_else(|| AppError::Validation("Company not found".to_string()))?;
    Ok(())
}

async fn create_route(
    State(state): State<AppState>,
    Json(body): Json<RouteRequest>,
) -> Result<(StatusCode, Json<Route>)> {
    let origin = required(body.origin, "origin")?;
    let destination = required(body.destination, "destination")?;
    let company_id = body
        .company_id
        .ok_or_else(|| AppError::Validation("company_id is required".to_string()))?;
    let fare_cents = non_negative_cents(body.fare_cents.unwrap_or(0), "fare_cents")?;

    ensure_company(&state, company_id).await?;

    let route = Route::create(
        &state.pool,
        CreateRouteData {
            origin,
            destination,
            company_id,
            fare_cents,
        },
    )
    .await
    .map_err(|e| AppError::from_write(e, "Route"))?;

    tracing::info!(route_id = %route.id, "Created route");

    Ok((StatusCode::CREATED, Json(route)))
}

async fn update_route(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<RouteRequest>,
) -> Result<Json<Route>> {
    if let Some(fare) = body.fare_cents {
        non_negative_cents(fare, "fare_cents")?;
    }
    if let Some(company_id) = body.company_id {
        ensure_company(&state, company_id).await?;
    }

    let route = Route::update(
        &state.pool,
        id,
        UpdateRouteData {
            origin: optional(body.origin),
            destination: optional(body.destination),
            company_id: body.company_id,
            fare_cents: body.fare_cents,
        },
    )
    .await
    .map_err(|e| AppError::from_write(e, "Route"))?
    .ok_or_else(|| AppError::not_found("Route"))?;

    Ok(Json(route))
}

async fn delete_route(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeletedResponse>> {
    let deleted = Route::delete(&state.pool, id)
        .await
        .map_err(|e| AppError::from_write(e, "Route"))?;

    if !deleted {
        return Err(AppError::not_found("Route"));
    }

    tracing::info!(route_id = %id, "Deleted route");

    Ok(DeletedResponse::new("Route"))
}

pub fn router() -> Router<AppState> {
    let public = Router::new()
        .route("/api/routes", get(list_routes))
        .route("/api/routes/:id", get(get_route))
        .route("/api/routes/:id/stops", get(route_map))
        .route("/api/routes/:id/trips", get(upcoming_trips))
        .route("/api/routes/company/:company_id", get(list_routes_by_company));

    let protected = Router::new()
        .route("/api/routes", post(create_route))
        .route("/api/routes/:id", put(update_route).delete(delete_route))
        .route_layer(middleware::from_fn(require_auth));

    public.merge(protected)
}
