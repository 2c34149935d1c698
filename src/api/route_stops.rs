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
use crate::api::DeletedResponse;
use crate::error::{AppError, Result};
use crate::models::route_stop::RouteStop;

#[derive(Debug, Deserialize)]
struct RouteStopRequest {
    route_id: Option<Uuid>,
    municipality_id: Option<Uuid>,
    position: Option<i32>,
}

fn check_position(position: Option<i32>) -> Result<()> {
    match position {
        Some(p) if p < 0 => Err(AppError::Validation(
            "position cannot be negative".to_string(),
        )),
        _ => Ok(()),
    }
}

async fn list_route_stops(State(state): State<AppState>) -> Result<Json<Vec<RouteStop>>> {
    Ok(Json(RouteStop::list(&state.pool).await?))
}

async fn get_route_stop(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RouteStop>> {
    RouteStop::find_by_id(&state.pool, id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("Route stop"))
}

async fn create_route_stop(
    State(state): State<AppState>,
    Json(body): Json<RouteStopRequest>,
) -> Result<(StatusCode, Json<RouteStop>)> {
    let (Some(route_id), Some(municipality_id), Some(position)) =
        (body.route_id, body.municipality_id, body.position)
    else {
        return Err(AppError::Validation(
            "route_id, municipality_id and position are required".to_string(),
        ));
    };
    check_position(Some(position))?;

    // Unknown route or municipality surfaces as a foreign-key conflict
    let stop = RouteStop::create(&state.pool, route_id, municipality_id, position)
        .await
        .map_err(|e| AppError::from_write(e, "Route stop"))?;

    Ok((StatusCode::CREATED, Json(stop)))
}

async fn update_route_stop(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<RouteStopRequest>,
) -> Result<Json<RouteStop>> {
    check_position(body.position)?;

    RouteStop::update(
        &state.pool,
        id,
        body.route_id,
        body.municipality_id,
        body.position,
    )
    .await
    .map_err(|e| AppError::from_write(e, "Route stop"))?
    .map(Json)
    .ok_or_else(|| AppError::not_found("Route stop"))
}

async fn delete_route_stop(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeletedResponse>> {
    if !RouteStop::delete(&state.pool, id).await? {
        return Err(AppError::not_found("Route stop"));
    }

    Ok(DeletedResponse::new("Route stop"))
}

pub fn router() -> Router<AppState> {
    let public = Router::new()
        .route("/api/route-stops", get(list_route_stops))
        .route("/api/route-stops/:id", get(get_route_stop));

    let protected = Router::new()
        .route("/api/route-stops", post(create_route_stop))
        .route(
            "/api/route-stops/:id",
            put(update_route_stop).delete(delete_route_stop),
        )
        .route_layer(middleware::from_fn(require_auth));

    public.merge(protected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_must_not_be_negative() {
        assert!(check_position(Some(-1)).is_err());
        assert!(check_position(Some(0)).is_ok());
        assert!(check_position(None).is_ok());
    }
}
