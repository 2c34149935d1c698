use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    routing::{get, post, put},
    Json, Router,
};
use uuid::Uuid;

use crate::api::middleware::{auth::require_auth, session::AppState};
use crate::api::{optional, required, DeletedResponse};
use crate::error::{AppError, Result};
use crate::models::municipality::{Municipality, MunicipalityData};

fn check_coordinates(data: &MunicipalityData) -> Result<()> {
    if !data.coordinates_valid() {
        return Err(AppError::Validation(
            "latitude must be within [-90, 90] and longitude within [-180, 180]".to_string(),
        ));
    }
    Ok(())
}

async fn list_municipalities(State(state): State<AppState>) -> Result<Json<Vec<Municipality>>> {
    Ok(Json(Municipality::list(&state.pool).await?))
}

async fn get_municipality(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Municipality>> {
    Municipality::find_by_id(&state.pool, id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("Municipality"))
}

async fn create_municipality(
    State(state): State<AppState>,
    Json(body): Json<MunicipalityData>,
) -> Result<(StatusCode, Json<Municipality>)> {
    check_coordinates(&body)?;
    let name = required(body.name, "name")?;

    let municipality = Municipality::create(&state.pool, &name, body.latitude, body.longitude)
        .await
        .map_err(|e| AppError::from_write(e, "Municipality"))?;

    Ok((StatusCode::CREATED, Json(municipality)))
}

async fn update_municipality(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(mut body): Json<MunicipalityData>,
) -> Result<Json<Municipality>> {
    check_coordinates(&body)?;
    body.name = optional(body.name);

    Municipality::update(&state.pool, id, &body)
        .await
        .map_err(|e| AppError::from_write(e, "Municipality"))?
        .map(Json)
        .ok_or_else(|| AppError::not_found("Municipality"))
}

async fn delete_municipality(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeletedResponse>> {
    let deleted = Municipality::delete(&state.pool, id)
        .await
        .map_err(|e| AppError::from_write(e, "Municipality"))?;

    if !deleted {
        return Err(AppError::not_found("Municipality"));
    }

    Ok(DeletedResponse::new("Municipality"))
}

pub fn router() -> Router<AppState> {
    let public = Router::new()
        .route("/api/municipalities", get(list_municipalities))
        .route("/api/municipalities/:id", get(get_municipality));

    let protected = Router::new()
        .route("/api/municipalities", post(create_municipality))
        .route(
            "/api/municipalities/:id",
            put(update_municipality).delete(delete_municipality),
        )
        .route_layer(middleware::from_fn(require_auth));

    public.merge(protected)
}
