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
use crate::api::{required, DeletedResponse};
use crate::error::{AppError, Result};
use crate::models::company::Company;

#[derive(Debug, Deserialize)]
struct CompanyRequest {
    name: Option<String>,
}

async fn list_companies(State(state): State<AppState>) -> Result<Json<Vec<Company>>> {
    Ok(Json(Company::list(&state.pool).await?))
}

async fn get_company(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Company>> {
    let company = Company::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("Company"))?;

    Ok(Json(company))
}

async fn create_company(
    State(state): State<AppState>,
    Json(body): Json<CompanyRequest>,
) -> Result<(StatusCode, Json<Company>)> {
    let name = required(body.name, "name")?;

    let company = Company::create(&state.pool, &name)
        .await
        .map_err(|e| AppError::from_write(e, "Company"))?;

    tracing::info!(company_id = %company.id, "Created company");

    Ok((StatusCode::CREATED, Json(company)))
}

async fn update_company(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<CompanyRequest>,
) -> Result<Json<Company>> {
    let name = required(body.name, "name")?;

    let company = Company::update(&state.pool, id, &name)
        .await
        .map_err(|e| AppError::from_write(e, "Company"))?
        .ok_or_else(|| AppError::not_found("Company"))?;

    Ok(Json(company))
}

async fn delete_company(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeletedResponse>> {
    let deleted = Company::delete(&state.pool, id)
        .await
        .map_err(|e| AppError::from_write(e, "Company"))?;

    if !deleted {
        return Err(AppError::not_found("Company"));
    }

    tracing::info!(company_id = %id, "Deleted company");

    Ok(DeletedResponse::new("Company"))
}

pub fn router() -> Router<AppState> {
    let public = Router::new()
        .route("/api/companies", get(list_companies))
        .route("/api/companies/:id", get(get_company));

    let protected = Router::new()
        .route("/api/companies", post(create_company))
        .route("/api/companies/:id", put(update_company).delete(delete_company))
        .route_layer(middleware::from_fn(require_auth));

    public.merge(protected)
}
