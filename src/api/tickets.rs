use askama::Template;
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use uuid::Uuid;

use crate::api::middleware::{
    auth::{get_authenticated_user, require_admin, require_auth},
    session::AppState,
};
use crate::api::DeletedResponse;
use crate::error::{AppError, Result};
use crate::models::ticket::{Ticket, TicketReceipt, TicketStatus};
use crate::services::qr_generator::{self, TicketQrPayload};
use crate::services::seat_admission::ReserveRequest;

#[derive(Debug, Deserialize)]
pub struct PurchaseRequest {
    pub trip_id: Uuid,
    pub seat_label: String,
}

#[derive(Template)]
#[template(path = "tickets/show.html")]
struct TicketPageTemplate {
    ticket: TicketReceipt,
    price: String,
    qr_data_url: String,
}

/// Formats cents as a price with two decimals
fn format_price(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.unsigned_abs();
    format!("{}${}.{:02}", sign, cents / 100, cents % 100)
}

/// Outcome of checking a scanned ticket code
#[derive(Debug, Serialize)]
pub struct ScanResult {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ScanResult {
    fn rejected(ticket_id: Option<Uuid>, reason: &str) -> Json<Self> {
        Json(Self {
            valid: false,
            ticket_id,
            reason: Some(reason.to_string()),
        })
    }
}

/// Someone else's ticket reads as missing, so ids reveal nothing
fn owned_by(receipt: Option<TicketReceipt>, user_id: Uuid) -> Result<TicketReceipt> {
    receipt
        .filter(|receipt| receipt.user_id == user_id)
        .ok_or_else(|| AppError::not_found("Ticket"))
}

/// Loads a receipt the caller owns
async fn owned_receipt(state: &AppState, session: &Session, id: Uuid) -> Result<TicketReceipt> {
    let current = get_authenticated_user(session).await?;
    owned_by(Ticket::find_receipt(&state.pool, id).await?, current.user_id)
}

/// Signature and id of a scanned payload, before any database lookup
fn scanned_ticket_id(
    payload: &TicketQrPayload,
    signing_key: &[u8],
) -> std::result::Result<Uuid, &'static str> {
    if !payload.verify(signing_key) {
        return Err("signature mismatch");
    }
    Uuid::parse_str(&payload.ticket_id).map_err(|_| "malformed ticket id")
}

fn signed_payload(state: &AppState, receipt: &TicketReceipt) -> Result<TicketQrPayload> {
    Ok(TicketQrPayload::from_receipt(receipt).signed(state.signing_key())?)
}

async fn purchase_ticket(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<PurchaseRequest>,
) -> Result<(StatusCode, Json<Ticket>)> {
    let current = get_authenticated_user(&session).await?;

    let ticket = state
        .seats
        .reserve(ReserveRequest {
            trip_id: body.trip_id,
            user_id: current.user_id,
            seat_label: body.seat_label,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(ticket)))
}

async fn my_tickets(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<Vec<TicketReceipt>>> {
    let current = get_authenticated_user(&session).await?;

    Ok(Json(
        Ticket::list_receipts_by_user(&state.pool, current.user_id).await?,
    ))
}

/// Every ticket in the system, for admins
async fn list_tickets(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<Vec<Ticket>>> {
    require_admin(&state.pool, &session).await?;
    Ok(Json(Ticket::list(&state.pool).await?))
}

async fn get_ticket(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<TicketReceipt>> {
    Ok(Json(owned_receipt(&state, &session, id).await?))
}

async fn cancel_ticket(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<Ticket>> {
    let current = get_authenticated_user(&session).await?;
    let ticket = state.seats.cancel(id, current.user_id).await?;

    Ok(Json(ticket))
}

/// Hard delete for admin cleanup. Owners cancel instead.
async fn delete_ticket(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<DeletedResponse>> {
    let admin_id = require_admin(&state.pool, &session).await?;

    if !Ticket::delete(&state.pool, id).await? {
        return Err(AppError::not_found("Ticket"));
    }

    tracing::warn!(ticket_id = %id, admin_id = %admin_id, "Ticket hard-deleted");

    Ok(DeletedResponse::new("Ticket"))
}

async fn ticket_qr_svg(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let receipt = owned_receipt(&state, &session, id).await?;
    let svg = qr_generator::generate_qr_svg(&signed_payload(&state, &receipt)?)?;

    Ok(([(header::CONTENT_TYPE, "image/svg+xml")], svg))
}

async fn ticket_qr_png(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let receipt = owned_receipt(&state, &session, id).await?;
    let png = qr_generator::generate_qr_png(&signed_payload(&state, &receipt)?)?;

    Ok(([(header::CONTENT_TYPE, "image/png")], png))
}

/// Checks a scanned ticket code: signature first, then the live ticket
async fn validate_ticket(
    State(state): State<AppState>,
    Json(payload): Json<TicketQrPayload>,
) -> Result<Json<ScanResult>> {
    let ticket_id = match scanned_ticket_id(&payload, state.signing_key()) {
        Ok(id) => id,
        Err(reason) => {
            tracing::warn!(reason, "Rejected scanned ticket");
            return Ok(ScanResult::rejected(None, reason));
        }
    };

    let Some(ticket) = Ticket::find_by_id(&state.pool, ticket_id).await? else {
        return Ok(ScanResult::rejected(Some(ticket_id), "unknown ticket"));
    };
    if ticket.status != TicketStatus::Active {
        return Ok(ScanResult::rejected(Some(ticket_id), "ticket cancelled"));
    }
    if ticket.seat_label != payload.seat || ticket.trip_id.to_string() != payload.trip_id {
        return Ok(ScanResult::rejected(Some(ticket_id), "ticket does not match code"));
    }

    tracing::info!(ticket_id = %ticket_id, seat_label = %ticket.seat_label, "Ticket validated");

    Ok(Json(ScanResult {
        valid: true,
        ticket_id: Some(ticket_id),
        reason: None,
    }))
}

/// Printable receipt with the QR inlined
async fn ticket_page(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<TicketPageTemplate> {
    let receipt = owned_receipt(&state, &session, id).await?;
    let qr_data_url = qr_generator::generate_qr_data_url(&signed_payload(&state, &receipt)?)?;

    Ok(TicketPageTemplate {
        price: format_price(receipt.price_cents),
        ticket: receipt,
        qr_data_url,
    })
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/tickets", get(list_tickets).post(purchase_ticket))
        .route("/api/tickets/mine", get(my_tickets))
        .route("/api/tickets/validate", post(validate_ticket))
        .route("/api/tickets/:id", get(get_ticket).delete(delete_ticket))
        .route("/api/tickets/:id/cancel", post(cancel_ticket))
        .route("/api/tickets/:id/qr.svg", get(ticket_qr_svg))
        .route("/api/tickets/:id/qr.png", get(ticket_qr_png))
        .route_layer(middleware::from_fn(require_auth))
}

/// Server-rendered ticket pages
pub fn page_router() -> Router<AppState> {
    Router::new()
        .route("/tickets/:id", get(ticket_page))
        .route_layer(middleware::from_fn(require_auth))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn receipt(owner: Uuid) -> TicketReceipt {
        let departure_at = Utc::now() + Duration::days(2);
        TicketReceipt {
            id: Uuid::new_v4(),
            trip_id: Uuid::new_v4(),
            user_id: owner,
            seat_label: "A1".to_string(),
            price_cents: 45_000,
            status: TicketStatus::Active,
            purchased_at: Utc::now(),
            cancelled_at: None,
            departure_at,
            arrival_at: departure_at + Duration::hours(5),
            origin: "Tunja".to_string(),
            destination: "Bogota".to_string(),
            company_name: "Expreso Andino".to_string(),
            bus_number: 12,
        }
    }

    #[test]
    fn test_owner_sees_own_ticket() {
        let owner = Uuid::new_v4();
        let r = receipt(owner);
        let id = r.id;

        assert_eq!(owned_by(Some(r), owner).unwrap().id, id);
    }

    #[test]
    fn test_foreign_ticket_reads_as_missing() {
        let owner = Uuid::new_v4();
        let other = Uuid::new_v4();

        let result = owned_by(Some(receipt(owner)), other);

        assert!(matches!(result, Err(AppError::NotFound(_))));
        assert_eq!(result.unwrap_err().status(), StatusCode::NOT_FOUND);
        assert!(matches!(owned_by(None, owner), Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_scanned_code_needs_valid_signature() {
        let key = b"conductor-key";
        let r = receipt(Uuid::new_v4());
        let signed = TicketQrPayload::from_receipt(&r).signed(key).unwrap();

        assert_eq!(scanned_ticket_id(&signed, key), Ok(r.id));
        assert_eq!(
            scanned_ticket_id(&signed, b"other-key"),
            Err("signature mismatch")
        );

        let mut forged = signed.clone();
        forged.seat = "A2".to_string();
        assert_eq!(scanned_ticket_id(&forged, key), Err("signature mismatch"));

        let unsigned = TicketQrPayload::from_receipt(&r);
        assert!(scanned_ticket_id(&unsigned, key).is_err());
    }

    #[test]
    fn test_format_price() {
        assert_eq!(format_price(0), "$0.00");
        assert_eq!(format_price(5), "$0.05");
        assert_eq!(format_price(45_000), "$450.00");
        assert_eq!(format_price(1_999), "$19.99");
        assert_eq!(format_price(-250), "-$2.50");
    }
}
