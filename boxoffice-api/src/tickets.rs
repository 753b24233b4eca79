use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use boxoffice_core::{Ticket, TicketQuery, TicketStatus};
use boxoffice_shared::Masked;
use boxoffice_tickets::{RefundFailure, SagaResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::Identity;
use crate::state::AppState;

// ============================================================================
// Envelope
// ============================================================================

#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub data: T,
}

fn ok<T>(message: Option<&str>, data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        success: true,
        message: message.map(str::to_string),
        data,
    })
}

/// Counts the outcome of `operation` before handing the result back.
fn observed<T>(state: &AppState, operation: &str, result: SagaResult<T>) -> Result<T, AppError> {
    match &result {
        Ok(_) => state.metrics.record(operation, "ok"),
        Err(e) => state.metrics.record(operation, e.kind()),
    }
    Ok(result?)
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| AppError::BadRequest(rejection.body_text()))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReserveRequest {
    pub event_id: Uuid,
    pub quantity: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationResponse {
    pub event_id: Uuid,
    pub event_name: String,
    pub tickets: Vec<Ticket>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRequest {
    pub ticket_ids: Vec<Uuid>,
    pub payment_token: Masked<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseResponse {
    pub tickets: Vec<Ticket>,
    pub payment_id: String,
    pub total_amount: i64,
    pub currency: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    pub ticket_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundFailureView {
    pub payment_id: String,
    pub amount: i64,
    pub reason: String,
}

impl From<RefundFailure> for RefundFailureView {
    fn from(f: RefundFailure) -> Self {
        Self {
            payment_id: f.payment_id,
            amount: f.amount,
            reason: f.reason,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancellationResponse {
    pub cancelled: Vec<Ticket>,
    pub refunded_count: usize,
    pub refund_failures: Vec<RefundFailureView>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub status: Option<String>,
    pub event_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketList {
    pub count: usize,
    pub tickets: Vec<Ticket>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSummary {
    pub id: Uuid,
    pub name: String,
    pub starts_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResponse {
    pub ticket: Ticket,
    pub event: EventSummary,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn reserve(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    payload: Result<Json<ReserveRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Envelope<ReservationResponse>>), AppError> {
    let req = body(payload)?;
    let result = state.tickets.reserve(req.event_id, &identity.user_id, req.quantity).await;
    let receipt = observed(&state, "reserve", result)?;

    Ok((
        StatusCode::CREATED,
        ok(
            Some("Tickets reserved successfully"),
            ReservationResponse {
                event_id: receipt.event.id,
                event_name: receipt.event.name,
                tickets: receipt.tickets,
                expires_at: receipt.expires_at,
            },
        ),
    ))
}

pub async fn purchase(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    payload: Result<Json<PurchaseRequest>, JsonRejection>,
) -> Result<Json<Envelope<PurchaseResponse>>, AppError> {
    let req = body(payload)?;
    let result = state
        .tickets
        .purchase(&identity.user_id, &req.ticket_ids, req.payment_token)
        .await;
    let receipt = observed(&state, "purchase", result)?;

    Ok(ok(
        Some("Tickets purchased successfully"),
        PurchaseResponse {
            tickets: receipt.tickets,
            payment_id: receipt.payment_id,
            total_amount: receipt.total_amount,
            currency: receipt.currency.to_string(),
        },
    ))
}

pub async fn cancel(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    payload: Result<Json<CancelRequest>, JsonRejection>,
) -> Result<Json<Envelope<CancellationResponse>>, AppError> {
    let req = body(payload)?;
    let result = state.tickets.cancel(&identity.user_id, &req.ticket_ids).await;
    let receipt = observed(&state, "cancel", result)?;
    state.metrics.record_refund_failures(receipt.refund_failures.len());

    Ok(ok(
        Some("Tickets cancelled successfully"),
        CancellationResponse {
            cancelled: receipt.cancelled,
            refunded_count: receipt.refunded_count,
            refund_failures: receipt.refund_failures.into_iter().map(Into::into).collect(),
        },
    ))
}

pub async fn my_tickets(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(params): Query<ListParams>,
) -> Result<Json<Envelope<TicketList>>, AppError> {
    let status = params
        .status
        .as_deref()
        .map(str::parse::<TicketStatus>)
        .transpose()
        .map_err(AppError::BadRequest)?;

    let query = TicketQuery {
        status,
        event_id: params.event_id,
    };
    let result = state.tickets.list_for_user(&identity.user_id, &query).await;
    let tickets = observed(&state, "list", result)?;

    Ok(ok(
        None,
        TicketList {
            count: tickets.len(),
            tickets,
        },
    ))
}

pub async fn verify(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(ticket_number): Path<String>,
) -> Result<Json<Envelope<VerificationResponse>>, AppError> {
    let result = state.tickets.verify(&ticket_number, &identity.actor()).await;
    let verification = observed(&state, "verify", result)?;

    Ok(ok(
        None,
        VerificationResponse {
            ticket: verification.ticket,
            event: EventSummary {
                id: verification.event.id,
                name: verification.event.name,
                starts_at: verification.event.starts_at,
            },
        },
    ))
}

pub async fn check_in(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(ticket_number): Path<String>,
) -> Result<Json<Envelope<Ticket>>, AppError> {
    let result = state.tickets.check_in(&ticket_number, &identity.actor()).await;
    let ticket = observed(&state, "check_in", result)?;
    Ok(ok(Some("Ticket successfully checked in"), ticket))
}
