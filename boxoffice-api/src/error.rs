use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use boxoffice_tickets::SagaError;
use serde_json::json;

use crate::state::AppState;

#[derive(Debug)]
pub enum AppError {
    Unauthenticated(String),
    BadRequest(String),
    RateLimited,
    CircuitOpen(String),
    Saga(SagaError),
    Internal(anyhow::Error),
}

impl From<SagaError> for AppError {
    fn from(err: SagaError) -> Self {
        AppError::Saga(err)
    }
}

/// Internal detail of a failed request. Attached to every error response and
/// written into the body only in development.
#[derive(Debug, Clone)]
pub struct ErrorDetail {
    pub message: String,
    pub detail: String,
}

fn saga_status(err: &SagaError) -> StatusCode {
    match err {
        SagaError::InvalidRequest(_)
        | SagaError::InvalidQuantity { .. }
        | SagaError::InvalidOrExpiredTickets { .. }
        | SagaError::MultipleEvents
        | SagaError::EventAlreadyOccurred(_)
        | SagaError::NotEligibleForCheckIn(_) => StatusCode::BAD_REQUEST,
        SagaError::InsufficientCapacity { .. } | SagaError::AlreadyCheckedIn => StatusCode::CONFLICT,
        SagaError::EventNotFound(_) | SagaError::TicketNotFound { .. } => StatusCode::NOT_FOUND,
        SagaError::ReservationExpired { .. } => StatusCode::GONE,
        SagaError::PaymentFailed(_) => StatusCode::PAYMENT_REQUIRED,
        SagaError::Forbidden(_) => StatusCode::FORBIDDEN,
        SagaError::InternalInconsistency { .. }
        | SagaError::IncompleteCancellation { .. }
        | SagaError::Inventory(_)
        | SagaError::Repository(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::CircuitOpen(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Saga(err) => saga_status(err),
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message_and_detail(&self) -> (String, String) {
        match self {
            AppError::Unauthenticated(msg) => ("Authentication required".to_string(), msg.clone()),
            AppError::BadRequest(msg) => (msg.clone(), msg.clone()),
            AppError::RateLimited => ("Rate limit exceeded".to_string(), "too many requests".to_string()),
            AppError::CircuitOpen(name) => (
                "Service temporarily unavailable".to_string(),
                format!("circuit breaker [{}] is open", name),
            ),
            AppError::Saga(err @ (SagaError::Inventory(_) | SagaError::Repository(_))) => {
                ("Internal server error".to_string(), err.to_string())
            }
            AppError::Saga(SagaError::PaymentFailed(source)) => ("Payment failed".to_string(), source.to_string()),
            AppError::Saga(err) => (err.to_string(), format!("{:?}", err)),
            AppError::Internal(err) => ("Internal server error".to_string(), format!("{:#}", err)),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (message, detail) = self.message_and_detail();

        if status.is_server_error() {
            tracing::error!(%status, %detail, "Request failed");
        } else {
            tracing::debug!(%status, %detail, "Request rejected");
        }

        let body = Json(json!({
            "success": false,
            "message": message,
        }));

        let mut response = (status, body).into_response();
        response.extensions_mut().insert(ErrorDetail { message, detail });
        response
    }
}

/// Rewrites error bodies to carry `error` when running in development.
pub async fn error_detail_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let response = next.run(req).await;
    if !state.expose_error_detail {
        return response;
    }

    match response.extensions().get::<ErrorDetail>().cloned() {
        Some(ErrorDetail { message, detail }) => {
            let body = Json(json!({
                "success": false,
                "message": message,
                "error": detail,
            }));
            (response.status(), body).into_response()
        }
        None => response,
    }
}
