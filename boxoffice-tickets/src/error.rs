use boxoffice_core::{InventoryError, PaymentError, RepositoryError, TicketStatus};
use uuid::Uuid;

pub type SagaResult<T> = Result<T, SagaError>;

#[derive(Debug, thiserror::Error)]
pub enum SagaError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Quantity must be between 1 and {max}, got {requested}")]
    InvalidQuantity { requested: u32, max: u32 },

    #[error("Insufficient seats: requested {requested}, only {available} available")]
    InsufficientCapacity { requested: i32, available: i32 },

    #[error("Event not found: {0}")]
    EventNotFound(Uuid),

    #[error("Invalid or expired tickets: requested {requested}, found {found}")]
    InvalidOrExpiredTickets { requested: usize, found: usize },

    #[error("One or more tickets have expired, please reserve again")]
    ReservationExpired { released: usize },

    #[error("Tickets must all belong to the same event")]
    MultipleEvents,

    #[error("Payment failed: {0}")]
    PaymentFailed(#[source] PaymentError),

    #[error("One or more tickets not found or already cancelled: requested {requested}, found {found}")]
    TicketNotFound { requested: usize, found: usize },

    /// Some tickets of the batch were cancelled (and compensated), the rest
    /// could not be written and are still active.
    #[error("Cancelled {} ticket(s), {} could not be cancelled, please retry them", cancelled.len(), remaining.len())]
    IncompleteCancellation { cancelled: Vec<Uuid>, remaining: Vec<Uuid> },

    #[error("Cannot cancel tickets for past events")]
    EventAlreadyOccurred(Uuid),

    #[error("Ticket is not valid for check-in (status {0})")]
    NotEligibleForCheckIn(TicketStatus),

    #[error("Ticket already used")]
    AlreadyCheckedIn,

    #[error("Not authorized: {0}")]
    Forbidden(String),

    /// Money moved but the ticket status write has not landed yet. A
    /// background settlement keeps retrying the write.
    #[error("Payment {payment_id} captured but ticket confirmation is still pending")]
    InternalInconsistency { payment_id: String },

    #[error(transparent)]
    Inventory(InventoryError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<InventoryError> for SagaError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::EventNotFound(id) => SagaError::EventNotFound(id),
            InventoryError::InsufficientCapacity { requested, available } => {
                SagaError::InsufficientCapacity { requested, available }
            }
            other => SagaError::Inventory(other),
        }
    }
}

impl SagaError {
    /// Stable machine-readable name, used for metrics labels and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            SagaError::InvalidRequest(_) => "invalid_request",
            SagaError::InvalidQuantity { .. } => "invalid_quantity",
            SagaError::InsufficientCapacity { .. } => "insufficient_capacity",
            SagaError::EventNotFound(_) => "event_not_found",
            SagaError::InvalidOrExpiredTickets { .. } => "invalid_or_expired_tickets",
            SagaError::ReservationExpired { .. } => "reservation_expired",
            SagaError::MultipleEvents => "multiple_events",
            SagaError::PaymentFailed(_) => "payment_failed",
            SagaError::TicketNotFound { .. } => "ticket_not_found",
            SagaError::IncompleteCancellation { .. } => "incomplete_cancellation",
            SagaError::EventAlreadyOccurred(_) => "event_already_occurred",
            SagaError::NotEligibleForCheckIn(_) => "not_eligible_for_check_in",
            SagaError::AlreadyCheckedIn => "already_checked_in",
            SagaError::Forbidden(_) => "forbidden",
            SagaError::InternalInconsistency { .. } => "internal_inconsistency",
            SagaError::Inventory(_) => "inventory",
            SagaError::Repository(_) => "repository",
        }
    }
}

/// A refund that did not go through. Reported to the caller, never fatal.
#[derive(Debug, Clone, PartialEq)]
pub struct RefundFailure {
    pub payment_id: String,
    pub amount: i64,
    pub reason: String,
}
