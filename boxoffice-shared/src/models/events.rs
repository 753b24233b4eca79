use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const TICKET_RESERVED: &str = "ticket_reserved";
pub const TICKET_PURCHASED: &str = "ticket_purchased";
pub const TICKET_CANCELLED: &str = "ticket_cancelled";

/// Wire shape consumed by the notification service: `{ type, data, timestamp }`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NotificationEnvelope<T> {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: T,
    pub timestamp: DateTime<Utc>,
}

impl<T> NotificationEnvelope<T> {
    pub fn new(kind: &str, data: T) -> Self {
        Self {
            kind: kind.to_string(),
            data,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TicketSummary {
    pub id: Uuid,
    pub ticket_number: String,
    pub event_id: Uuid,
    pub price: i64,
    pub currency: String,
    pub status: String,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TicketReservedEvent {
    pub user_id: String,
    pub event_id: Uuid,
    pub event_name: String,
    pub quantity: u32,
    pub tickets: Vec<TicketSummary>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TicketPurchasedEvent {
    pub user_id: String,
    pub event_id: Uuid,
    pub event_name: String,
    pub tickets: Vec<TicketSummary>,
    pub payment_id: String,
    pub total_amount: i64,
    pub currency: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CancellationReason {
    UserRequested,
    ReservationExpired,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TicketCancelledEvent {
    pub user_id: String,
    pub tickets: Vec<TicketSummary>,
    pub refunded_count: usize,
    pub reason: CancellationReason,
}
