use boxoffice_shared::models::events::TicketSummary;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::event::{Currency, EventListing};

/// Ticket lifecycle:
///
/// ```text
/// Reserved ──pay──▶ Purchased ──check-in──▶ Used
///    │                  │
///    └──expire/cancel──▶ Cancelled ◀──cancel + refund
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    Reserved,
    Purchased,
    Cancelled,
    Used,
}

impl TicketStatus {
    pub fn can_transition_to(self, next: TicketStatus) -> bool {
        use TicketStatus::*;
        matches!(
            (self, next),
            (Reserved, Purchased) | (Reserved, Cancelled) | (Purchased, Cancelled) | (Purchased, Used)
        )
    }

    pub fn is_active(self) -> bool {
        matches!(self, TicketStatus::Reserved | TicketStatus::Purchased)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TicketStatus::Cancelled | TicketStatus::Used)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Reserved => "reserved",
            TicketStatus::Purchased => "purchased",
            TicketStatus::Cancelled => "cancelled",
            TicketStatus::Used => "used",
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reserved" => Ok(TicketStatus::Reserved),
            "purchased" => Ok(TicketStatus::Purchased),
            "cancelled" => Ok(TicketStatus::Cancelled),
            "used" => Ok(TicketStatus::Used),
            other => Err(format!("unknown ticket status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: Uuid,
    pub ticket_number: String,
    pub event_id: Uuid,
    pub user_id: String,
    /// Minor currency units.
    pub price: i64,
    pub currency: Currency,
    pub status: TicketStatus,
    pub payment_id: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub checked_in: bool,
    pub checked_in_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Ticket {
    /// A fresh hold on one seat of `event`, priced from the event.
    pub fn reserved(
        event: &EventListing,
        user_id: &str,
        ticket_number: String,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            ticket_number,
            event_id: event.id,
            user_id: user_id.to_string(),
            price: event.price,
            currency: event.currency,
            status: TicketStatus::Reserved,
            payment_id: None,
            expires_at: Some(expires_at),
            checked_in: false,
            checked_in_at: None,
            created_at: now,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == TicketStatus::Reserved && self.expires_at.map(|at| at < now).unwrap_or(false)
    }

    pub fn mark_purchased(&mut self, payment_id: &str) {
        self.status = TicketStatus::Purchased;
        self.payment_id = Some(payment_id.to_string());
        self.expires_at = None;
    }

    pub fn mark_cancelled(&mut self) {
        self.status = TicketStatus::Cancelled;
        self.expires_at = None;
    }

    pub fn mark_used(&mut self, at: DateTime<Utc>) {
        self.status = TicketStatus::Used;
        self.checked_in = true;
        self.checked_in_at = Some(at);
    }

    pub fn summary(&self) -> TicketSummary {
        TicketSummary {
            id: self.id,
            ticket_number: self.ticket_number.clone(),
            event_id: self.event_id,
            price: self.price,
            currency: self.currency.to_string(),
            status: self.status.to_string(),
            expires_at: self.expires_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn event() -> EventListing {
        EventListing {
            id: Uuid::new_v4(),
            name: "Derby".to_string(),
            starts_at: Utc::now() + Duration::days(10),
            price: 4000,
            currency: Currency::Gbp,
            creator_id: "club".to_string(),
            total_capacity: 10,
            available_seats: 10,
        }
    }

    #[test]
    fn test_transitions() {
        use TicketStatus::*;
        assert!(Reserved.can_transition_to(Purchased));
        assert!(Reserved.can_transition_to(Cancelled));
        assert!(Purchased.can_transition_to(Used));
        assert!(Purchased.can_transition_to(Cancelled));
        assert!(!Reserved.can_transition_to(Used));
        assert!(!Used.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Reserved));
        assert!(Used.is_terminal() && Cancelled.is_terminal());
    }

    #[test]
    fn test_reserved_ticket_lifecycle() {
        let now = Utc::now();
        let mut ticket = Ticket::reserved(&event(), "user-1", "TIX-1".to_string(), now, now + Duration::minutes(10));
        assert_eq!(ticket.status, TicketStatus::Reserved);
        assert_eq!(ticket.price, 4000);
        assert!(!ticket.is_expired(now));
        assert!(ticket.is_expired(now + Duration::minutes(11)));

        ticket.mark_purchased("pi_1");
        assert_eq!(ticket.payment_id.as_deref(), Some("pi_1"));
        assert!(ticket.expires_at.is_none());
        assert!(!ticket.is_expired(now + Duration::days(1)));

        ticket.mark_used(now);
        assert!(ticket.checked_in);
        assert_eq!(ticket.status, TicketStatus::Used);
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [TicketStatus::Reserved, TicketStatus::Purchased, TicketStatus::Cancelled, TicketStatus::Used] {
            assert_eq!(status.as_str().parse::<TicketStatus>().unwrap(), status);
        }
    }
}
