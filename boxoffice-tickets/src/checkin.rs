use boxoffice_core::{EventListing, Ticket, TicketStatus};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::info;

use crate::context::SagaContext;
use crate::error::{SagaError, SagaResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Admin,
    Operator,
    User,
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Admin" | "admin" => Ok(Role::Admin),
            "Operator" | "operator" => Ok(Role::Operator),
            "User" | "user" => Ok(Role::User),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Admin => "Admin",
            Role::Operator => "Operator",
            Role::User => "User",
        };
        f.write_str(name)
    }
}

/// Who is asking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }

    fn can_verify(&self, event: &EventListing) -> bool {
        self.role == Role::Admin || event.creator_id == self.user_id
    }

    fn can_check_in(&self, event: &EventListing) -> bool {
        self.role == Role::Operator || self.can_verify(event)
    }
}

#[derive(Debug, Clone)]
pub struct TicketVerification {
    pub ticket: Ticket,
    pub event: EventListing,
}

/// Door-side ticket checks.
pub struct CheckInService {
    ctx: SagaContext,
}

impl CheckInService {
    pub fn new(ctx: SagaContext) -> Self {
        Self { ctx }
    }

    pub async fn verify(&self, ticket_number: &str, actor: &Actor) -> SagaResult<TicketVerification> {
        let verification = self.admissible(ticket_number).await?;
        if !actor.can_verify(&verification.event) {
            return Err(SagaError::Forbidden(
                "not authorized to verify tickets for this event".to_string(),
            ));
        }
        Ok(verification)
    }

    pub async fn check_in(&self, ticket_number: &str, actor: &Actor) -> SagaResult<Ticket> {
        let TicketVerification { mut ticket, event } = self.admissible(ticket_number).await?;
        if !actor.can_check_in(&event) {
            return Err(SagaError::Forbidden(
                "not authorized to check in tickets for this event".to_string(),
            ));
        }

        let at = self.ctx.clock.now();
        if !self.ctx.tickets.mark_used(ticket.id, at).await? {
            return Err(SagaError::AlreadyCheckedIn);
        }
        ticket.mark_used(at);

        info!(ticket_number, checked_in_by = %actor.user_id, "Ticket checked in");
        Ok(ticket)
    }

    /// Ticket exists, is paid for and has not been scanned yet.
    async fn admissible(&self, ticket_number: &str) -> SagaResult<TicketVerification> {
        let ticket = self
            .ctx
            .tickets
            .find_by_number(ticket_number)
            .await?
            .ok_or(SagaError::TicketNotFound { requested: 1, found: 0 })?;

        if ticket.checked_in || ticket.status == TicketStatus::Used {
            return Err(SagaError::AlreadyCheckedIn);
        }
        if ticket.status != TicketStatus::Purchased {
            return Err(SagaError::NotEligibleForCheckIn(ticket.status));
        }

        let event = self
            .ctx
            .inventory
            .get_event(ticket.event_id)
            .await?
            .ok_or(SagaError::EventNotFound(ticket.event_id))?;

        Ok(TicketVerification { ticket, event })
    }
}
