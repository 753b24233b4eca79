use boxoffice_core::{EventListing, Ticket};
use boxoffice_shared::models::events::TicketReservedEvent;
use chrono::{DateTime, Utc};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::compensation;
use crate::context::{SagaContext, SagaPolicy};
use crate::error::{SagaError, SagaResult};
use crate::numbering;

#[derive(Debug, Clone)]
pub struct ReservationReceipt {
    pub event: EventListing,
    pub tickets: Vec<Ticket>,
    pub expires_at: DateTime<Utc>,
}

/// Holds seats: takes them out of inventory first, then records one
/// `Reserved` ticket per seat. A failed record write gives the seats back.
pub struct ReservationManager {
    ctx: SagaContext,
    policy: SagaPolicy,
}

impl ReservationManager {
    pub fn new(ctx: SagaContext, policy: SagaPolicy) -> Self {
        Self { ctx, policy }
    }

    #[instrument(skip(self))]
    pub async fn reserve(&self, event_id: Uuid, user_id: &str, quantity: u32) -> SagaResult<ReservationReceipt> {
        let max = self.policy.max_per_request;
        if quantity == 0 || quantity > max {
            return Err(SagaError::InvalidQuantity { requested: quantity, max });
        }

        let event = self
            .ctx
            .inventory
            .get_event(event_id)
            .await?
            .ok_or(SagaError::EventNotFound(event_id))?;

        let seats = quantity as i32;
        let remaining = self.ctx.inventory.adjust_seats(event_id, -seats).await?;

        let now = self.ctx.clock.now();
        let expires_at = now + self.policy.reservation_ttl;
        let mut created = Vec::with_capacity(quantity as usize);

        for _ in 0..quantity {
            let ticket = Ticket::reserved(&event, user_id, numbering::ticket_number(event_id, now), now, expires_at);
            if let Err(e) = self.ctx.tickets.insert(&ticket).await {
                warn!(error = %e, created = created.len(), "Ticket write failed, rolling back reservation");
                self.roll_back(event_id, seats, &created).await;
                return Err(e.into());
            }
            created.push(ticket);
        }

        info!(user_id, quantity, remaining, %expires_at, "Seats reserved");

        self.ctx.notifier.ticket_reserved(TicketReservedEvent {
            user_id: user_id.to_string(),
            event_id,
            event_name: event.name.clone(),
            quantity,
            tickets: created.iter().map(Ticket::summary).collect(),
        });

        Ok(ReservationReceipt {
            event,
            tickets: created,
            expires_at,
        })
    }

    /// Seats of tickets that could not be deleted stay held; the expiry sweep
    /// returns them later.
    async fn roll_back(&self, event_id: Uuid, seats: i32, created: &[Ticket]) {
        let mut releasable = seats - created.len() as i32;

        if !created.is_empty() {
            let ids: Vec<Uuid> = created.iter().map(|t| t.id).collect();
            match self.ctx.tickets.delete(&ids).await {
                Ok(_) => releasable = seats,
                Err(e) => error!(%event_id, error = %e, "Failed to delete partial reservation"),
            }
        }

        if releasable > 0 {
            if let Err(e) = compensation::restore_seats(&self.ctx, &self.policy.retry, event_id, releasable).await {
                error!(%event_id, releasable, error = %e, "Reservation rollback left seats held");
            }
        }
    }
}
