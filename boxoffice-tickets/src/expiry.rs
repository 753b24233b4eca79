use boxoffice_core::Ticket;
use boxoffice_shared::models::events::{CancellationReason, TicketCancelledEvent};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::compensation;
use crate::context::{SagaContext, SagaPolicy};
use crate::error::SagaResult;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub released: usize,
}

/// Returns seats held by reservations that ran past their deadline.
pub struct ExpirySweeper {
    ctx: SagaContext,
    policy: SagaPolicy,
}

impl ExpirySweeper {
    pub fn new(ctx: SagaContext, policy: SagaPolicy) -> Self {
        Self { ctx, policy }
    }

    /// One pass over at most `sweep_batch_size` lapsed holds. Holds within
    /// the grace window are left for an in-flight purchase to find.
    pub async fn sweep_once(&self) -> SagaResult<SweepReport> {
        let cutoff = self.ctx.clock.now() - self.policy.sweep_grace;
        let expired = self
            .ctx
            .tickets
            .find_expired_reservations(cutoff, self.policy.sweep_batch_size)
            .await?;

        let mut report = SweepReport {
            examined: expired.len(),
            released: 0,
        };
        let mut by_user: BTreeMap<String, Vec<Ticket>> = BTreeMap::new();

        for mut ticket in expired {
            match compensation::release_ticket(&self.ctx, &self.policy.retry, &ticket).await {
                Ok(true) => {
                    report.released += 1;
                    ticket.mark_cancelled();
                    by_user.entry(ticket.user_id.clone()).or_default().push(ticket);
                }
                Ok(false) => {}
                Err(e) => warn!(ticket_id = %ticket.id, error = %e, "Failed to release expired hold"),
            }
        }

        for (user_id, tickets) in by_user {
            self.ctx.notifier.ticket_cancelled(TicketCancelledEvent {
                user_id,
                tickets: tickets.iter().map(Ticket::summary).collect(),
                refunded_count: 0,
                reason: CancellationReason::ReservationExpired,
            });
        }

        if report.released > 0 {
            info!(examined = report.examined, released = report.released, "Expired reservations released");
        } else {
            debug!(examined = report.examined, "Expiry sweep found nothing to release");
        }
        Ok(report)
    }
}
