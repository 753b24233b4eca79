use boxoffice_core::{Ticket, TicketSelector, TicketStatus};
use boxoffice_shared::models::events::{CancellationReason, TicketCancelledEvent};
use futures_util::future::join_all;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::compensation;
use crate::context::{SagaContext, SagaPolicy};
use crate::error::{RefundFailure, SagaError, SagaResult};
use crate::purchase::validate_ticket_ids;

#[derive(Debug, Clone)]
pub struct CancellationReceipt {
    pub cancelled: Vec<Ticket>,
    /// Purchased tickets whose payment was refunded.
    pub refunded_count: usize,
    pub refund_failures: Vec<RefundFailure>,
}

/// Cancels reserved or purchased tickets. Tickets are claimed with a
/// status-guarded write first; only claimed tickets are refunded and only
/// claimed tickets give their seat back.
pub struct CancellationCoordinator {
    ctx: SagaContext,
    policy: SagaPolicy,
}

impl CancellationCoordinator {
    pub fn new(ctx: SagaContext, policy: SagaPolicy) -> Self {
        Self { ctx, policy }
    }

    #[instrument(skip(self), fields(tickets = ticket_ids.len()))]
    pub async fn cancel(&self, user_id: &str, ticket_ids: &[Uuid]) -> SagaResult<CancellationReceipt> {
        validate_ticket_ids(ticket_ids)?;

        let tickets = self
            .ctx
            .tickets
            .find_owned(ticket_ids, user_id, TicketSelector::Active)
            .await?;
        if tickets.len() != ticket_ids.len() {
            return Err(SagaError::TicketNotFound {
                requested: ticket_ids.len(),
                found: tickets.len(),
            });
        }

        self.ensure_cancellable(&tickets).await?;

        let mut claimed = Vec::with_capacity(tickets.len());
        let mut unclaimed = Vec::new();
        for ticket in tickets {
            match compensation::claim_cancellation(&self.ctx, &self.policy.retry, &ticket).await {
                Ok(true) => claimed.push(ticket),
                Ok(false) => {}
                Err(e) => {
                    error!(ticket_id = %ticket.id, error = %e, "Failed to cancel ticket");
                    unclaimed.push(ticket.id);
                }
            }
        }

        let (refunded_count, refund_failures) = self.refund(&claimed).await;

        for ticket in &claimed {
            if let Err(e) = compensation::restore_seats(&self.ctx, &self.policy.retry, ticket.event_id, 1).await {
                error!(ticket_id = %ticket.id, error = %e, "Cancelled ticket kept its seat");
            }
        }

        let cancelled: Vec<Ticket> = claimed
            .into_iter()
            .map(|mut t| {
                t.mark_cancelled();
                t
            })
            .collect();

        info!(
            user_id,
            cancelled = cancelled.len(),
            refunded_count,
            refund_failures = refund_failures.len(),
            "Tickets cancelled"
        );

        self.ctx.notifier.ticket_cancelled(TicketCancelledEvent {
            user_id: user_id.to_string(),
            tickets: cancelled.iter().map(Ticket::summary).collect(),
            refunded_count,
            reason: CancellationReason::UserRequested,
        });

        // The claimed part is settled above either way.
        if !unclaimed.is_empty() {
            return Err(SagaError::IncompleteCancellation {
                cancelled: cancelled.iter().map(|t| t.id).collect(),
                remaining: unclaimed,
            });
        }

        Ok(CancellationReceipt {
            cancelled,
            refunded_count,
            refund_failures,
        })
    }

    /// Past events block cancellation. An event that no longer exists does not.
    async fn ensure_cancellable(&self, tickets: &[Ticket]) -> SagaResult<()> {
        let now = self.ctx.clock.now();
        let event_ids: BTreeSet<Uuid> = tickets.iter().map(|t| t.event_id).collect();
        for event_id in event_ids {
            match self.ctx.inventory.get_event(event_id).await? {
                Some(event) if event.has_occurred(now) => return Err(SagaError::EventAlreadyOccurred(event_id)),
                Some(_) => {}
                None => warn!(%event_id, "Event missing, allowing cancellation"),
            }
        }
        Ok(())
    }

    /// One refund per payment, covering that payment's cancelled tickets.
    async fn refund(&self, claimed: &[Ticket]) -> (usize, Vec<RefundFailure>) {
        let mut groups: BTreeMap<&str, Vec<&Ticket>> = BTreeMap::new();
        for ticket in claimed.iter().filter(|t| t.status == TicketStatus::Purchased) {
            match ticket.payment_id.as_deref() {
                Some(payment_id) => groups.entry(payment_id).or_default().push(ticket),
                None => warn!(ticket_id = %ticket.id, "Purchased ticket has no payment, skipping refund"),
            }
        }

        let payments = &self.ctx.payments;
        let attempts = groups.into_iter().map(|(payment_id, group)| async move {
            let amount: i64 = group.iter().map(|t| t.price).sum();
            let result = payments.refund(payment_id, Some(amount)).await;
            (payment_id, group.len(), amount, result)
        });

        let mut refunded = 0;
        let mut failures = Vec::new();
        for (payment_id, count, amount, result) in join_all(attempts).await {
            match result {
                Ok(refund) => {
                    info!(payment_id, refund_id = %refund.refund_id, amount, "Refund issued");
                    refunded += count;
                }
                Err(e) => {
                    warn!(payment_id, amount, error = %e, "Refund failed");
                    failures.push(RefundFailure {
                        payment_id: payment_id.to_string(),
                        amount,
                        reason: e.to_string(),
                    });
                }
            }
        }
        (refunded, failures)
    }
}
