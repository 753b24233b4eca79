use backon::Retryable;
use boxoffice_core::{
    ChargeRequest, Currency, PaymentAdapter, PaymentError, PaymentStatus, RepositoryError, Ticket, TicketRepository,
    TicketSelector,
};
use boxoffice_shared::models::events::TicketPurchasedEvent;
use boxoffice_shared::Masked;
use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::compensation;
use crate::context::{SagaContext, SagaPolicy};
use crate::error::{SagaError, SagaResult};

#[derive(Debug, Clone)]
pub struct PurchaseReceipt {
    pub event_id: Uuid,
    pub event_name: String,
    pub payment_id: String,
    pub total_amount: i64,
    pub currency: Currency,
    pub tickets: Vec<Ticket>,
}

/// Rejects an empty list or one naming the same ticket twice.
pub(crate) fn validate_ticket_ids(ids: &[Uuid]) -> SagaResult<()> {
    if ids.is_empty() {
        return Err(SagaError::InvalidRequest("ticketIds must not be empty".to_string()));
    }
    let distinct: HashSet<&Uuid> = ids.iter().collect();
    if distinct.len() != ids.len() {
        return Err(SagaError::InvalidRequest("ticketIds must not repeat".to_string()));
    }
    Ok(())
}

/// Pays for reserved tickets. Order of steps: verify the holds, charge,
/// then flip every ticket to `Purchased` in one write. Once the charge has
/// captured, the status write is retried rather than abandoned.
pub struct PurchaseCoordinator {
    ctx: SagaContext,
    policy: SagaPolicy,
}

impl PurchaseCoordinator {
    pub fn new(ctx: SagaContext, policy: SagaPolicy) -> Self {
        Self { ctx, policy }
    }

    #[instrument(skip(self, payment_token), fields(tickets = ticket_ids.len()))]
    pub async fn purchase(
        &self,
        user_id: &str,
        ticket_ids: &[Uuid],
        payment_token: Masked<String>,
    ) -> SagaResult<PurchaseReceipt> {
        validate_ticket_ids(ticket_ids)?;

        let mut tickets = self
            .ctx
            .tickets
            .find_owned(ticket_ids, user_id, TicketSelector::Reserved)
            .await?;
        if tickets.len() != ticket_ids.len() {
            return Err(SagaError::InvalidOrExpiredTickets {
                requested: ticket_ids.len(),
                found: tickets.len(),
            });
        }

        let now = self.ctx.clock.now();
        if tickets.iter().any(|t| t.is_expired(now)) {
            let released = self.release_expired(&tickets, now).await;
            return Err(SagaError::ReservationExpired { released });
        }

        let event_id = tickets[0].event_id;
        if tickets.iter().any(|t| t.event_id != event_id) {
            return Err(SagaError::MultipleEvents);
        }
        let currency = tickets[0].currency;
        if tickets.iter().any(|t| t.currency != currency) {
            return Err(SagaError::InvalidRequest("tickets are priced in different currencies".to_string()));
        }

        let event = self
            .ctx
            .inventory
            .get_event(event_id)
            .await?
            .ok_or(SagaError::EventNotFound(event_id))?;

        let total_amount: i64 = tickets.iter().map(|t| t.price).sum();
        let charge = self
            .ctx
            .payments
            .charge(&ChargeRequest {
                amount: total_amount,
                currency,
                token: payment_token,
                description: format!("Tickets for {}", event.name),
            })
            .await
            .map_err(|e| {
                warn!(user_id, error = %e, "Charge rejected");
                SagaError::PaymentFailed(e)
            })?;

        if charge.status != PaymentStatus::Succeeded {
            warn!(payment_id = %charge.payment_id, status = ?charge.status, "Charge did not settle");
            return Err(SagaError::PaymentFailed(PaymentError::NotSettled(charge.status)));
        }

        let ids: Vec<Uuid> = tickets.iter().map(|t| t.id).collect();
        self.confirm(user_id, &ids, &charge.payment_id, total_amount).await?;

        for ticket in &mut tickets {
            ticket.mark_purchased(&charge.payment_id);
        }

        info!(user_id, payment_id = %charge.payment_id, total_amount, "Tickets purchased");

        self.ctx.notifier.ticket_purchased(TicketPurchasedEvent {
            user_id: user_id.to_string(),
            event_id,
            event_name: event.name.clone(),
            tickets: tickets.iter().map(Ticket::summary).collect(),
            payment_id: charge.payment_id.clone(),
            total_amount,
            currency: currency.to_string(),
        });

        Ok(PurchaseReceipt {
            event_id,
            event_name: event.name,
            payment_id: charge.payment_id,
            total_amount,
            currency,
            tickets,
        })
    }

    async fn release_expired(&self, tickets: &[Ticket], now: chrono::DateTime<chrono::Utc>) -> usize {
        let mut released = 0;
        for ticket in tickets.iter().filter(|t| t.is_expired(now)) {
            match compensation::release_ticket(&self.ctx, &self.policy.retry, ticket).await {
                Ok(true) => released += 1,
                Ok(false) => {}
                Err(e) => warn!(ticket_id = %ticket.id, error = %e, "Expired ticket not released, sweep will retry"),
            }
        }
        info!(released, "Released expired holds during purchase");
        released
    }

    /// Flip the tickets to `Purchased` for a captured charge.
    async fn confirm(&self, user_id: &str, ids: &[Uuid], payment_id: &str, amount: i64) -> SagaResult<()> {
        let repo = &self.ctx.tickets;
        let outcome = (|| async move { repo.mark_purchased(ids, user_id, payment_id).await })
            .retry(compensation::backoff(&self.policy.retry))
            .when(RepositoryError::is_transient)
            .notify(|err: &RepositoryError, dur: Duration| {
                warn!(payment_id, error = %err, delay = ?dur, "Ticket confirmation failed, retrying");
            })
            .await;

        match outcome {
            Ok(()) => Ok(()),
            Err(RepositoryError::Conflict(reason)) => {
                warn!(payment_id, %reason, "Tickets changed under a captured charge, refunding");
                refund_in_full(self.ctx.payments.as_ref(), payment_id, amount).await;
                Err(SagaError::ReservationExpired { released: 0 })
            }
            Err(e) => {
                error!(payment_id, error = %e, "Charge captured but tickets unconfirmed, settling in background");
                self.spawn_settlement(user_id.to_string(), ids.to_vec(), payment_id.to_string(), amount);
                Err(SagaError::InternalInconsistency {
                    payment_id: payment_id.to_string(),
                })
            }
        }
    }

    fn spawn_settlement(&self, user_id: String, ids: Vec<Uuid>, payment_id: String, amount: i64) {
        let repo: Arc<dyn TicketRepository> = self.ctx.tickets.clone();
        let payments: Arc<dyn PaymentAdapter> = self.ctx.payments.clone();
        let pending = self.ctx.settlements.clone();
        let backoff = compensation::settlement_backoff(&self.policy.retry);

        pending.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(async move {
            let outcome = (|| async { repo.mark_purchased(&ids, &user_id, &payment_id).await })
                .retry(backoff)
                .when(|e: &RepositoryError| !matches!(e, RepositoryError::Conflict(_)))
                .await;

            match outcome {
                Ok(()) => info!(%payment_id, "Background settlement confirmed tickets"),
                Err(e) => {
                    warn!(%payment_id, error = %e, "Background settlement gave up, refunding");
                    refund_in_full(payments.as_ref(), &payment_id, amount).await;
                }
            }
            pending.fetch_sub(1, Ordering::SeqCst);
        });
    }
}

async fn refund_in_full(payments: &dyn PaymentAdapter, payment_id: &str, amount: i64) {
    match payments.refund(payment_id, Some(amount)).await {
        Ok(refund) => info!(payment_id, refund_id = %refund.refund_id, "Charge refunded"),
        Err(e) => error!(payment_id, amount, error = %e, "Refund of orphaned charge failed"),
    }
}
