//! Undo steps shared by purchase, cancellation and the expiry sweep.
//!
//! A seat is only ever handed back by whoever won the status-guarded
//! transition of its ticket, so racing coordinators cannot release it twice.
//! Once a ticket is cancelled its seat is owed: a restore that keeps failing
//! moves to a background settlement instead of being dropped.

use backon::{ExponentialBuilder, Retryable};
use boxoffice_core::{InventoryError, RepositoryError, Ticket};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::context::{RetryPolicy, SagaContext};
use crate::error::SagaResult;

pub(crate) fn backoff(policy: &RetryPolicy) -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(policy.min_delay)
        .with_max_delay(policy.max_delay)
        .with_max_times(policy.max_attempts)
        .with_jitter()
}

/// Same curve as [`backoff`], without a limit on attempts.
pub(crate) fn settlement_backoff(policy: &RetryPolicy) -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(policy.min_delay)
        .with_max_delay(policy.max_delay)
        .without_max_times()
        .with_jitter()
}

/// Move `ticket` from its fetched status to `Cancelled`, retrying backend
/// errors. `false` means some other path got there first.
pub async fn claim_cancellation(ctx: &SagaContext, policy: &RetryPolicy, ticket: &Ticket) -> SagaResult<bool> {
    let repo = &ctx.tickets;
    let (id, from) = (ticket.id, ticket.status);
    let claimed = (|| async move { repo.mark_cancelled(id, from).await })
        .retry(backoff(policy))
        .when(RepositoryError::is_transient)
        .notify(|err: &RepositoryError, dur: Duration| {
            warn!(ticket_id = %id, error = %err, delay = ?dur, "Cancellation write failed, retrying");
        })
        .await?;
    if !claimed {
        debug!(ticket_id = %ticket.id, status = %ticket.status, "Ticket already moved on, nothing to release");
    }
    Ok(claimed)
}

/// Hand `count` seats back to the event. Transient failures that outlast the
/// inline retries are settled in the background; only errors no retry can
/// fix are returned.
pub async fn restore_seats(ctx: &SagaContext, policy: &RetryPolicy, event_id: Uuid, count: i32) -> SagaResult<()> {
    let inventory = &ctx.inventory;
    let outcome = (|| async move { inventory.adjust_seats(event_id, count).await })
        .retry(backoff(policy))
        .when(InventoryError::is_transient)
        .notify(|err: &InventoryError, dur: Duration| {
            warn!(%event_id, error = %err, delay = ?dur, "Seat release failed, retrying");
        })
        .await;

    match outcome {
        Ok(_) => Ok(()),
        Err(e) if e.is_transient() => {
            error!(%event_id, count, error = %e, "Seat release still failing, settling in background");
            spawn_seat_settlement(ctx, policy, event_id, count);
            Ok(())
        }
        Err(e) => {
            error!(%event_id, count, error = %e, "Seats could not be returned to inventory");
            Err(e.into())
        }
    }
}

fn spawn_seat_settlement(ctx: &SagaContext, policy: &RetryPolicy, event_id: Uuid, count: i32) {
    let inventory = ctx.inventory.clone();
    let pending = ctx.settlements.clone();
    let backoff = settlement_backoff(policy);

    pending.fetch_add(1, Ordering::SeqCst);
    tokio::spawn(async move {
        let outcome = (|| async { inventory.adjust_seats(event_id, count).await })
            .retry(backoff)
            .when(InventoryError::is_transient)
            .await;

        match outcome {
            Ok(available) => info!(%event_id, count, available, "Background settlement returned seats"),
            Err(e) => error!(%event_id, count, error = %e, "Background seat settlement gave up"),
        }
        pending.fetch_sub(1, Ordering::SeqCst);
    });
}

/// Cancel a ticket and return its seat. `Ok(true)` only when this call won
/// the cancellation; the seat is then returned or settling.
pub async fn release_ticket(ctx: &SagaContext, policy: &RetryPolicy, ticket: &Ticket) -> SagaResult<bool> {
    if !claim_cancellation(ctx, policy, ticket).await? {
        return Ok(false);
    }
    restore_seats(ctx, policy, ticket.event_id, 1).await?;
    Ok(true)
}
