pub mod cancellation;
pub mod checkin;
pub mod compensation;
pub mod context;
pub mod error;
pub mod expiry;
pub mod listing;
pub mod notifier;
pub mod numbering;
pub mod payment;
pub mod purchase;
pub mod reservation;
pub mod store;

pub use cancellation::{CancellationCoordinator, CancellationReceipt};
pub use checkin::{Actor, CheckInService, Role, TicketVerification};
pub use context::{RetryPolicy, SagaContext, SagaPolicy};
pub use error::{RefundFailure, SagaError, SagaResult};
pub use expiry::{ExpirySweeper, SweepReport};
pub use notifier::{Notifier, PublishedMessage, RecordingPublisher};
pub use payment::MockPaymentAdapter;
pub use purchase::{PurchaseCoordinator, PurchaseReceipt};
pub use reservation::{ReservationManager, ReservationReceipt};
pub use store::InMemoryTicketStore;

use boxoffice_core::{Ticket, TicketQuery};
use boxoffice_shared::Masked;
use uuid::Uuid;

/// Every ticket operation behind one handle, sharing a context and policy.
pub struct TicketService {
    ctx: SagaContext,
    reservations: ReservationManager,
    purchases: PurchaseCoordinator,
    cancellations: CancellationCoordinator,
    sweeper: ExpirySweeper,
    desk: CheckInService,
}

impl TicketService {
    pub fn new(ctx: SagaContext, policy: SagaPolicy) -> Self {
        Self {
            reservations: ReservationManager::new(ctx.clone(), policy.clone()),
            purchases: PurchaseCoordinator::new(ctx.clone(), policy.clone()),
            cancellations: CancellationCoordinator::new(ctx.clone(), policy.clone()),
            sweeper: ExpirySweeper::new(ctx.clone(), policy),
            desk: CheckInService::new(ctx.clone()),
            ctx,
        }
    }

    pub async fn reserve(&self, event_id: Uuid, user_id: &str, quantity: u32) -> SagaResult<ReservationReceipt> {
        self.reservations.reserve(event_id, user_id, quantity).await
    }

    pub async fn purchase(
        &self,
        user_id: &str,
        ticket_ids: &[Uuid],
        payment_token: Masked<String>,
    ) -> SagaResult<PurchaseReceipt> {
        self.purchases.purchase(user_id, ticket_ids, payment_token).await
    }

    pub async fn cancel(&self, user_id: &str, ticket_ids: &[Uuid]) -> SagaResult<CancellationReceipt> {
        self.cancellations.cancel(user_id, ticket_ids).await
    }

    pub async fn sweep_once(&self) -> SagaResult<SweepReport> {
        self.sweeper.sweep_once().await
    }

    pub async fn list_for_user(&self, user_id: &str, query: &TicketQuery) -> SagaResult<Vec<Ticket>> {
        listing::list_for_user(&self.ctx, user_id, query).await
    }

    pub async fn verify(&self, ticket_number: &str, actor: &Actor) -> SagaResult<TicketVerification> {
        self.desk.verify(ticket_number, actor).await
    }

    pub async fn check_in(&self, ticket_number: &str, actor: &Actor) -> SagaResult<Ticket> {
        self.desk.check_in(ticket_number, actor).await
    }

    /// Charges and seat releases still being retried in the background.
    pub fn pending_settlements(&self) -> usize {
        self.ctx.pending_settlements()
    }

    pub fn context(&self) -> &SagaContext {
        &self.ctx
    }
}
