use boxoffice_core::{Clock, InventoryStore, PaymentAdapter, SystemClock, TicketRepository};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::notifier::Notifier;

/// The capabilities every coordinator works against.
#[derive(Clone)]
pub struct SagaContext {
    pub inventory: Arc<dyn InventoryStore>,
    pub tickets: Arc<dyn TicketRepository>,
    pub payments: Arc<dyn PaymentAdapter>,
    pub notifier: Notifier,
    pub clock: Arc<dyn Clock>,
    /// Writes handed to background tasks that retry until they land.
    pub settlements: Arc<AtomicUsize>,
}

impl SagaContext {
    pub fn new(
        inventory: Arc<dyn InventoryStore>,
        tickets: Arc<dyn TicketRepository>,
        payments: Arc<dyn PaymentAdapter>,
        notifier: Notifier,
    ) -> Self {
        Self {
            inventory,
            tickets,
            payments,
            notifier,
            clock: Arc::new(SystemClock),
            settlements: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn pending_settlements(&self) -> usize {
        self.settlements.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct SagaPolicy {
    pub reservation_ttl: chrono::Duration,
    pub max_per_request: u32,
    pub sweep_grace: chrono::Duration,
    pub sweep_batch_size: usize,
    pub retry: RetryPolicy,
}

impl Default for SagaPolicy {
    fn default() -> Self {
        Self {
            reservation_ttl: chrono::Duration::minutes(10),
            max_per_request: 10,
            sweep_grace: chrono::Duration::seconds(30),
            sweep_batch_size: 200,
            retry: RetryPolicy::default(),
        }
    }
}

/// Backoff for writes that must land once the saga has committed to them.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(2),
            max_attempts: 8,
        }
    }
}
