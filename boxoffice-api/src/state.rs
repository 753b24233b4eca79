use boxoffice_store::app_config::BusinessRules;
use boxoffice_store::{DbClient, RedisClient};
use boxoffice_tickets::{SagaPolicy, TicketService};
use std::sync::Arc;
use std::time::Duration;

use crate::metrics::Metrics;
use crate::middleware::resiliency::CircuitBreaker;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

pub struct Resiliency {
    pub payment_cb: CircuitBreaker,
}

impl Default for Resiliency {
    fn default() -> Self {
        Self {
            payment_cb: CircuitBreaker::new("payments", 5, Duration::from_secs(30)),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub tickets: Arc<TicketService>,
    /// Only used by `/health`; absent when running against in-process stores.
    pub db: Option<Arc<DbClient>>,
    pub redis: Option<Arc<RedisClient>>,
    pub metrics: Arc<Metrics>,
    pub resiliency: Arc<Resiliency>,
    pub auth: AuthConfig,
    pub business_rules: BusinessRules,
    pub expose_error_detail: bool,
}

/// Saga timings from configuration.
pub fn saga_policy(rules: &BusinessRules) -> SagaPolicy {
    SagaPolicy {
        reservation_ttl: chrono::Duration::seconds(rules.reservation_ttl_seconds as i64),
        max_per_request: rules.max_tickets_per_request,
        sweep_grace: chrono::Duration::seconds(rules.sweep_grace_seconds as i64),
        sweep_batch_size: rules.sweep_batch_size,
        ..SagaPolicy::default()
    }
}
