use axum::{extract::State, http::header, response::IntoResponse};
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::error::AppError;
use crate::state::AppState;

/// Saga counters exposed on `/metrics`.
pub struct Metrics {
    registry: Registry,
    operations: IntCounterVec,
    refund_failures: IntCounter,
    swept_tickets: IntCounter,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let operations = IntCounterVec::new(
            Opts::new("boxoffice_saga_operations_total", "Ticket operations by outcome"),
            &["operation", "outcome"],
        )?;
        let refund_failures = IntCounter::new(
            "boxoffice_refund_failures_total",
            "Refunds that failed during cancellation",
        )?;
        let swept_tickets = IntCounter::new(
            "boxoffice_swept_tickets_total",
            "Expired reservations released by the sweeper",
        )?;

        registry.register(Box::new(operations.clone()))?;
        registry.register(Box::new(refund_failures.clone()))?;
        registry.register(Box::new(swept_tickets.clone()))?;

        Ok(Self {
            registry,
            operations,
            refund_failures,
            swept_tickets,
        })
    }

    /// `outcome` is `"ok"` or an error kind.
    pub fn record(&self, operation: &str, outcome: &str) {
        self.operations.with_label_values(&[operation, outcome]).inc();
    }

    pub fn record_refund_failures(&self, count: usize) {
        self.refund_failures.inc_by(count as u64);
    }

    pub fn record_swept(&self, count: usize) {
        self.swept_tickets.inc_by(count as u64);
    }

    pub fn operation_count(&self, operation: &str, outcome: &str) -> u64 {
        self.operations.with_label_values(&[operation, outcome]).get()
    }

    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

pub async fn metrics_handler(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let body = state
        .metrics
        .render()
        .map_err(|e| AppError::Internal(anyhow::Error::msg(e.to_string())))?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_recorded_counters() {
        let metrics = Metrics::new().unwrap();
        metrics.record("reserve", "ok");
        metrics.record("reserve", "ok");
        metrics.record_swept(3);

        assert_eq!(metrics.operation_count("reserve", "ok"), 2);
        let text = metrics.render().unwrap();
        assert!(text.contains("boxoffice_saga_operations_total{operation=\"reserve\",outcome=\"ok\"} 2"));
        assert!(text.contains("boxoffice_swept_tickets_total 3"));
    }
}
