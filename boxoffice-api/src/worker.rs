use boxoffice_tickets::SweepReport;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::state::AppState;

pub const SWEEP_LEASE_KEY: &str = "boxoffice:expiry-sweep";

/// One sweep, if this replica wins the lease for the interval.
pub async fn sweep_tick(state: &AppState, holder: &str) -> Option<SweepReport> {
    if let Some(redis) = &state.redis {
        let ttl = state.business_rules.sweep_interval_seconds.max(1);
        match redis.acquire_lease(SWEEP_LEASE_KEY, holder, ttl).await {
            Ok(true) => {}
            Ok(false) => {
                debug!("Sweep lease held by another replica");
                return None;
            }
            // Releases are idempotent, a duplicate sweep is harmless.
            Err(e) => warn!(error = %e, "Sweep lease unavailable, sweeping anyway"),
        }
    }

    match state.tickets.sweep_once().await {
        Ok(report) => {
            state.metrics.record("sweep", "ok");
            state.metrics.record_swept(report.released);
            Some(report)
        }
        Err(e) => {
            state.metrics.record("sweep", e.kind());
            error!(error = %e, "Expiry sweep failed");
            None
        }
    }
}

pub async fn start_expiry_worker(state: AppState) {
    let holder = Uuid::new_v4().to_string();
    let period = Duration::from_secs(state.business_rules.sweep_interval_seconds.max(1));
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(interval_secs = period.as_secs(), %holder, "Expiry sweeper started");

    loop {
        ticker.tick().await;
        sweep_tick(&state, &holder).await;
    }
}
