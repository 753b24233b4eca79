use axum::{
    extract::State,
    http::Method,
    middleware::from_fn_with_state,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod error;
pub mod metrics;
pub mod middleware;
pub mod state;
pub mod tickets;
pub mod worker;

pub use state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    // route_layer: the last one added runs first, so auth wraps the breaker.
    let ticket_routes = Router::new()
        .route("/reserve", post(tickets::reserve))
        .route("/purchase", post(tickets::purchase))
        .route("/cancel", post(tickets::cancel))
        .route("/my", get(tickets::my_tickets))
        .route("/verify/{ticket_number}", get(tickets::verify))
        .route("/check-in/{ticket_number}", post(tickets::check_in))
        .route_layer(from_fn_with_state(state.clone(), middleware::circuit_breaker_middleware))
        .route_layer(from_fn_with_state(state.clone(), middleware::auth_middleware));

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics::metrics_handler))
        .nest("/api/tickets", ticket_routes)
        .layer(from_fn_with_state(state.clone(), error::error_detail_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(from_fn_with_state(state.clone(), middleware::rate_limit_middleware))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let database = match &state.db {
        Some(db) => match db.ping().await {
            Ok(()) => "up",
            Err(e) => {
                tracing::warn!(error = %e, "Database health check failed");
                "down"
            }
        },
        None => "in-memory",
    };

    Json(json!({
        "success": true,
        "data": {
            "status": "ok",
            "service": "ticket-service",
            "database": database,
            "pendingSettlements": state.tickets.pending_settlements(),
        }
    }))
}
