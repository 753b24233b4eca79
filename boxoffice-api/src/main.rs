use anyhow::Context;
use boxoffice_api::{
    app,
    metrics::Metrics,
    state::{saga_policy, AppState, AuthConfig, Resiliency},
    worker,
};
use boxoffice_store::{app_config::Config, DbClient, EventProducer, PostgresInventoryStore, PostgresTicketRepository, RedisClient};
use boxoffice_tickets::{MockPaymentAdapter, Notifier, SagaContext, TicketService};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "boxoffice_api=debug,boxoffice_tickets=debug,tower_http=debug,axum::rejection=trace".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!(port = config.server.port, environment = %config.server.environment, "Starting ticket service");

    let db = DbClient::new(&config.database.url)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;

    let redis = match &config.redis {
        Some(redis) => Some(Arc::new(
            RedisClient::new(&redis.url).await.context("Failed to connect to Redis")?,
        )),
        None => {
            tracing::warn!("No Redis configured: rate limiting and sweep lease disabled");
            None
        }
    };

    let producer = EventProducer::new(&config.kafka.brokers).context("Failed to create Kafka producer")?;

    let ctx = SagaContext::new(
        Arc::new(PostgresInventoryStore::new(db.pool.clone())),
        Arc::new(PostgresTicketRepository::new(db.pool.clone())),
        Arc::new(MockPaymentAdapter::new()),
        Notifier::new(Arc::new(producer), config.kafka.notifications_topic.clone()),
    );
    let tickets = TicketService::new(ctx, saga_policy(&config.business_rules));

    let state = AppState {
        tickets: Arc::new(tickets),
        db: Some(Arc::new(db)),
        redis,
        metrics: Arc::new(Metrics::new().map_err(|e| anyhow::anyhow!("Failed to register metrics: {}", e))?),
        resiliency: Arc::new(Resiliency::default()),
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
        },
        business_rules: config.business_rules.clone(),
        expose_error_detail: config.server.is_development(),
    };

    tokio::spawn(worker::start_expiry_worker(state.clone()));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state).into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
