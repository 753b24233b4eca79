pub mod app_config;
pub mod database;
pub mod events;
pub mod inventory_repo;
pub mod redis_repo;
pub mod ticket_repo;

pub use database::DbClient;
pub use events::EventProducer;
pub use inventory_repo::PostgresInventoryStore;
pub use redis_repo::RedisClient;
pub use ticket_repo::PostgresTicketRepository;
