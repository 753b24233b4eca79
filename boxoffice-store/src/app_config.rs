use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    /// Rate limiting and the sweep lease are skipped without Redis.
    #[serde(default)]
    pub redis: Option<RedisConfig>,
    pub kafka: KafkaConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub business_rules: BusinessRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    #[serde(default = "default_environment")]
    pub environment: String,
}

impl ServerConfig {
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

fn default_environment() -> String {
    "development".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
    #[serde(default = "default_topic")]
    pub notifications_topic: String,
}

fn default_topic() -> String {
    "notifications".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BusinessRules {
    pub reservation_ttl_seconds: u64,
    pub max_tickets_per_request: u32,
    pub sweep_interval_seconds: u64,
    pub sweep_grace_seconds: u64,
    pub sweep_batch_size: usize,
    pub rate_limit_per_minute: i64,
}

impl Default for BusinessRules {
    fn default() -> Self {
        Self {
            reservation_ttl_seconds: 600,
            max_tickets_per_request: 10,
            sweep_interval_seconds: 60,
            sweep_grace_seconds: 30,
            sweep_batch_size: 200,
            rate_limit_per_minute: 100,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in.
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. BOXOFFICE__DATABASE__URL
            .add_source(config::Environment::with_prefix("BOXOFFICE").separator("__"))
            .build()?
            .try_deserialize()
    }
}
