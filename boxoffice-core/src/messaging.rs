use async_trait::async_trait;

/// At-least-once channel towards the notification service.
#[async_trait]
pub trait NotificationPublisher: Send + Sync {
    async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), PublishError>;
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("Failed to publish to {topic}: {reason}")]
pub struct PublishError {
    pub topic: String,
    pub reason: String,
}
