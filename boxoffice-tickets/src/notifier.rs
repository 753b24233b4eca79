use async_trait::async_trait;
use boxoffice_core::{NotificationPublisher, PublishError};
use boxoffice_shared::models::events::{
    NotificationEnvelope, TicketCancelledEvent, TicketPurchasedEvent, TicketReservedEvent, TICKET_CANCELLED,
    TICKET_PURCHASED, TICKET_RESERVED,
};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

/// Fire-and-forget emission of saga notifications. Publishing runs on its
/// own task, so a slow or failing broker never holds up the caller.
#[derive(Clone)]
pub struct Notifier {
    publisher: Arc<dyn NotificationPublisher>,
    topic: String,
}

impl Notifier {
    pub fn new(publisher: Arc<dyn NotificationPublisher>, topic: impl Into<String>) -> Self {
        Self {
            publisher,
            topic: topic.into(),
        }
    }

    pub fn ticket_reserved(&self, event: TicketReservedEvent) {
        let key = event.event_id.to_string();
        self.emit(TICKET_RESERVED, key, event);
    }

    pub fn ticket_purchased(&self, event: TicketPurchasedEvent) {
        let key = event.event_id.to_string();
        self.emit(TICKET_PURCHASED, key, event);
    }

    pub fn ticket_cancelled(&self, event: TicketCancelledEvent) {
        let key = event.user_id.clone();
        self.emit(TICKET_CANCELLED, key, event);
    }

    fn emit<T: Serialize>(&self, kind: &'static str, key: String, data: T) {
        let payload = match serde_json::to_string(&NotificationEnvelope::new(kind, data)) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(kind, error = %e, "Failed to encode notification");
                return;
            }
        };

        let publisher = self.publisher.clone();
        let topic = self.topic.clone();
        tokio::spawn(async move {
            match publisher.publish(&topic, &key, &payload).await {
                Ok(()) => debug!(kind, %topic, "Notification published"),
                Err(e) => warn!(kind, error = %e, "Notification not delivered"),
            }
        });
    }
}

#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub topic: String,
    pub key: String,
    pub payload: String,
}

impl PublishedMessage {
    pub fn kind(&self) -> Option<String> {
        serde_json::from_str::<serde_json::Value>(&self.payload)
            .ok()?
            .get("type")?
            .as_str()
            .map(str::to_string)
    }

    pub fn data(&self) -> serde_json::Value {
        serde_json::from_str::<serde_json::Value>(&self.payload)
            .ok()
            .and_then(|v| v.get("data").cloned())
            .unwrap_or(serde_json::Value::Null)
    }
}

/// Keeps every message in memory. Used when no broker is configured and in tests.
#[derive(Default)]
pub struct RecordingPublisher {
    messages: Mutex<Vec<PublishedMessage>>,
    failing: AtomicBool,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent publish fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<PublishedMessage> {
        self.messages.lock().map(|m| m.clone()).unwrap_or_default()
    }

    pub fn of_kind(&self, kind: &str) -> Vec<PublishedMessage> {
        self.messages()
            .into_iter()
            .filter(|m| m.kind().as_deref() == Some(kind))
            .collect()
    }

    /// Wait until at least `count` messages of `kind` arrived, or `timeout` passes.
    pub async fn wait_for(&self, kind: &str, count: usize, timeout: Duration) -> Vec<PublishedMessage> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let found = self.of_kind(kind);
            if found.len() >= count || tokio::time::Instant::now() >= deadline {
                return found;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl NotificationPublisher for RecordingPublisher {
    async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), PublishError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PublishError {
                topic: topic.to_string(),
                reason: "broker unavailable".to_string(),
            });
        }
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(PublishedMessage {
                topic: topic.to_string(),
                key: key.to_string(),
                payload: payload.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boxoffice_shared::models::events::CancellationReason;

    #[tokio::test]
    async fn test_emits_envelope_on_topic() {
        let publisher = Arc::new(RecordingPublisher::new());
        let notifier = Notifier::new(publisher.clone(), "notifications");

        notifier.ticket_cancelled(TicketCancelledEvent {
            user_id: "user-9".to_string(),
            tickets: vec![],
            refunded_count: 0,
            reason: CancellationReason::UserRequested,
        });

        let messages = publisher.wait_for(TICKET_CANCELLED, 1, Duration::from_secs(1)).await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].topic, "notifications");
        assert_eq!(messages[0].key, "user-9");
        assert_eq!(messages[0].data()["reason"], "USER_REQUESTED");
    }

    #[tokio::test]
    async fn test_publish_failure_is_swallowed() {
        let publisher = Arc::new(RecordingPublisher::new());
        publisher.set_failing(true);
        let notifier = Notifier::new(publisher.clone(), "notifications");

        notifier.ticket_cancelled(TicketCancelledEvent {
            user_id: "user-9".to_string(),
            tickets: vec![],
            refunded_count: 0,
            reason: CancellationReason::ReservationExpired,
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(publisher.messages().is_empty());
    }
}
