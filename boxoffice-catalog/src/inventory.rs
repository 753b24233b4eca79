use async_trait::async_trait;
use boxoffice_core::{EventListing, InventoryError, InventoryStore};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

/// In-process inventory. Every read and delta goes through one mutex, so
/// adjustments for an event are serialized; the guard never lives across an
/// `.await`.
pub struct InMemoryInventory {
    events: Mutex<HashMap<Uuid, EventListing>>,
    /// Upcoming seat releases (positive deltas) that fail as a backend outage.
    failing_releases: Mutex<usize>,
}

impl InMemoryInventory {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(HashMap::new()),
            failing_releases: Mutex::new(0),
        }
    }

    /// Fail the next `count` seat releases with a backend error.
    pub fn fail_releases(&self, count: usize) {
        if let Ok(mut failing) = self.failing_releases.lock() {
            *failing = count;
        }
    }

    /// Register an event with its full capacity available.
    pub fn initialize(&self, mut event: EventListing) -> Result<(), InventoryError> {
        event.available_seats = event.total_capacity;
        self.lock()?.insert(event.id, event);
        Ok(())
    }

    pub fn available(&self, event_id: &Uuid) -> Option<i32> {
        self.lock().ok()?.get(event_id).map(|e| e.available_seats)
    }

    pub fn utilization(&self, event_id: &Uuid) -> Option<f64> {
        self.lock().ok()?.get(event_id).map(|e| e.utilization())
    }

    fn take_release_fault(&self) -> bool {
        let Ok(mut failing) = self.failing_releases.lock() else {
            return false;
        };
        if *failing > 0 {
            *failing -= 1;
            true
        } else {
            false
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<Uuid, EventListing>>, InventoryError> {
        self.events
            .lock()
            .map_err(|_| InventoryError::Backend("inventory lock poisoned".to_string()))
    }
}

impl Default for InMemoryInventory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InventoryStore for InMemoryInventory {
    async fn get_event(&self, event_id: Uuid) -> Result<Option<EventListing>, InventoryError> {
        Ok(self.lock()?.get(&event_id).cloned())
    }

    async fn adjust_seats(&self, event_id: Uuid, delta: i32) -> Result<i32, InventoryError> {
        if delta > 0 && self.take_release_fault() {
            return Err(InventoryError::Backend("injected release failure".to_string()));
        }
        let mut events = self.lock()?;
        let event = events
            .get_mut(&event_id)
            .ok_or(InventoryError::EventNotFound(event_id))?;

        let next = event.available_seats + delta;
        if next < 0 || next > event.total_capacity {
            return Err(InventoryError::rejected(delta, event.available_seats, event.total_capacity));
        }

        event.available_seats = next;
        debug!(%event_id, delta, available = next, "Seats adjusted");
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventBuilder;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_inventory_lifecycle() {
        let inventory = InMemoryInventory::new();
        let event = EventBuilder::new("Opera").capacity(100).build();
        let event_id = event.id;
        inventory.initialize(event).unwrap();

        assert_eq!(inventory.adjust_seats(event_id, -10).await.unwrap(), 90);
        assert_eq!(inventory.available(&event_id), Some(90));
        assert!((inventory.utilization(&event_id).unwrap() - 0.1).abs() < 0.01);

        assert_eq!(inventory.adjust_seats(event_id, 10).await.unwrap(), 100);
    }

    #[tokio::test]
    async fn test_rejects_underflow_and_overflow() {
        let inventory = InMemoryInventory::new();
        let event = EventBuilder::new("Club Night").capacity(2).build();
        let event_id = event.id;
        inventory.initialize(event).unwrap();

        let err = inventory.adjust_seats(event_id, -3).await.unwrap_err();
        assert_eq!(err, InventoryError::InsufficientCapacity { requested: 3, available: 2 });

        let err = inventory.adjust_seats(event_id, 1).await.unwrap_err();
        assert!(matches!(err, InventoryError::CapacityExceeded { .. }));
        assert_eq!(inventory.available(&event_id), Some(2));
    }

    #[tokio::test]
    async fn test_injected_release_faults_only_hit_releases() {
        let inventory = InMemoryInventory::new();
        let event = EventBuilder::new("Jazz Brunch").capacity(4).build();
        let event_id = event.id;
        inventory.initialize(event).unwrap();
        inventory.fail_releases(1);

        assert_eq!(inventory.adjust_seats(event_id, -2).await.unwrap(), 2);
        let err = inventory.adjust_seats(event_id, 1).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(inventory.adjust_seats(event_id, 1).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_unknown_event() {
        let inventory = InMemoryInventory::new();
        let missing = Uuid::new_v4();
        assert_eq!(
            inventory.adjust_seats(missing, -1).await.unwrap_err(),
            InventoryError::EventNotFound(missing)
        );
        assert!(inventory.get_event(missing).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_decrements_never_go_negative() {
        let inventory = Arc::new(InMemoryInventory::new());
        let event = EventBuilder::new("Stadium").capacity(50).build();
        let event_id = event.id;
        inventory.initialize(event).unwrap();

        let attempts = (0..200).map(|_| {
            let inventory = inventory.clone();
            tokio::spawn(async move { inventory.adjust_seats(event_id, -1).await })
        });
        let results = futures_util::future::join_all(attempts).await;

        let granted = results.into_iter().filter(|r| matches!(r, Ok(Ok(_)))).count();
        assert_eq!(granted, 50);
        assert_eq!(inventory.available(&event_id), Some(0));
    }
}
