use async_trait::async_trait;
use uuid::Uuid;

use crate::event::EventListing;

/// The single seat-count authority every coordinator goes through.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn get_event(&self, event_id: Uuid) -> Result<Option<EventListing>, InventoryError>;

    /// Atomically apply `delta` to the event's available seats and return the
    /// new count. Rejects any delta that would leave the count outside
    /// `0..=total_capacity`; concurrent calls for one event are serialized.
    async fn adjust_seats(&self, event_id: Uuid, delta: i32) -> Result<i32, InventoryError>;
}

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum InventoryError {
    #[error("Event not found: {0}")]
    EventNotFound(Uuid),

    #[error("Insufficient capacity: requested {requested}, available {available}")]
    InsufficientCapacity { requested: i32, available: i32 },

    #[error("Seat release would exceed capacity: releasing {releasing}, available {available}, capacity {capacity}")]
    CapacityExceeded {
        releasing: i32,
        available: i32,
        capacity: i32,
    },

    #[error("Inventory backend error: {0}")]
    Backend(String),
}

impl InventoryError {
    /// Classifies a rejected delta against the counters observed at rejection time.
    pub fn rejected(delta: i32, available: i32, capacity: i32) -> Self {
        if delta < 0 {
            InventoryError::InsufficientCapacity {
                requested: -delta,
                available,
            }
        } else {
            InventoryError::CapacityExceeded {
                releasing: delta,
                available,
                capacity,
            }
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, InventoryError::Backend(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_classification() {
        assert_eq!(
            InventoryError::rejected(-3, 1, 10),
            InventoryError::InsufficientCapacity { requested: 3, available: 1 }
        );
        assert!(matches!(
            InventoryError::rejected(2, 9, 10),
            InventoryError::CapacityExceeded { releasing: 2, .. }
        ));
    }
}
