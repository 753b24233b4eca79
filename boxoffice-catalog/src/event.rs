use boxoffice_core::{Currency, EventListing};
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

/// Builds `EventListing` records for seeding an in-process inventory
/// (local development and tests). Defaults: one week out, 100 seats,
/// 25.00 EUR per ticket.
#[derive(Debug, Clone)]
pub struct EventBuilder {
    id: Uuid,
    name: String,
    starts_at: DateTime<Utc>,
    price: i64,
    currency: Currency,
    creator_id: String,
    capacity: i32,
}

impl EventBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            starts_at: Utc::now() + Duration::days(7),
            price: 2500,
            currency: Currency::Eur,
            creator_id: "organizer".to_string(),
            capacity: 100,
        }
    }

    pub fn id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    pub fn starts_at(mut self, starts_at: DateTime<Utc>) -> Self {
        self.starts_at = starts_at;
        self
    }

    pub fn price(mut self, price: i64, currency: Currency) -> Self {
        self.price = price;
        self.currency = currency;
        self
    }

    pub fn creator(mut self, creator_id: &str) -> Self {
        self.creator_id = creator_id.to_string();
        self
    }

    /// Capacity is clamped to at least one seat.
    pub fn capacity(mut self, capacity: i32) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn build(self) -> EventListing {
        EventListing {
            id: self.id,
            name: self.name,
            starts_at: self.starts_at,
            price: self.price,
            currency: self.currency,
            creator_id: self.creator_id,
            total_capacity: self.capacity,
            available_seats: self.capacity,
        }
    }
}
