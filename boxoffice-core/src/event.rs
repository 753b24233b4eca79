use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Eur,
    Usd,
    Gbp,
}

impl Currency {
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Eur => "EUR",
            Currency::Usd => "USD",
            Currency::Gbp => "GBP",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "EUR" => Ok(Currency::Eur),
            "USD" => Ok(Currency::Usd),
            "GBP" => Ok(Currency::Gbp),
            other => Err(format!("unsupported currency: {}", other)),
        }
    }
}

/// The slice of an event record the saga needs: identity, date, pricing and
/// the seat counters. `available_seats` is the only field the saga mutates and
/// only through `InventoryStore::adjust_seats`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventListing {
    pub id: Uuid,
    pub name: String,
    pub starts_at: DateTime<Utc>,
    /// Per-ticket price in minor currency units.
    pub price: i64,
    pub currency: Currency,
    pub creator_id: String,
    pub total_capacity: i32,
    pub available_seats: i32,
}

impl EventListing {
    pub fn has_occurred(&self, now: DateTime<Utc>) -> bool {
        self.starts_at < now
    }

    pub fn sold_or_held(&self) -> i32 {
        self.total_capacity - self.available_seats
    }

    pub fn utilization(&self) -> f64 {
        if self.total_capacity == 0 {
            0.0
        } else {
            1.0 - (self.available_seats as f64 / self.total_capacity as f64)
        }
    }
}
