use async_trait::async_trait;
use boxoffice_core::{Currency, EventListing, InventoryError, InventoryStore};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

/// Seat counters in the `events` table. The bounded delta is one
/// conditional UPDATE, so Postgres row locking serializes concurrent
/// adjustments of the same event.
pub struct PostgresInventoryStore {
    pool: PgPool,
}

impl PostgresInventoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: Uuid,
    name: String,
    starts_at: DateTime<Utc>,
    price: i64,
    currency: String,
    creator_id: String,
    total_capacity: i32,
    available_seats: i32,
}

impl TryFrom<EventRow> for EventListing {
    type Error = InventoryError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let currency: Currency = row.currency.parse().map_err(InventoryError::Backend)?;
        Ok(EventListing {
            id: row.id,
            name: row.name,
            starts_at: row.starts_at,
            price: row.price,
            currency,
            creator_id: row.creator_id,
            total_capacity: row.total_capacity,
            available_seats: row.available_seats,
        })
    }
}

fn backend(err: sqlx::Error) -> InventoryError {
    InventoryError::Backend(err.to_string())
}

#[async_trait]
impl InventoryStore for PostgresInventoryStore {
    async fn get_event(&self, event_id: Uuid) -> Result<Option<EventListing>, InventoryError> {
        let row = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT id, name, starts_at, price, currency, creator_id, total_capacity, available_seats
            FROM events
            WHERE id = $1
            "#,
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(EventListing::try_from).transpose()
    }

    async fn adjust_seats(&self, event_id: Uuid, delta: i32) -> Result<i32, InventoryError> {
        let updated: Option<(i32,)> = sqlx::query_as(
            r#"
            UPDATE events
            SET available_seats = available_seats + $2, updated_at = NOW()
            WHERE id = $1
              AND available_seats + $2 >= 0
              AND available_seats + $2 <= total_capacity
            RETURNING available_seats
            "#,
        )
        .bind(event_id)
        .bind(delta)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        if let Some((available,)) = updated {
            debug!(%event_id, delta, available, "Seats adjusted");
            return Ok(available);
        }

        let counters: Option<(i32, i32)> =
            sqlx::query_as("SELECT available_seats, total_capacity FROM events WHERE id = $1")
                .bind(event_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(backend)?;

        match counters {
            Some((available, capacity)) => Err(InventoryError::rejected(delta, available, capacity)),
            None => Err(InventoryError::EventNotFound(event_id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_conversion_rejects_unknown_currency() {
        let row = EventRow {
            id: Uuid::new_v4(),
            name: "Ballet".to_string(),
            starts_at: Utc::now(),
            price: 3000,
            currency: "JPY".to_string(),
            creator_id: "org".to_string(),
            total_capacity: 10,
            available_seats: 10,
        };
        assert!(matches!(EventListing::try_from(row), Err(InventoryError::Backend(_))));
    }
}
