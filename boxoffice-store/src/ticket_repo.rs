use async_trait::async_trait;
use boxoffice_core::{RepositoryError, Ticket, TicketQuery, TicketRepository, TicketSelector, TicketStatus};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

pub struct PostgresTicketRepository {
    pool: PgPool,
}

impl PostgresTicketRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const TICKET_COLUMNS: &str = "id, ticket_number, event_id, user_id, price, currency, status, payment_id, \
                              expires_at, checked_in, checked_in_at, created_at";

#[derive(sqlx::FromRow)]
struct TicketRow {
    id: Uuid,
    ticket_number: String,
    event_id: Uuid,
    user_id: String,
    price: i64,
    currency: String,
    status: String,
    payment_id: Option<String>,
    expires_at: Option<DateTime<Utc>>,
    checked_in: bool,
    checked_in_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<TicketRow> for Ticket {
    type Error = RepositoryError;

    fn try_from(row: TicketRow) -> Result<Self, Self::Error> {
        Ok(Ticket {
            id: row.id,
            ticket_number: row.ticket_number,
            event_id: row.event_id,
            user_id: row.user_id,
            price: row.price,
            currency: row.currency.parse().map_err(RepositoryError::Backend)?,
            status: row.status.parse().map_err(RepositoryError::Backend)?,
            payment_id: row.payment_id,
            expires_at: row.expires_at,
            checked_in: row.checked_in,
            checked_in_at: row.checked_in_at,
            created_at: row.created_at,
        })
    }
}

fn into_tickets(rows: Vec<TicketRow>) -> Result<Vec<Ticket>, RepositoryError> {
    rows.into_iter().map(Ticket::try_from).collect()
}

fn backend(err: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return RepositoryError::Duplicate(db_err.message().to_string());
        }
    }
    RepositoryError::Backend(err.to_string())
}

fn selector_statuses(selector: TicketSelector) -> Vec<String> {
    [TicketStatus::Reserved, TicketStatus::Purchased]
        .into_iter()
        .filter(|s| selector.matches(*s))
        .map(|s| s.as_str().to_string())
        .collect()
}

#[async_trait]
impl TicketRepository for PostgresTicketRepository {
    async fn insert(&self, ticket: &Ticket) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO tickets (id, ticket_number, event_id, user_id, price, currency, status, payment_id,
                                 expires_at, checked_in, checked_in_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(ticket.id)
        .bind(&ticket.ticket_number)
        .bind(ticket.event_id)
        .bind(&ticket.user_id)
        .bind(ticket.price)
        .bind(ticket.currency.code())
        .bind(ticket.status.as_str())
        .bind(&ticket.payment_id)
        .bind(ticket.expires_at)
        .bind(ticket.checked_in)
        .bind(ticket.checked_in_at)
        .bind(ticket.created_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn delete(&self, ids: &[Uuid]) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM tickets WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(result.rows_affected())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Ticket>, RepositoryError> {
        let row = sqlx::query_as::<_, TicketRow>(&format!("SELECT {} FROM tickets WHERE id = $1", TICKET_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.map(Ticket::try_from).transpose()
    }

    async fn find_owned(
        &self,
        ids: &[Uuid],
        user_id: &str,
        selector: TicketSelector,
    ) -> Result<Vec<Ticket>, RepositoryError> {
        let rows = sqlx::query_as::<_, TicketRow>(&format!(
            "SELECT {} FROM tickets WHERE id = ANY($1) AND user_id = $2 AND status = ANY($3)",
            TICKET_COLUMNS
        ))
        .bind(ids)
        .bind(user_id)
        .bind(selector_statuses(selector))
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        into_tickets(rows)
    }

    async fn find_by_number(&self, ticket_number: &str) -> Result<Option<Ticket>, RepositoryError> {
        let row = sqlx::query_as::<_, TicketRow>(&format!(
            "SELECT {} FROM tickets WHERE ticket_number = $1",
            TICKET_COLUMNS
        ))
        .bind(ticket_number)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.map(Ticket::try_from).transpose()
    }

    async fn list_for_user(&self, user_id: &str, query: &TicketQuery) -> Result<Vec<Ticket>, RepositoryError> {
        let rows = sqlx::query_as::<_, TicketRow>(&format!(
            r#"
            SELECT {} FROM tickets
            WHERE user_id = $1
              AND ($2::text IS NULL OR status = $2)
              AND ($3::uuid IS NULL OR event_id = $3)
            ORDER BY created_at DESC
            "#,
            TICKET_COLUMNS
        ))
        .bind(user_id)
        .bind(query.status.map(|s| s.as_str()))
        .bind(query.event_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        into_tickets(rows)
    }

    async fn mark_purchased(&self, ids: &[Uuid], user_id: &str, payment_id: &str) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let result = sqlx::query(
            r#"
            UPDATE tickets
            SET status = 'purchased', payment_id = $3, expires_at = NULL, updated_at = NOW()
            WHERE id = ANY($1) AND user_id = $2 AND status = 'reserved'
            "#,
        )
        .bind(ids)
        .bind(user_id)
        .bind(payment_id)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        if result.rows_affected() != ids.len() as u64 {
            tx.rollback().await.map_err(backend)?;
            return Err(RepositoryError::Conflict(format!(
                "{} of {} tickets still reserved",
                result.rows_affected(),
                ids.len()
            )));
        }

        tx.commit().await.map_err(backend)?;
        Ok(())
    }

    async fn mark_cancelled(&self, id: Uuid, from: TicketStatus) -> Result<bool, RepositoryError> {
        if !from.can_transition_to(TicketStatus::Cancelled) {
            return Ok(false);
        }
        let result = sqlx::query(
            r#"
            UPDATE tickets
            SET status = 'cancelled', expires_at = NULL, updated_at = NOW()
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(id)
        .bind(from.as_str())
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(result.rows_affected() == 1)
    }

    async fn mark_used(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE tickets
            SET status = 'used', checked_in = TRUE, checked_in_at = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'purchased' AND checked_in = FALSE
            "#,
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(result.rows_affected() == 1)
    }

    async fn find_expired_reservations(&self, cutoff: DateTime<Utc>, limit: usize) -> Result<Vec<Ticket>, RepositoryError> {
        let rows = sqlx::query_as::<_, TicketRow>(&format!(
            r#"
            SELECT {} FROM tickets
            WHERE status = 'reserved' AND expires_at < $1
            ORDER BY expires_at
            LIMIT $2
            "#,
            TICKET_COLUMNS
        ))
        .bind(cutoff)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        into_tickets(rows)
    }
}
