use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::ticket::{Ticket, TicketStatus};

/// Which of a user's tickets a coordinator is allowed to pick up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketSelector {
    /// Only `Reserved` tickets (purchase).
    Reserved,
    /// `Reserved` or `Purchased` tickets (cancellation).
    Active,
}

impl TicketSelector {
    pub fn matches(&self, status: TicketStatus) -> bool {
        match self {
            TicketSelector::Reserved => status == TicketStatus::Reserved,
            TicketSelector::Active => status.is_active(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TicketQuery {
    pub status: Option<TicketStatus>,
    pub event_id: Option<Uuid>,
}

/// Repository for ticket records. Every state change is a status-guarded
/// write: it only applies when the stored status still matches what the
/// caller fetched, which is what keeps two coordinators off the same ticket.
#[async_trait]
pub trait TicketRepository: Send + Sync {
    /// Fails with `Duplicate` if the id or ticket number already exists.
    async fn insert(&self, ticket: &Ticket) -> Result<(), RepositoryError>;

    async fn delete(&self, ids: &[Uuid]) -> Result<u64, RepositoryError>;

    async fn get(&self, id: Uuid) -> Result<Option<Ticket>, RepositoryError>;

    async fn find_owned(
        &self,
        ids: &[Uuid],
        user_id: &str,
        selector: TicketSelector,
    ) -> Result<Vec<Ticket>, RepositoryError>;

    async fn find_by_number(&self, ticket_number: &str) -> Result<Option<Ticket>, RepositoryError>;

    /// Newest first.
    async fn list_for_user(&self, user_id: &str, query: &TicketQuery) -> Result<Vec<Ticket>, RepositoryError>;

    /// Moves every listed ticket from `Reserved` to `Purchased` in one write.
    /// If any of them is no longer `Reserved` (or not owned by `user_id`),
    /// nothing changes and `Conflict` is returned.
    async fn mark_purchased(&self, ids: &[Uuid], user_id: &str, payment_id: &str) -> Result<(), RepositoryError>;

    /// Returns `true` only if this call performed the `from -> Cancelled` transition.
    async fn mark_cancelled(&self, id: Uuid, from: TicketStatus) -> Result<bool, RepositoryError>;

    /// Returns `true` only if this call performed the `Purchased -> Used` transition.
    async fn mark_used(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, RepositoryError>;

    /// Reserved tickets whose deadline is before `cutoff`, oldest first.
    async fn find_expired_reservations(&self, cutoff: DateTime<Utc>, limit: usize) -> Result<Vec<Ticket>, RepositoryError>;
}

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum RepositoryError {
    #[error("Duplicate ticket: {0}")]
    Duplicate(String),

    #[error("Ticket state conflict: {0}")]
    Conflict(String),

    #[error("Ticket store error: {0}")]
    Backend(String),
}

impl RepositoryError {
    pub fn is_transient(&self) -> bool {
        matches!(self, RepositoryError::Backend(_))
    }
}
