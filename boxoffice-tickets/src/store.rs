use async_trait::async_trait;
use boxoffice_core::{RepositoryError, Ticket, TicketQuery, TicketRepository, TicketSelector, TicketStatus};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Debug, Default)]
struct Faults {
    /// Inserts allowed before every further insert fails.
    inserts_before_failure: Option<usize>,
    /// Number of upcoming `mark_purchased` calls that fail as a backend outage.
    failing_purchase_writes: usize,
    /// Remaining `mark_cancelled` failures per ticket.
    failing_cancellations: HashMap<Uuid, usize>,
}

/// Ticket store kept in a map. Each trait call takes the lock once, so the
/// status-guarded writes are atomic with respect to each other.
#[derive(Default)]
pub struct InMemoryTicketStore {
    tickets: Mutex<HashMap<Uuid, Ticket>>,
    faults: Mutex<Faults>,
}

impl InMemoryTicketStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Let `count` more inserts succeed, then fail all following ones.
    pub fn fail_inserts_after(&self, count: usize) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.inserts_before_failure = Some(count);
        }
    }

    /// Fail the next `count` purchase writes with a backend error.
    pub fn fail_purchase_writes(&self, count: usize) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.failing_purchase_writes = count;
        }
    }

    /// Fail the next `count` cancellation writes for ticket `id`.
    pub fn fail_cancellations(&self, id: Uuid, count: usize) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.failing_cancellations.insert(id, count);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn count_by_status(&self, status: TicketStatus) -> usize {
        self.lock()
            .map(|t| t.values().filter(|ticket| ticket.status == status).count())
            .unwrap_or(0)
    }

    /// Overwrite a ticket as-is. For seeding state in tests.
    pub fn put(&self, ticket: Ticket) {
        if let Ok(mut tickets) = self.tickets.lock() {
            tickets.insert(ticket.id, ticket);
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<Uuid, Ticket>>, RepositoryError> {
        self.tickets
            .lock()
            .map_err(|_| RepositoryError::Backend("ticket store lock poisoned".to_string()))
    }

    fn take_insert_fault(&self) -> bool {
        let Ok(mut faults) = self.faults.lock() else {
            return false;
        };
        match faults.inserts_before_failure.as_mut() {
            Some(0) => true,
            Some(remaining) => {
                *remaining -= 1;
                false
            }
            None => false,
        }
    }

    fn take_purchase_fault(&self) -> bool {
        let Ok(mut faults) = self.faults.lock() else {
            return false;
        };
        if faults.failing_purchase_writes > 0 {
            faults.failing_purchase_writes -= 1;
            true
        } else {
            false
        }
    }

    fn take_cancellation_fault(&self, id: Uuid) -> bool {
        let Ok(mut faults) = self.faults.lock() else {
            return false;
        };
        match faults.failing_cancellations.get_mut(&id) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl TicketRepository for InMemoryTicketStore {
    async fn insert(&self, ticket: &Ticket) -> Result<(), RepositoryError> {
        if self.take_insert_fault() {
            return Err(RepositoryError::Backend("injected insert failure".to_string()));
        }
        let mut tickets = self.lock()?;
        if tickets.contains_key(&ticket.id) || tickets.values().any(|t| t.ticket_number == ticket.ticket_number) {
            return Err(RepositoryError::Duplicate(ticket.ticket_number.clone()));
        }
        tickets.insert(ticket.id, ticket.clone());
        Ok(())
    }

    async fn delete(&self, ids: &[Uuid]) -> Result<u64, RepositoryError> {
        let mut tickets = self.lock()?;
        Ok(ids.iter().filter(|id| tickets.remove(*id).is_some()).count() as u64)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Ticket>, RepositoryError> {
        Ok(self.lock()?.get(&id).cloned())
    }

    async fn find_owned(
        &self,
        ids: &[Uuid],
        user_id: &str,
        selector: TicketSelector,
    ) -> Result<Vec<Ticket>, RepositoryError> {
        let tickets = self.lock()?;
        Ok(ids
            .iter()
            .filter_map(|id| tickets.get(id))
            .filter(|t| t.user_id == user_id && selector.matches(t.status))
            .cloned()
            .collect())
    }

    async fn find_by_number(&self, ticket_number: &str) -> Result<Option<Ticket>, RepositoryError> {
        Ok(self.lock()?.values().find(|t| t.ticket_number == ticket_number).cloned())
    }

    async fn list_for_user(&self, user_id: &str, query: &TicketQuery) -> Result<Vec<Ticket>, RepositoryError> {
        let tickets = self.lock()?;
        let mut owned: Vec<Ticket> = tickets
            .values()
            .filter(|t| t.user_id == user_id)
            .filter(|t| query.status.map_or(true, |s| t.status == s))
            .filter(|t| query.event_id.map_or(true, |e| t.event_id == e))
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(owned)
    }

    async fn mark_purchased(&self, ids: &[Uuid], user_id: &str, payment_id: &str) -> Result<(), RepositoryError> {
        if self.take_purchase_fault() {
            return Err(RepositoryError::Backend("injected write failure".to_string()));
        }
        let mut tickets = self.lock()?;
        let all_reserved = ids.iter().all(|id| {
            tickets
                .get(id)
                .map(|t| t.user_id == user_id && t.status == TicketStatus::Reserved)
                .unwrap_or(false)
        });
        if !all_reserved {
            return Err(RepositoryError::Conflict(format!(
                "{} tickets are no longer reserved",
                ids.len()
            )));
        }
        for id in ids {
            if let Some(ticket) = tickets.get_mut(id) {
                ticket.mark_purchased(payment_id);
            }
        }
        Ok(())
    }

    async fn mark_cancelled(&self, id: Uuid, from: TicketStatus) -> Result<bool, RepositoryError> {
        if self.take_cancellation_fault(id) {
            return Err(RepositoryError::Backend("injected cancellation failure".to_string()));
        }
        let mut tickets = self.lock()?;
        match tickets.get_mut(&id) {
            Some(ticket) if ticket.status == from && from.can_transition_to(TicketStatus::Cancelled) => {
                ticket.mark_cancelled();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_used(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, RepositoryError> {
        let mut tickets = self.lock()?;
        match tickets.get_mut(&id) {
            Some(ticket) if ticket.status == TicketStatus::Purchased => {
                ticket.mark_used(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_expired_reservations(&self, cutoff: DateTime<Utc>, limit: usize) -> Result<Vec<Ticket>, RepositoryError> {
        let tickets = self.lock()?;
        let mut expired: Vec<Ticket> = tickets
            .values()
            .filter(|t| t.status == TicketStatus::Reserved && t.expires_at.map_or(false, |at| at < cutoff))
            .cloned()
            .collect();
        expired.sort_by_key(|t| t.expires_at);
        expired.truncate(limit);
        Ok(expired)
    }
}
