use boxoffice_core::{Ticket, TicketQuery};

use crate::context::SagaContext;
use crate::error::SagaResult;

/// A user's tickets, newest first, optionally narrowed by status or event.
pub async fn list_for_user(ctx: &SagaContext, user_id: &str, query: &TicketQuery) -> SagaResult<Vec<Ticket>> {
    Ok(ctx.tickets.list_for_user(user_id, query).await?)
}
