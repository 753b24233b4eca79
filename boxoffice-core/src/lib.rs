pub mod clock;
pub mod event;
pub mod inventory;
pub mod messaging;
pub mod payment;
pub mod repository;
pub mod ticket;

pub use clock::{Clock, ManualClock, SystemClock};
pub use event::{Currency, EventListing};
pub use inventory::{InventoryError, InventoryStore};
pub use messaging::{NotificationPublisher, PublishError};
pub use payment::{Charge, ChargeRequest, PaymentAdapter, PaymentError, PaymentStatus, Refund};
pub use repository::{RepositoryError, TicketQuery, TicketRepository, TicketSelector};
pub use ticket::{Ticket, TicketStatus};
