pub mod event;
pub mod inventory;

pub use event::EventBuilder;
pub use inventory::InMemoryInventory;
