//! Local mirror of device state
//!
//! ## Responsibilities
//! - Entity shapes (units, settings, windows, sources, routing)
//! - The persisted single-row refresh lock and its result document
//! - `StateStore` seam with MySQL and in-memory implementations

pub mod memory;
pub mod repository;
pub mod store;
pub mod types;

pub use memory::MemoryStateStore;
pub use repository::StateRepository;
pub use store::StateStore;
pub use types::*;
