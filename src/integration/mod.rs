//! Device integrations
//!
//! One stored connection per protocol (`nexx`, `quartz`), resolved into
//! protocol clients on demand.

pub mod devices;
pub mod repository;
pub mod service;
pub mod types;

pub use devices::{DeviceProvider, DeviceSet, RouterTarget};
pub use repository::IntegrationRepository;
pub use service::{ClientTimeouts, IntegrationService};
pub use types::*;
