//! Refresh orchestration
//!
//! Reconciles the local state store against live NEXX and Quartz state
//! under the persisted single-flight lock.

pub mod nexx_sync;
pub mod quartz_sync;
pub mod service;
pub mod types;

pub use service::RefreshOrchestrator;
pub use types::{RefreshRequest, RefreshScope, RefreshSettings};
