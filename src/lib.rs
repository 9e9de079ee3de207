//! Multiviewer / Router Control Server
//!
//! Keeps a local mirror of NEXX multiviewer and Quartz router state and
//! pushes operator changes back to the devices.
//!
//! ## Components
//!
//! 1. NexxClient - NEXX HTTP parameter API (GET/SET, batches, JWT)
//! 2. QuartzClient - Quartz TCP command protocol
//! 3. FetchScheduler - Bounded-concurrency fan-out with failure isolation
//! 4. MvState - Local state mirror and persisted refresh lock
//! 5. Integration - Stored device connections
//! 6. RefreshOrchestrator - Single-flight refresh pass
//! 7. MvControl - Operator push operations
//! 8. WebAPI - REST API endpoints

pub mod error;
pub mod fetch_scheduler;
pub mod integration;
pub mod models;
pub mod mv_control;
pub mod mv_state;
pub mod nexx_client;
pub mod quartz_client;
pub mod refresh_orchestrator;
pub mod state;
pub mod web_api;

pub use error::{Error, Result};
pub use state::AppState;
