//! NEXX multiviewer protocol
//!
//! ## Responsibilities
//! - VarID table and parameter addressing
//! - Reply normalization into [`DeviceValue`]
//! - Index/value translation tables (PCM bars, borders) and labels
//! - 40-parameter batch planning
//! - HTTP client with API key / JWT authentication

pub mod batch;
pub mod client;
pub mod codec;
pub mod mappings;
pub mod varid;

pub use batch::BatchPlanner;
pub use client::{JwtCredentials, MultiviewerDevice, NexxClient};
pub use codec::{DeviceValue, ParameterAddress, ParameterValues};
pub use varid::VarId;
