//! Quartz router line protocol
//!
//! ## Commands
//! - `.RD{n}` / `.RS{n}` name reads (swapped on this firmware)
//! - `.IV{out}` routing read, reply `.AV{out},{in}`
//! - `.SV{out},{in}` switch; `.E` error, `.B` output locked

pub mod client;
pub mod reply;

pub use client::{QuartzClient, RouterDevice, DEFAULT_PORT};
