//! ABOUTME: Core types, errors, and tracing utilities
//! ABOUTME: Foundation crate used by all other framewatch components

pub mod error;
pub mod telemetry;
pub mod time;

pub use error::{Error, Result};
pub use time::{to_rfc3339, CycleTimer};
