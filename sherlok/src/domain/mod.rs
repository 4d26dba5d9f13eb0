//! Domain model for the monitor core
//!
//! Core value types and errors shared across the registries, dispatcher, and
//! command layer:
//! - Compile-time safety via newtype pattern
//! - Structured error handling per failure class

pub mod errors;
pub mod types;

pub use errors::{CommandError, MonitorError, ShellError};
pub use types::{Bytes, GcIndex, Generation, Micros};
