//! Shared types for guestvm crates.
//!
//! Holds the error taxonomy every layer reports through and the fixed
//! device policy constants the configuration builder and backends agree on.

pub mod constants;
pub mod errors;

pub use errors::{GuestVmError, GuestVmResult};
