//! Runtime state
//!
//! [`ControlState`] holds the last commanded values. [`ConnectionState`] is
//! the explicit, finite link state machine driven by the connection
//! manager.

pub mod connection;
pub mod control;

pub use connection::{ConnectionState, LinkEvent, LinkLoss};
pub use control::{ControlState, MAX_TRIM_US};
