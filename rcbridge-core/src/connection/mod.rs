//! Connection management
//!
//! Owns WiFi association and the broker session, retries on loss, and
//! re-subscribes on every reconnect.

pub mod manager;

pub use manager::{write_status, ConnectionManager, ConnectionTiming, STATUS_PREFIX};
