//! Throttle driver implementations
//!
//! - ESC: servo-style pulse, neutral pulse doubles as brake
//! - H-bridge: two direction inputs plus a duty-cycle enable, brake shorts
//!   the motor terminals

pub mod esc;
pub mod hbridge;

pub use esc::Esc;
pub use hbridge::HBridge;
