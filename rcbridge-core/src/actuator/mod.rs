//! Actuator mapping
//!
//! Turns normalized control values into output levels for the fitted
//! hardware.

pub mod mapper;

pub use mapper::{ActuatorMapper, ThrottleSignal};
