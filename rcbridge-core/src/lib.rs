//! Board-agnostic core logic for the RC bridge firmware
//!
//! This crate contains all application logic that does not depend on
//! specific hardware implementations:
//!
//! - Actuator traits and the actuator mapper (normalized value to pulse/duty)
//! - Control and connection state
//! - Connection manager (WiFi association, broker session, re-subscribe)
//! - Transport dispatcher (one cooperative control-loop tick)
//! - ESC arming sequence
//! - Diagnostic runner
//! - Configuration types and parser

#![no_std]
#![deny(unsafe_code)]

#[cfg(test)]
extern crate std;

#[macro_use]
pub mod logging;

pub mod actuator;
pub mod arming;
pub mod config;
pub mod connection;
pub mod diagnostics;
pub mod dispatch;
pub mod state;
pub mod traits;

#[cfg(test)]
pub(crate) mod testing;
