//! Hardware driver implementations
//!
//! This crate provides concrete implementations of the traits defined
//! in rcbridge-core and rcbridge-hal:
//!
//! - Steering servo on a servo-style PWM output
//! - Throttle drivers (servo-style ESC, dual-input H-bridge)
//! - MQTT broker session over any [`Transport`](rcbridge_hal::Transport)

#![no_std]
#![deny(unsafe_code)]

#[cfg(test)]
extern crate std;

#[macro_use]
extern crate rcbridge_core;

pub mod broker;
pub mod motor;
pub mod servo;

pub use broker::{MqttBroker, MqttSettings, SessionError};
pub use motor::{Esc, HBridge};
pub use servo::SteeringServo;
