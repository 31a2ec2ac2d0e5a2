//! RC Bridge Hardware Abstraction Layer
//!
//! This crate defines the hardware abstraction traits the bridge logic is
//! written against. Chip-specific HALs (currently RP2040) implement them,
//! and host tests implement them with fakes.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  rcbridge-core / rcbridge-drivers       │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  rcbridge-hal (this crate - traits)     │
//! └─────────────────────────────────────────┘
//!                     │
//!         ┌───────────┴───────────┐
//!         ▼                       ▼
//! ┌───────────────┐       ┌───────────────┐
//! │ rcbridge-hal- │       │  host fakes   │
//! │    rp2040     │       │  (tests)      │
//! └───────────────┘       └───────────────┘
//! ```
//!
//! # Traits
//!
//! - [`gpio::OutputPin`], [`gpio::InputPin`] - Digital I/O
//! - [`pwm::ServoPwm`], [`pwm::DutyPwm`] - Pulse-width outputs
//! - [`adc::AnalogInput`] - Analog sampling
//! - [`uart::UartTx`], [`uart::UartRx`] - Serial communication
//! - [`net::WifiLink`], [`net::BrokerSession`], [`net::Transport`] - Network link

#![no_std]
#![deny(unsafe_code)]

pub mod adc;
pub mod gpio;
pub mod net;
pub mod pwm;
pub mod uart;

// Re-export key traits at crate root for convenience
pub use adc::AnalogInput;
pub use gpio::{InputPin, OutputPin};
pub use net::{BrokerMessage, BrokerSession, Transport, WifiLink};
pub use pwm::{DutyPwm, ServoPwm};
pub use uart::{UartRx, UartTx};
