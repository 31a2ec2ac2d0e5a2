//! Broker session implementations

pub mod mqtt;

pub use mqtt::{MqttBroker, MqttSettings, SessionError};
