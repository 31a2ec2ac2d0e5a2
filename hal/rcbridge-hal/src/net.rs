//! Network link abstractions
//!
//! The bridge talks to exactly one pub/sub broker over one wireless link.
//! These traits split that into three layers:
//!
//! - [`WifiLink`]: link-layer association, polled for status
//! - [`Transport`]: a byte stream to the broker (TCP on real hardware)
//! - [`BrokerSession`]: the pub/sub session running over the transport
//!
//! Every async operation must be bounded by the implementation (socket
//! timeouts, join timeouts) so the control loop always regains control.

use embedded_io_async::{Read, Write};
use heapless::{String, Vec};

/// Longest topic name accepted from the broker
pub const MAX_TOPIC_LEN: usize = 64;

/// Longest payload accepted from the broker
pub const MAX_PAYLOAD_LEN: usize = 32;

/// Wireless link-layer association
pub trait WifiLink {
    /// Start (or restart) association with the configured network
    ///
    /// Returns immediately; progress is observed through [`is_connected`].
    ///
    /// [`is_connected`]: WifiLink::is_connected
    fn begin(&mut self);

    /// Check whether the link is associated and has an address
    fn is_connected(&self) -> bool;
}

/// Byte stream to the broker
#[allow(async_fn_in_trait)]
pub trait Transport: Read + Write {
    /// Open the stream to the configured endpoint
    async fn open(&mut self) -> Result<(), Self::Error>;

    /// Close the stream (no-op when already closed)
    fn close(&mut self);

    /// Check whether the stream is open
    fn is_open(&self) -> bool;

    /// Check whether a read would return data without waiting
    fn read_ready(&mut self) -> bool;
}

/// Message delivered by the broker on a subscribed topic
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BrokerMessage {
    /// Topic the message was published on
    pub topic: String<MAX_TOPIC_LEN>,
    /// Raw payload bytes
    pub payload: Vec<u8, MAX_PAYLOAD_LEN>,
}

impl BrokerMessage {
    /// Build a message, truncating oversize topic or payload
    pub fn new(topic: &str, payload: &[u8]) -> Self {
        let mut t = String::new();
        for c in topic.chars() {
            if t.push(c).is_err() {
                break;
            }
        }
        let mut p = Vec::new();
        let len = payload.len().min(MAX_PAYLOAD_LEN);
        // Cannot fail: len is bounded by capacity
        let _ = p.extend_from_slice(&payload[..len]);
        Self {
            topic: t,
            payload: p,
        }
    }
}

/// Pub/sub session with a broker
#[allow(async_fn_in_trait)]
pub trait BrokerSession {
    /// Error type for session operations
    type Error;

    /// Open the transport and perform the session handshake
    async fn connect(&mut self) -> Result<(), Self::Error>;

    /// Subscribe to a topic on the current session
    async fn subscribe(&mut self, topic: &str) -> Result<(), Self::Error>;

    /// Check whether the session is alive
    fn is_connected(&self) -> bool;

    /// Service the session and return at most one inbound message
    ///
    /// `now_ms` is a monotonic timestamp used for keep-alive bookkeeping.
    async fn poll(&mut self, now_ms: u64) -> Result<Option<BrokerMessage>, Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_truncates_payload() {
        let long = [b'1'; MAX_PAYLOAD_LEN + 8];
        let msg = BrokerMessage::new("f1/steering", &long);
        assert_eq!(msg.topic.as_str(), "f1/steering");
        assert_eq!(msg.payload.len(), MAX_PAYLOAD_LEN);
    }
}
