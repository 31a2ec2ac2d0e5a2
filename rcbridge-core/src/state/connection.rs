//! Connection state machine
//!
//! ```text
//!  Disconnected ─Start─▶ WifiConnecting ─WifiAssociated─▶ WifiConnected
//!       ▲                                                      │
//!       │                                                BrokerAttempt
//!   LinkLost (from any state)                                  ▼
//!       │                 Ready ◀─────Subscribed───── BrokerConnecting
//! ```
//!
//! `Ready` is only reachable through `Subscribed`, so every entry into
//! `Ready` follows a full set of subscriptions.

/// Which link was found down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkLoss {
    Wifi,
    Broker,
}

/// Link states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionState {
    /// No link; nothing in progress
    #[default]
    Disconnected,
    /// Association started, waiting for the link
    WifiConnecting,
    /// Link up, no broker session
    WifiConnected,
    /// Broker handshake and subscriptions in progress
    BrokerConnecting,
    /// Session up and all topics subscribed
    Ready,
}

/// Events that drive the connection state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkEvent {
    /// Association requested
    Start,
    /// Link-layer association reported up
    WifiAssociated,
    /// Broker connect attempt begins
    BrokerAttempt,
    /// Broker session up and every topic subscribed
    Subscribed,
    /// A link was found down
    LinkLost(LinkLoss),
}

impl ConnectionState {
    /// Commands from the broker are only accepted when ready
    pub fn is_ready(&self) -> bool {
        matches!(self, ConnectionState::Ready)
    }

    /// Check if the WiFi link is believed to be up
    pub fn wifi_up(&self) -> bool {
        matches!(
            self,
            ConnectionState::WifiConnected
                | ConnectionState::BrokerConnecting
                | ConnectionState::Ready
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::WifiConnecting => "wifi connecting",
            ConnectionState::WifiConnected => "wifi connected",
            ConnectionState::BrokerConnecting => "broker connecting",
            ConnectionState::Ready => "ready",
        }
    }

    /// Process an event and return the next state
    pub fn transition(self, event: LinkEvent) -> Self {
        use ConnectionState::*;
        use LinkEvent::*;

        match (self, event) {
            (_, LinkLost(_)) => Disconnected,
            (Disconnected, Start) => WifiConnecting,
            (WifiConnecting, WifiAssociated) => WifiConnected,
            (WifiConnected, BrokerAttempt) => BrokerConnecting,
            (BrokerConnecting, Subscribed) => Ready,

            // Default: stay in current state
            _ => self,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_path() {
        let state = ConnectionState::Disconnected
            .transition(LinkEvent::Start)
            .transition(LinkEvent::WifiAssociated)
            .transition(LinkEvent::BrokerAttempt)
            .transition(LinkEvent::Subscribed);
        assert_eq!(state, ConnectionState::Ready);
    }

    #[test]
    fn test_link_lost_from_any_state() {
        let states = [
            ConnectionState::WifiConnecting,
            ConnectionState::WifiConnected,
            ConnectionState::BrokerConnecting,
            ConnectionState::Ready,
        ];

        for state in states {
            let next = state.transition(LinkEvent::LinkLost(LinkLoss::Broker));
            assert_eq!(next, ConnectionState::Disconnected);
        }
    }

    #[test]
    fn test_ready_not_skippable() {
        // Subscribed outside BrokerConnecting does nothing
        assert_eq!(
            ConnectionState::WifiConnected.transition(LinkEvent::Subscribed),
            ConnectionState::WifiConnected
        );
        assert_eq!(
            ConnectionState::Disconnected.transition(LinkEvent::WifiAssociated),
            ConnectionState::Disconnected
        );
    }

    #[test]
    fn test_wifi_up() {
        assert!(ConnectionState::Ready.wifi_up());
        assert!(!ConnectionState::WifiConnecting.wifi_up());
        assert!(ConnectionState::Ready.is_ready());
        assert!(!ConnectionState::BrokerConnecting.is_ready());
    }
}
