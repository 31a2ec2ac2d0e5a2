//! Connection manager
//!
//! Each call to [`ConnectionManager::service`] checks the links, then walks
//! the state machine forward as far as it can without waiting. When it must
//! wait (association pending, broker refused) it sleeps for one bounded
//! interval and returns, so the caller's loop keeps turning.

use embedded_hal_async::delay::DelayNs;
use rcbridge_hal::{BrokerSession, UartTx, WifiLink};
use rcbridge_protocol::{TopicKind, TopicMap};

use crate::config::{BrokerConfig, WifiConfig};
use crate::state::{ConnectionState, LinkEvent, LinkLoss};

/// Prefix for link status lines written to the serial port
pub const STATUS_PREFIX: &str = "STATUS:";

/// Write a `STATUS:<text>` line, ignoring serial errors
pub fn write_status<U: UartTx + ?Sized>(out: &mut U, text: &str) {
    let _ = out.write_blocking(STATUS_PREFIX.as_bytes());
    let _ = out.write_line(text);
}

/// Retry timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnectionTiming {
    /// Wait between association polls
    pub poll_interval_ms: u32,
    /// Restart association after this many polls
    pub rejoin_every: u16,
    /// Wait after a failed broker attempt
    pub retry_ms: u32,
}

impl ConnectionTiming {
    pub fn from_config(wifi: &WifiConfig, broker: &BrokerConfig) -> Self {
        Self {
            poll_interval_ms: wifi.poll_interval_ms,
            rejoin_every: wifi.rejoin_every.max(1),
            retry_ms: broker.retry_ms,
        }
    }
}

impl Default for ConnectionTiming {
    fn default() -> Self {
        Self::from_config(&WifiConfig::default(), &BrokerConfig::default())
    }
}

/// Drives the link state machine against real links
#[derive(Debug, Clone)]
pub struct ConnectionManager {
    state: ConnectionState,
    topics: TopicMap,
    timing: ConnectionTiming,
    /// Polls since association was last (re)started
    wifi_polls: u16,
    /// Number of times `Ready` has been entered
    sessions: u32,
}

impl ConnectionManager {
    pub fn new(topics: TopicMap, timing: ConnectionTiming) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            topics,
            timing,
            wifi_polls: 0,
            sessions: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn topics(&self) -> &TopicMap {
        &self.topics
    }

    /// Number of sessions established since boot
    pub fn sessions(&self) -> u32 {
        self.sessions
    }

    /// Check the links and advance the state machine
    ///
    /// Returns the state after servicing. Waits at most one poll or retry
    /// interval.
    pub async fn service<W, B, D, U>(
        &mut self,
        wifi: &mut W,
        broker: &mut B,
        delay: &mut D,
        status: &mut U,
    ) -> ConnectionState
    where
        W: WifiLink + ?Sized,
        B: BrokerSession + ?Sized,
        D: DelayNs + ?Sized,
        U: UartTx + ?Sized,
    {
        self.check_links(wifi, broker, status);

        loop {
            match self.state {
                ConnectionState::Disconnected => {
                    // An association that survived a broker drop is reused
                    if !wifi.is_connected() {
                        log_info!("starting wifi association");
                        wifi.begin();
                    }
                    self.wifi_polls = 0;
                    self.advance(LinkEvent::Start, status);
                }
                ConnectionState::WifiConnecting => {
                    if wifi.is_connected() {
                        self.advance(LinkEvent::WifiAssociated, status);
                        continue;
                    }

                    self.wifi_polls += 1;
                    if self.wifi_polls >= self.timing.rejoin_every {
                        log_warn!("wifi still down after {} polls, rejoining", self.wifi_polls);
                        wifi.begin();
                        self.wifi_polls = 0;
                    }
                    delay.delay_ms(self.timing.poll_interval_ms).await;
                    return self.state;
                }
                ConnectionState::WifiConnected => {
                    self.advance(LinkEvent::BrokerAttempt, status);
                }
                ConnectionState::BrokerConnecting => {
                    if self.open_session(broker).await {
                        self.sessions = self.sessions.saturating_add(1);
                        self.advance(LinkEvent::Subscribed, status);
                        return self.state;
                    }

                    log_warn!("broker unavailable, retrying in {} ms", self.timing.retry_ms);
                    delay.delay_ms(self.timing.retry_ms).await;
                    return self.state;
                }
                ConnectionState::Ready => return self.state,
            }
        }
    }

    /// Fall back to `Disconnected` if a link the current state relies on is down
    fn check_links<W, B, U>(&mut self, wifi: &W, broker: &B, status: &mut U)
    where
        W: WifiLink + ?Sized,
        B: BrokerSession + ?Sized,
        U: UartTx + ?Sized,
    {
        let loss = if self.state.wifi_up() && !wifi.is_connected() {
            Some(LinkLoss::Wifi)
        } else if self.state.is_ready() && !broker.is_connected() {
            Some(LinkLoss::Broker)
        } else {
            None
        };

        if let Some(loss) = loss {
            log_warn!("link lost: {:?}", loss);
            write_status(
                status,
                match loss {
                    LinkLoss::Wifi => "wifi lost",
                    LinkLoss::Broker => "broker lost",
                },
            );
            self.advance(LinkEvent::LinkLost(loss), status);
        }
    }

    /// Connect and subscribe to every control topic
    async fn open_session<B: BrokerSession + ?Sized>(&mut self, broker: &mut B) -> bool {
        if broker.connect().await.is_err() {
            return false;
        }

        for kind in TopicKind::ALL {
            let topic = self.topics.topic(kind);
            if broker.subscribe(&topic).await.is_err() {
                log_warn!("subscribe to {} failed", topic.as_str());
                return false;
            }
            log_debug!("subscribed to {}", topic.as_str());
        }
        true
    }

    fn advance<U: UartTx + ?Sized>(&mut self, event: LinkEvent, status: &mut U) {
        let next = self.state.transition(event);
        if next != self.state {
            log_info!("link {} -> {}", self.state.as_str(), next.as_str());
            write_status(status, next.as_str());
            self.state = next;
        }
    }
}
