//! Network configuration (WiFi and broker)

use heapless::String;

pub const MAX_SSID_LEN: usize = 32;
pub const MAX_PASSWORD_LEN: usize = 64;
pub const MAX_HOST_LEN: usize = 64;
/// MQTT 3.1.1 guarantees brokers accept ids up to 23 bytes
pub const MAX_CLIENT_ID_LEN: usize = 23;
pub const MAX_PREFIX_LEN: usize = 32;

/// WiFi association settings
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WifiConfig {
    pub ssid: String<MAX_SSID_LEN>,
    pub password: String<MAX_PASSWORD_LEN>,
    /// Delay between association status polls
    pub poll_interval_ms: u32,
    /// Restart association after this many unsuccessful polls
    pub rejoin_every: u16,
}

impl Default for WifiConfig {
    fn default() -> Self {
        Self {
            ssid: String::new(),
            password: String::new(),
            poll_interval_ms: 500,
            rejoin_every: 20,
        }
    }
}

impl WifiConfig {
    /// Returns false if SSID is empty (serial-only operation)
    pub fn is_configured(&self) -> bool {
        !self.ssid.is_empty()
    }
}

/// Broker endpoint and session settings
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BrokerConfig {
    /// Hostname or dotted IPv4 address
    pub host: String<MAX_HOST_LEN>,
    pub port: u16,
    pub client_id: String<MAX_CLIENT_ID_LEN>,
    /// Topic prefix, e.g. `f1` for `f1/steering`
    pub topic_prefix: String<MAX_PREFIX_LEN>,
    pub keepalive_s: u16,
    /// Delay after a failed connect attempt
    pub retry_ms: u32,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        let mut client_id = String::new();
        let _ = client_id.push_str("rcbridge");
        let mut topic_prefix = String::new();
        let _ = topic_prefix.push_str("f1");
        Self {
            host: String::new(),
            port: 1883,
            client_id,
            topic_prefix,
            keepalive_s: 15,
            retry_ms: 2000,
        }
    }
}

impl BrokerConfig {
    /// Parse `host` as a dotted IPv4 address
    pub fn ipv4(&self) -> Option<[u8; 4]> {
        parse_ipv4(&self.host)
    }
}

/// Parse `a.b.c.d` into octets
pub fn parse_ipv4(s: &str) -> Option<[u8; 4]> {
    let mut octets = [0u8; 4];
    let mut parts = s.split('.');
    for octet in octets.iter_mut() {
        let part = parts.next()?;
        if part.is_empty() || part.len() > 3 || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        *octet = part.parse().ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(octets)
}
