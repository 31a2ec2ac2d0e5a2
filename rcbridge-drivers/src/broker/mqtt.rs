//! MQTT 3.1.1 session over a byte-stream transport
//!
//! Only what the bridge needs: clean-session CONNECT, QoS 0 subscriptions,
//! inbound PUBLISH (QoS 1 deliveries are acknowledged), and keep-alive.
//!
//! Keep-alive runs off the `now_ms` passed to [`BrokerSession::poll`]:
//! - a PINGREQ goes out once half the keep-alive interval passes without
//!   any outbound packet
//! - the session is declared lost after 1.5 keep-alive intervals with no
//!   inbound packet

use embedded_io_async::{Read, Write};
use heapless::{Deque, String, Vec};
use rcbridge_core::config::{BrokerConfig, MAX_CLIENT_ID_LEN};
use rcbridge_hal::{BrokerMessage, BrokerSession, Transport};
use rcbridge_protocol::mqtt::{self, MqttError, Packet, SUBACK_FAILURE};

/// Receive buffer; large enough for any topic plus payload the bridge accepts
const RX_BUF: usize = 256;
const TX_BUF: usize = 128;
const READ_CHUNK: usize = 64;
/// Messages that arrived while waiting for an acknowledgement
const PENDING: usize = 4;

/// Session parameters
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MqttSettings {
    pub client_id: String<MAX_CLIENT_ID_LEN>,
    pub keepalive_s: u16,
}

impl MqttSettings {
    pub fn from_config(config: &BrokerConfig) -> Self {
        Self {
            client_id: config.client_id.clone(),
            keepalive_s: config.keepalive_s,
        }
    }

    fn keepalive_ms(&self) -> u64 {
        self.keepalive_s as u64 * 1000
    }
}

/// Why a session operation failed
///
/// Every error except [`SessionError::SubscribeRejected`] also drops the
/// session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionError {
    /// Open, read or write failed on the transport
    Transport,
    /// Peer closed the stream
    Closed,
    /// Operation needs a session and there is none
    NotConnected,
    /// CONNACK carried a non-zero return code
    Refused(u8),
    /// Broker rejected a subscription
    SubscribeRejected,
    /// Unexpected or undecodable packet
    Protocol(MqttError),
    /// Inbound packet larger than the receive buffer
    Overflow,
    /// Broker went quiet for longer than the keep-alive allows
    KeepAliveTimeout,
}

impl From<MqttError> for SessionError {
    fn from(e: MqttError) -> Self {
        SessionError::Protocol(e)
    }
}

/// Decoded packet detached from the receive buffer
enum Inbound {
    ConnAck(u8),
    Publish(BrokerMessage, Option<u16>),
    SubAck { packet_id: u16, return_code: u8 },
    Other,
}

/// MQTT session bound to one transport
pub struct MqttBroker<T> {
    transport: T,
    settings: MqttSettings,
    connected: bool,
    rx: Vec<u8, RX_BUF>,
    pending: Deque<BrokerMessage, PENDING>,
    next_packet_id: u16,
    /// Set on the first poll after connecting
    last_rx_ms: Option<u64>,
    last_tx_ms: Option<u64>,
}

impl<T: Transport> MqttBroker<T> {
    pub fn new(transport: T, settings: MqttSettings) -> Self {
        Self {
            transport,
            settings,
            connected: false,
            rx: Vec::new(),
            pending: Deque::new(),
            next_packet_id: 1,
            last_rx_ms: None,
            last_tx_ms: None,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Send DISCONNECT (best effort) and close the transport
    pub async fn disconnect(&mut self) {
        if self.connected {
            let mut buf = [0u8; 2];
            if let Ok(n) = mqtt::encode_disconnect(&mut buf) {
                let _ = self.transport.write_all(&buf[..n]).await;
            }
        }
        self.drop_session();
    }

    fn drop_session(&mut self) {
        self.connected = false;
        self.transport.close();
        self.rx.clear();
        self.pending.clear();
        self.last_rx_ms = None;
        self.last_tx_ms = None;
    }

    /// Drop the session and hand back `err`
    fn fail(&mut self, err: SessionError) -> SessionError {
        if self.connected {
            log_warn!("mqtt session lost: {:?}", err);
        }
        self.drop_session();
        err
    }

    fn packet_id(&mut self) -> u16 {
        let id = self.next_packet_id;
        self.next_packet_id = self.next_packet_id.wrapping_add(1).max(1);
        id
    }

    async fn send(&mut self, packet: &[u8]) -> Result<(), SessionError> {
        if self.transport.write_all(packet).await.is_err() || self.transport.flush().await.is_err() {
            return Err(self.fail(SessionError::Transport));
        }
        Ok(())
    }

    /// Decode the next buffered packet, if a whole one is present
    fn take_buffered(&mut self) -> Result<Option<Inbound>, SessionError> {
        let decoded = match mqtt::decode_packet(&self.rx) {
            Ok(Some((packet, used))) => Ok(Some((detach(packet), used))),
            Ok(None) => Ok(None),
            Err(e) => Err(e),
        };
        let (inbound, used) = match decoded {
            Ok(Some(decoded)) => decoded,
            Ok(None) if self.rx.is_full() => return Err(self.fail(SessionError::Overflow)),
            Ok(None) => return Ok(None),
            Err(e) => return Err(self.fail(e.into())),
        };
        let len = self.rx.len();
        self.rx.copy_within(used.., 0);
        self.rx.truncate(len - used);
        Ok(Some(inbound))
    }

    /// Read one chunk from the transport into the receive buffer
    async fn fill(&mut self) -> Result<(), SessionError> {
        let room = RX_BUF - self.rx.len();
        let mut chunk = [0u8; READ_CHUNK];
        let want = room.min(READ_CHUNK);
        match self.transport.read(&mut chunk[..want]).await {
            Ok(0) => Err(self.fail(SessionError::Closed)),
            Ok(n) => {
                // n <= room
                let _ = self.rx.extend_from_slice(&chunk[..n]);
                Ok(())
            }
            Err(_) => Err(self.fail(SessionError::Transport)),
        }
    }

    /// Wait for the next packet, relying on transport timeouts to bound it
    async fn next_packet(&mut self) -> Result<Inbound, SessionError> {
        loop {
            if let Some(inbound) = self.take_buffered()? {
                return Ok(inbound);
            }
            self.fill().await?;
        }
    }

    /// Handle a PUBLISH: acknowledge QoS 1 and hand back the message
    async fn accept(
        &mut self,
        message: BrokerMessage,
        packet_id: Option<u16>,
    ) -> Result<BrokerMessage, SessionError> {
        if let Some(id) = packet_id {
            let mut buf = [0u8; 4];
            let n = mqtt::encode_puback(&mut buf, id)?;
            self.send(&buf[..n]).await?;
        }
        Ok(message)
    }
}

fn detach(packet: Packet<'_>) -> Inbound {
    match packet {
        Packet::ConnAck { return_code, .. } => Inbound::ConnAck(return_code),
        Packet::Publish {
            topic,
            payload,
            packet_id,
        } => Inbound::Publish(BrokerMessage::new(topic, payload), packet_id),
        Packet::SubAck {
            packet_id,
            return_code,
        } => Inbound::SubAck {
            packet_id,
            return_code,
        },
        Packet::PingResp | Packet::Other { .. } => Inbound::Other,
    }
}

impl<T: Transport> BrokerSession for MqttBroker<T> {
    type Error = SessionError;

    async fn connect(&mut self) -> Result<(), SessionError> {
        self.drop_session();

        if self.transport.open().await.is_err() {
            return Err(self.fail(SessionError::Transport));
        }

        let mut buf = [0u8; TX_BUF];
        let n = match mqtt::encode_connect(&mut buf, &self.settings.client_id, self.settings.keepalive_s) {
            Ok(n) => n,
            Err(e) => return Err(self.fail(e.into())),
        };
        self.send(&buf[..n]).await?;

        match self.next_packet().await? {
            Inbound::ConnAck(0) => {
                self.connected = true;
                log_info!("mqtt session up as {}", self.settings.client_id.as_str());
                Ok(())
            }
            Inbound::ConnAck(code) => Err(self.fail(SessionError::Refused(code))),
            _ => Err(self.fail(SessionError::Protocol(MqttError::Malformed))),
        }
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), SessionError> {
        if !self.connected {
            return Err(SessionError::NotConnected);
        }

        let id = self.packet_id();
        let mut buf = [0u8; TX_BUF];
        let n = mqtt::encode_subscribe(&mut buf, id, topic)?;
        self.send(&buf[..n]).await?;

        loop {
            match self.next_packet().await? {
                Inbound::SubAck {
                    packet_id,
                    return_code,
                } if packet_id == id => {
                    if return_code == SUBACK_FAILURE {
                        log_warn!("subscription to {} rejected", topic);
                        return Err(SessionError::SubscribeRejected);
                    }
                    log_debug!("subscribed to {}", topic);
                    return Ok(());
                }
                Inbound::Publish(message, packet_id) => {
                    let message = self.accept(message, packet_id).await?;
                    if self.pending.push_back(message).is_err() {
                        log_warn!("dropping early message");
                    }
                }
                _ => {}
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected && self.transport.is_open()
    }

    async fn poll(&mut self, now_ms: u64) -> Result<Option<BrokerMessage>, SessionError> {
        if !self.connected {
            return Err(SessionError::NotConnected);
        }
        let keepalive_ms = self.settings.keepalive_ms();
        let last_rx = *self.last_rx_ms.get_or_insert(now_ms);
        let last_tx = *self.last_tx_ms.get_or_insert(now_ms);

        if keepalive_ms > 0 {
            if now_ms.saturating_sub(last_rx) > keepalive_ms * 3 / 2 {
                return Err(self.fail(SessionError::KeepAliveTimeout));
            }
            if now_ms.saturating_sub(last_tx) >= keepalive_ms / 2 {
                let mut buf = [0u8; 2];
                let n = mqtt::encode_pingreq(&mut buf)?;
                self.send(&buf[..n]).await?;
                self.last_tx_ms = Some(now_ms);
            }
        }

        if let Some(message) = self.pending.pop_front() {
            return Ok(Some(message));
        }

        loop {
            while let Some(inbound) = self.take_buffered()? {
                self.last_rx_ms = Some(now_ms);
                if let Inbound::Publish(message, packet_id) = inbound {
                    return self.accept(message, packet_id).await.map(Some);
                }
            }
            if !self.transport.read_ready() {
                return Ok(None);
            }
            self.fill().await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;
    use embedded_io_async::{ErrorKind, ErrorType};
    use std::collections::VecDeque;
    use std::vec::Vec as StdVec;

    /// Scripted byte stream; reading an empty script times out
    #[derive(Default)]
    struct FakeTransport {
        open: bool,
        opens: u32,
        refuse_open: bool,
        inbound: VecDeque<u8>,
        sent: StdVec<u8>,
    }

    impl FakeTransport {
        fn queue(&mut self, bytes: &[u8]) {
            self.inbound.extend(bytes.iter().copied());
        }

        /// First byte of every packet written, in order
        fn sent_types(&self) -> StdVec<u8> {
            let mut types = StdVec::new();
            let mut rest = &self.sent[..];
            while let Ok(Some((_, used))) = mqtt::decode_packet(rest) {
                types.push(rest[0] >> 4);
                rest = &rest[used..];
            }
            types
        }
    }

    impl ErrorType for FakeTransport {
        type Error = ErrorKind;
    }

    impl Read for FakeTransport {
        async fn read(&mut self, buf: &mut [u8]) -> Result<usize, ErrorKind> {
            if self.inbound.is_empty() {
                return Err(ErrorKind::TimedOut);
            }
            let mut n = 0;
            while n < buf.len() {
                match self.inbound.pop_front() {
                    Some(b) => {
                        buf[n] = b;
                        n += 1;
                    }
                    None => break,
                }
            }
            Ok(n)
        }
    }

    impl Write for FakeTransport {
        async fn write(&mut self, buf: &[u8]) -> Result<usize, ErrorKind> {
            if !self.open {
                return Err(ErrorKind::NotConnected);
            }
            self.sent.extend_from_slice(buf);
            Ok(buf.len())
        }
    }

    impl Transport for FakeTransport {
        async fn open(&mut self) -> Result<(), ErrorKind> {
            if self.refuse_open {
                return Err(ErrorKind::ConnectionRefused);
            }
            self.opens += 1;
            self.open = true;
            Ok(())
        }

        fn close(&mut self) {
            self.open = false;
        }

        fn is_open(&self) -> bool {
            self.open
        }

        fn read_ready(&mut self) -> bool {
            !self.inbound.is_empty()
        }
    }

    const CONNACK_OK: [u8; 4] = [0x20, 0x02, 0x00, 0x00];
    const PINGRESP: [u8; 2] = [0xD0, 0x00];

    fn suback(id: u16, code: u8) -> [u8; 5] {
        let id = id.to_be_bytes();
        [0x90, 0x03, id[0], id[1], code]
    }

    fn publish(topic: &str, payload: &str, packet_id: Option<u16>) -> StdVec<u8> {
        let mut body = StdVec::new();
        body.extend_from_slice(&(topic.len() as u16).to_be_bytes());
        body.extend_from_slice(topic.as_bytes());
        if let Some(id) = packet_id {
            body.extend_from_slice(&id.to_be_bytes());
        }
        body.extend_from_slice(payload.as_bytes());
        let first = if packet_id.is_some() { 0x32 } else { 0x30 };
        let mut packet = std::vec![first, body.len() as u8];
        packet.extend(body);
        packet
    }

    fn settings() -> MqttSettings {
        MqttSettings {
            client_id: String::try_from("rcbridge").unwrap(),
            keepalive_s: 10,
        }
    }

    fn connected() -> MqttBroker<FakeTransport> {
        let mut transport = FakeTransport::default();
        transport.queue(&CONNACK_OK);
        let mut broker = MqttBroker::new(transport, settings());
        block_on(broker.connect()).unwrap();
        broker
    }

    #[test]
    fn test_connect_handshake() {
        let broker = connected();
        assert!(broker.is_connected());
        assert_eq!(broker.transport().sent_types(), [mqtt::CONNECT]);
    }

    #[test]
    fn test_connect_refused() {
        let mut transport = FakeTransport::default();
        transport.queue(&[0x20, 0x02, 0x00, 0x05]);
        let mut broker = MqttBroker::new(transport, settings());
        assert_eq!(block_on(broker.connect()), Err(SessionError::Refused(5)));
        assert!(!broker.is_connected());
        assert!(!broker.transport().is_open());
    }

    #[test]
    fn test_connect_without_answer_times_out() {
        let mut broker = MqttBroker::new(FakeTransport::default(), settings());
        assert_eq!(block_on(broker.connect()), Err(SessionError::Transport));
        assert!(!broker.is_connected());
    }

    #[test]
    fn test_open_failure() {
        let transport = FakeTransport {
            refuse_open: true,
            ..FakeTransport::default()
        };
        let mut broker = MqttBroker::new(transport, settings());
        assert_eq!(block_on(broker.connect()), Err(SessionError::Transport));
    }

    #[test]
    fn test_subscribe_waits_for_suback() {
        let mut broker = connected();
        broker.transport_mut().queue(&suback(1, 0));
        block_on(broker.subscribe("f1/steering")).unwrap();

        broker.transport_mut().queue(&suback(2, SUBACK_FAILURE));
        assert_eq!(
            block_on(broker.subscribe("f1/throttle")),
            Err(SessionError::SubscribeRejected)
        );
        // A rejected subscription keeps the session
        assert!(broker.is_connected());
    }

    #[test]
    fn test_subscribe_requires_session() {
        let mut broker = MqttBroker::new(FakeTransport::default(), settings());
        assert_eq!(
            block_on(broker.subscribe("f1/steering")),
            Err(SessionError::NotConnected)
        );
    }

    #[test]
    fn test_early_publish_is_kept() {
        let mut broker = connected();
        broker.transport_mut().queue(&publish("f1/steering", "0.5", None));
        broker.transport_mut().queue(&suback(1, 0));
        block_on(broker.subscribe("f1/steering")).unwrap();

        let msg = block_on(broker.poll(0)).unwrap().unwrap();
        assert_eq!(msg.topic.as_str(), "f1/steering");
        assert_eq!(&msg.payload[..], b"0.5");
    }

    #[test]
    fn test_poll_returns_one_message_at_a_time() {
        let mut broker = connected();
        broker.transport_mut().queue(&publish("f1/steering", "-1", None));
        broker.transport_mut().queue(&publish("f1/throttle", "0.25", None));

        let first = block_on(broker.poll(0)).unwrap().unwrap();
        assert_eq!(first.topic.as_str(), "f1/steering");
        let second = block_on(broker.poll(10)).unwrap().unwrap();
        assert_eq!(second.topic.as_str(), "f1/throttle");
        assert_eq!(block_on(broker.poll(20)), Ok(None));
    }

    #[test]
    fn test_qos1_publish_is_acknowledged() {
        let mut broker = connected();
        broker
            .transport_mut()
            .queue(&publish("f1/steering_trim", "-10", Some(7)));

        let msg = block_on(broker.poll(0)).unwrap().unwrap();
        assert_eq!(&msg.payload[..], b"-10");
        assert_eq!(
            broker.transport().sent_types(),
            [mqtt::CONNECT, mqtt::PUBACK]
        );
        assert_eq!(broker.transport().sent[broker.transport().sent.len() - 2..], [0, 7]);
    }

    #[test]
    fn test_keepalive_ping_and_timeout() {
        let mut broker = connected();
        assert_eq!(block_on(broker.poll(0)), Ok(None));

        // Half the keep-alive interval: ping goes out
        assert_eq!(block_on(broker.poll(5_000)), Ok(None));
        assert_eq!(
            broker.transport().sent_types(),
            [mqtt::CONNECT, mqtt::PINGREQ]
        );

        // Answer keeps the session alive past 1.5 intervals from connect
        broker.transport_mut().queue(&PINGRESP);
        assert_eq!(block_on(broker.poll(6_000)), Ok(None));
        assert_eq!(block_on(broker.poll(16_000)), Ok(None));
        assert!(broker.is_connected());

        // Silence for more than 15 s drops it
        assert_eq!(
            block_on(broker.poll(21_001)),
            Err(SessionError::KeepAliveTimeout)
        );
        assert!(!broker.is_connected());
        assert_eq!(block_on(broker.poll(21_002)), Err(SessionError::NotConnected));
    }

    #[test]
    fn test_peer_close_drops_session() {
        let mut broker = connected();
        broker.transport_mut().close();
        assert!(!broker.is_connected());
    }

    #[test]
    fn test_reconnect_after_drop() {
        let mut broker = connected();
        broker.transport_mut().close();
        broker.transport_mut().queue(&CONNACK_OK);
        block_on(broker.connect()).unwrap();
        assert!(broker.is_connected());
        assert_eq!(broker.transport().opens, 2);
    }

    #[test]
    fn test_oversize_payload_truncated() {
        let mut broker = connected();
        let long = "1".repeat(60);
        broker.transport_mut().queue(&publish("f1/throttle", &long, None));
        let msg = block_on(broker.poll(0)).unwrap().unwrap();
        assert_eq!(msg.payload.len(), rcbridge_hal::net::MAX_PAYLOAD_LEN);
    }
}
