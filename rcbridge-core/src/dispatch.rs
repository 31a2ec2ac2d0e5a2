//! Transport dispatcher
//!
//! One call to [`ControlLoop::tick`] is one iteration of the cooperative
//! control loop:
//!
//! 1. Check and repair the connection
//! 2. Take at most one broker message, then every buffered serial byte
//! 3. Decode, update [`ControlState`], map and write each command
//!    immediately, in arrival order
//!
//! Nothing is queued beyond the transports' own receive buffers. When a
//! broker message and a serial line touch the same channel in one tick the
//! serial line is applied last and wins.

use embedded_hal_async::delay::DelayNs;
use rcbridge_hal::{BrokerSession, UartRx, UartTx, WifiLink};
use rcbridge_protocol::{parse_line, Channel, Command, LineBuffer, LineError, TopicMap};

use crate::actuator::ActuatorMapper;
use crate::arming::ArmingSequence;
use crate::config::BridgeConfig;
use crate::connection::{ConnectionManager, ConnectionTiming};
use crate::state::{ConnectionState, ControlState};
use crate::traits::{SteeringActuator, ThrottleActuator};

/// Bytes pulled from the serial port per read
const SERIAL_CHUNK: usize = 32;

/// Prefix of the unknown-tag echo
pub const UNKNOWN_TAG_PREFIX: &str = "ERR:unknown:";

/// Everything the control loop touches
///
/// Owned by the caller and lent to each tick, so tests can inject fakes
/// and inspect them between ticks.
pub struct Peripherals<W, B, D, U, S, T> {
    pub wifi: W,
    pub broker: B,
    pub delay: D,
    pub serial: U,
    pub steering: S,
    pub throttle: T,
}

/// What one tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TickReport {
    /// Link state after servicing, `None` in serial-only mode
    pub connection: Option<ConnectionState>,
    /// Commands that reached the actuators
    pub applied: u8,
    /// Lines dropped as malformed
    pub rejected: u8,
}

/// Control loop state
#[derive(Debug, Clone)]
pub struct ControlLoop {
    mapper: ActuatorMapper,
    control: ControlState,
    lines: LineBuffer,
    topics: TopicMap,
    connection: Option<ConnectionManager>,
    arming: ArmingSequence,
}

impl ControlLoop {
    /// Build from configuration
    ///
    /// Without a WiFi SSID the loop runs serial-only and never touches the
    /// network.
    pub fn new(config: &BridgeConfig) -> Self {
        let topics = TopicMap::new(&config.broker.topic_prefix);
        let connection = config.wifi.is_configured().then(|| {
            ConnectionManager::new(
                topics.clone(),
                ConnectionTiming::from_config(&config.wifi, &config.broker),
            )
        });

        Self {
            mapper: ActuatorMapper::new(config.hardware),
            control: ControlState::new(config.boot_trim_us),
            lines: LineBuffer::new(),
            topics,
            connection,
            arming: ArmingSequence::new(config.arming),
        }
    }

    pub fn control(&self) -> &ControlState {
        &self.control
    }

    pub fn mapper(&self) -> &ActuatorMapper {
        &self.mapper
    }

    pub fn connection_state(&self) -> Option<ConnectionState> {
        self.connection.as_ref().map(ConnectionManager::state)
    }

    pub fn is_armed(&self) -> bool {
        self.arming.is_armed()
    }

    /// Run the arming sequence if it has not run yet
    pub async fn arm<W, B, D, U, S, T>(&mut self, io: &mut Peripherals<W, B, D, U, S, T>) -> bool
    where
        D: DelayNs,
        S: SteeringActuator,
        T: ThrottleActuator,
    {
        self.arming
            .run(
                &self.mapper,
                self.control.trim_us(),
                &mut io.steering,
                &mut io.throttle,
                &mut io.delay,
            )
            .await
    }

    /// Run one control-loop iteration
    ///
    /// Arms first if needed, so no command can reach the outputs before the
    /// neutral window has elapsed.
    pub async fn tick<W, B, D, U, S, T>(
        &mut self,
        io: &mut Peripherals<W, B, D, U, S, T>,
        now_ms: u64,
    ) -> TickReport
    where
        W: WifiLink,
        B: BrokerSession,
        D: DelayNs,
        U: UartRx + UartTx,
        S: SteeringActuator,
        T: ThrottleActuator,
    {
        self.arm(io).await;

        let mut report = TickReport::default();

        if let Some(connection) = self.connection.as_mut() {
            let state = connection
                .service(&mut io.wifi, &mut io.broker, &mut io.delay, &mut io.serial)
                .await;
            report.connection = Some(state);

            if state.is_ready() {
                match io.broker.poll(now_ms).await {
                    Ok(Some(message)) => {
                        let command = self.topics.decode(&message.topic, &message.payload);
                        report.applied += self.apply(core::slice::from_ref(&command), io);
                    }
                    Ok(None) => {}
                    // Picked up as link loss on the next tick
                    Err(_) => log_warn!("broker poll failed"),
                }
            }
        }

        self.drain_serial(io, &mut report);
        report
    }

    fn drain_serial<W, B, D, U, S, T>(
        &mut self,
        io: &mut Peripherals<W, B, D, U, S, T>,
        report: &mut TickReport,
    ) where
        U: UartRx + UartTx,
        S: SteeringActuator,
        T: ThrottleActuator,
    {
        let mut chunk = [0u8; SERIAL_CHUNK];
        loop {
            let n = match io.serial.read_available(&mut chunk) {
                Ok(0) => break,
                Ok(n) => n,
                Err(_) => {
                    log_warn!("serial read failed");
                    break;
                }
            };

            for &byte in &chunk[..n] {
                let Some(line) = self.lines.feed(byte) else {
                    continue;
                };

                match line.and_then(|l| parse_line(&l)) {
                    Ok(commands) => {
                        let applied = self.apply(&commands, io);
                        report.applied = report.applied.saturating_add(applied);
                    }
                    Err(LineError::UnknownTag(tag)) => {
                        log_debug!("unknown tag {}", tag.as_str());
                        let _ = io.serial.write_blocking(UNKNOWN_TAG_PREFIX.as_bytes());
                        let _ = io.serial.write_line(&tag);
                        report.rejected = report.rejected.saturating_add(1);
                    }
                    Err(e) => {
                        log_debug!("dropped line: {:?}", e);
                        report.rejected = report.rejected.saturating_add(1);
                    }
                }
            }
        }
    }

    /// Update state from a batch of commands, then write each affected output once
    ///
    /// Returns the number of commands that changed state.
    fn apply<W, B, D, U, S, T>(
        &mut self,
        commands: &[Command],
        io: &mut Peripherals<W, B, D, U, S, T>,
    ) -> u8
    where
        S: SteeringActuator,
        T: ThrottleActuator,
    {
        let mut applied = 0u8;
        let mut steering = false;
        let mut throttle = false;
        for command in commands {
            match self.control.apply(command) {
                Some(Channel::Steering) | Some(Channel::SteeringTrim) => steering = true,
                Some(Channel::Throttle) | Some(Channel::Brake) => throttle = true,
                None => {
                    log_debug!("ignoring command for unknown channel");
                    continue;
                }
            }
            applied = applied.saturating_add(1);
        }

        if steering {
            let pulse = self
                .mapper
                .map_steering(self.control.steer(), self.control.trim_us());
            io.steering.set_pulse_us(pulse);
        }
        if throttle {
            let signal = self
                .mapper
                .map_throttle_with_brake(self.control.throttle(), self.control.brake());
            io.throttle.apply(signal);
        }
        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::ThrottleSignal;
    use crate::testing::{FakeBroker, FakeDelay, FakeSerial, FakeSteering, FakeThrottle, FakeWifi};
    use embassy_futures::block_on;
    use heapless::String;

    type Io = Peripherals<FakeWifi, FakeBroker, FakeDelay, FakeSerial, FakeSteering, FakeThrottle>;

    fn io() -> Io {
        Peripherals {
            wifi: FakeWifi::joins_on_begin(),
            broker: FakeBroker::new(),
            delay: FakeDelay::default(),
            serial: FakeSerial::default(),
            steering: FakeSteering::default(),
            throttle: FakeThrottle::default(),
        }
    }

    fn networked() -> BridgeConfig {
        let mut config = BridgeConfig::new();
        config.wifi.ssid = String::try_from("paddock").unwrap();
        config
    }

    /// Loop that has already armed and connected
    fn ready_loop(io: &mut Io) -> ControlLoop {
        let mut cl = ControlLoop::new(&networked());
        block_on(cl.tick(io, 0));
        io.steering.pulses.clear();
        io.throttle.history.clear();
        io.serial.tx.clear();
        cl
    }

    #[test]
    fn test_first_tick_arms_before_anything() {
        let mut io = io();
        io.serial.send("T:1.0\n");
        let mut cl = ControlLoop::new(&BridgeConfig::new());

        block_on(cl.tick(&mut io, 0));

        assert!(cl.is_armed());
        assert_eq!(io.throttle.history[0], None);
        assert_eq!(
            io.throttle.history[1],
            Some(ThrottleSignal {
                level: 1500,
                brake_active: false
            })
        );
        assert_eq!(
            io.throttle.history[2],
            Some(ThrottleSignal {
                level: 2000,
                brake_active: false
            })
        );
    }

    #[test]
    fn test_serial_only_without_ssid() {
        let mut io = io();
        let mut cl = ControlLoop::new(&BridgeConfig::new());
        let report = block_on(cl.tick(&mut io, 0));
        assert_eq!(report.connection, None);
        assert_eq!(io.wifi.begins, 0);
    }

    #[test]
    fn test_serial_lines_applied_in_order() {
        let mut io = io();
        let mut cl = ready_loop(&mut io);

        io.serial.send("S:-1\nS:0.5\r\nT:0.5\n");
        let report = block_on(cl.tick(&mut io, 10));

        assert_eq!(report.applied, 3);
        assert_eq!(io.steering.pulses, [1000, 1750]);
        assert_eq!(io.throttle.signal().map(|s| s.level), Some(1750));
    }

    #[test]
    fn test_malformed_lines_leave_state_unchanged() {
        let mut io = io();
        let mut cl = ready_loop(&mut io);
        io.serial.send("S:0.25\n");
        block_on(cl.tick(&mut io, 0));
        let before = *cl.control();
        io.steering.pulses.clear();

        io.serial.send("S:\nS:abc\nRC:300,0,0\nRC:1,2\n");
        let report = block_on(cl.tick(&mut io, 0));

        assert_eq!(report.rejected, 4);
        assert_eq!(report.applied, 0);
        assert_eq!(*cl.control(), before);
        assert!(io.steering.pulses.is_empty());
    }

    #[test]
    fn test_unknown_tag_is_echoed() {
        let mut io = io();
        let mut cl = ready_loop(&mut io);

        io.serial.send("X:abc\n");
        block_on(cl.tick(&mut io, 0));

        assert_eq!(io.serial.tx_lines(), ["ERR:unknown:X"]);
        assert_eq!(*cl.control(), ControlState::new(0));
    }

    #[test]
    fn test_rc_line_sets_all_three_channels() {
        let mut io = io();
        let mut cl = ready_loop(&mut io);

        io.serial.send("RC:255,255,255\n");
        block_on(cl.tick(&mut io, 0));

        assert_eq!(cl.control().steer(), 1.0);
        assert_eq!(cl.control().throttle(), 1.0);
        assert_eq!(cl.control().brake(), 1.0);
        // Brake wins over full throttle
        assert!(io.throttle.signal().unwrap().brake_active);
    }

    #[test]
    fn test_rc_line_writes_each_output_once() {
        let mut io = io();
        let mut cl = ready_loop(&mut io);

        io.serial.send("RC:128,255,255\n");
        let report = block_on(cl.tick(&mut io, 0));

        assert_eq!(report.applied, 3);
        assert_eq!(io.steering.pulses.len(), 1);
        // No drive pulse ahead of the brake from the same line
        assert_eq!(io.throttle.history.len(), 1);
        let signal = io.throttle.signal().unwrap();
        assert!(signal.brake_active);
        assert_eq!(signal, cl.mapper().map_throttle_with_brake(1.0, 1.0));
    }

    #[test]
    fn test_same_line_twice_same_outputs() {
        let mut io = io();
        let mut cl = ready_loop(&mut io);

        io.serial.send("RC:40,200,0\n");
        block_on(cl.tick(&mut io, 0));
        let first = *cl.control();
        io.serial.send("RC:40,200,0\n");
        block_on(cl.tick(&mut io, 0));

        assert_eq!(*cl.control(), first);
        assert_eq!(io.throttle.history[0], io.throttle.history[1]);
        assert_eq!(io.steering.pulses[0], io.steering.pulses[1]);
    }

    #[test]
    fn test_partial_line_completes_next_tick() {
        let mut io = io();
        let mut cl = ready_loop(&mut io);

        io.serial.send("S:1");
        assert_eq!(block_on(cl.tick(&mut io, 0)).applied, 0);
        io.serial.send(".0\n");
        assert_eq!(block_on(cl.tick(&mut io, 0)).applied, 1);
        assert_eq!(io.steering.pulses, [2000]);
    }

    #[test]
    fn test_one_broker_message_per_tick() {
        let mut io = io();
        let mut cl = ready_loop(&mut io);

        io.broker.publish("f1/steering", "1.0");
        io.broker.publish("f1/throttle", "0.5");

        let report = block_on(cl.tick(&mut io, 0));
        assert_eq!(report.applied, 1);
        assert_eq!(io.steering.pulses, [2000]);
        assert!(io.throttle.history.is_empty());

        block_on(cl.tick(&mut io, 0));
        assert_eq!(io.throttle.signal().map(|s| s.level), Some(1750));
    }

    #[test]
    fn test_trim_reapplies_steering() {
        let mut io = io();
        let mut cl = ready_loop(&mut io);

        io.broker.publish("f1/steering_trim", "-30");
        block_on(cl.tick(&mut io, 0));

        assert_eq!(cl.control().trim_us(), -30);
        assert_eq!(io.steering.pulses, [1470]);
    }

    #[test]
    fn test_garbage_payload_drives_zero() {
        let mut io = io();
        let mut cl = ready_loop(&mut io);
        io.serial.send("T:0.8\n");
        block_on(cl.tick(&mut io, 0));

        io.broker.publish("f1/throttle", "fast");
        block_on(cl.tick(&mut io, 0));

        assert_eq!(cl.control().throttle(), 0.0);
        assert!(io.throttle.signal().unwrap().brake_active);
    }

    #[test]
    fn test_unknown_topic_ignored() {
        let mut io = io();
        let mut cl = ready_loop(&mut io);

        io.broker.publish("f1/horn", "1");
        let report = block_on(cl.tick(&mut io, 0));

        assert_eq!(report.applied, 0);
        assert!(io.steering.pulses.is_empty());
    }

    #[test]
    fn test_serial_wins_over_broker_in_same_tick() {
        let mut io = io();
        let mut cl = ready_loop(&mut io);

        io.broker.publish("f1/steering", "-1");
        io.serial.send("S:1\n");
        block_on(cl.tick(&mut io, 0));

        assert_eq!(io.steering.pulses, [1000, 2000]);
        assert_eq!(cl.control().steer(), 1.0);
    }

    #[test]
    fn test_no_broker_commands_until_resubscribed() {
        let mut io = io();
        let mut cl = ready_loop(&mut io);

        io.broker.drop_session();
        io.broker.refuse_connects = 1;
        io.broker.publish("f1/steering", "1");
        let report = block_on(cl.tick(&mut io, 0));

        assert_eq!(report.connection, Some(ConnectionState::BrokerConnecting));
        assert_eq!(report.applied, 0);

        io.broker.subscriptions.clear();
        let report = block_on(cl.tick(&mut io, 0));
        assert_eq!(report.connection, Some(ConnectionState::Ready));
        assert_eq!(io.broker.subscriptions.len(), 3);
        assert_eq!(report.applied, 1);
    }

    #[test]
    fn test_serial_still_served_while_link_down() {
        let mut io = io();
        io.wifi = FakeWifi::never_joins();
        let mut cl = ControlLoop::new(&networked());

        io.serial.send("S:-1\n");
        let report = block_on(cl.tick(&mut io, 0));

        assert_eq!(report.connection, Some(ConnectionState::WifiConnecting));
        assert_eq!(report.applied, 1);
    }
}
