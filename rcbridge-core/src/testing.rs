//! Host fakes for the HAL and actuator traits

use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::string::String;
use std::vec::Vec;

use embedded_hal_async::delay::DelayNs;
use rcbridge_hal::adc::AdcError;
use rcbridge_hal::{
    AnalogInput, BrokerMessage, BrokerSession, InputPin, OutputPin, UartRx, UartTx, WifiLink,
};

use crate::actuator::ThrottleSignal;
use crate::traits::{SteeringActuator, ThrottleActuator};

/// Delay that only records how long it was asked to wait
#[derive(Debug, Default)]
pub struct FakeDelay {
    elapsed_ns: u64,
}

impl FakeDelay {
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ns / 1_000_000
    }
}

impl DelayNs for FakeDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.elapsed_ns += ns as u64;
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.elapsed_ns += ms as u64 * 1_000_000;
    }
}

#[derive(Debug, Default)]
pub struct FakeWifi {
    pub up: bool,
    pub join_on_begin: bool,
    pub begins: u32,
}

impl FakeWifi {
    pub fn joins_on_begin() -> Self {
        Self {
            join_on_begin: true,
            ..Self::default()
        }
    }

    pub fn never_joins() -> Self {
        Self::default()
    }
}

impl WifiLink for FakeWifi {
    fn begin(&mut self) {
        self.begins += 1;
        if self.join_on_begin {
            self.up = true;
        }
    }

    fn is_connected(&self) -> bool {
        self.up
    }
}

#[derive(Debug, Default)]
pub struct FakeBroker {
    pub connected: bool,
    pub connects: u32,
    pub refuse_connects: u32,
    pub refuse_subscribes: u32,
    pub subscriptions: Vec<String>,
    pub inbox: VecDeque<BrokerMessage>,
    pub polls: u32,
}

impl FakeBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drop_session(&mut self) {
        self.connected = false;
    }

    pub fn publish(&mut self, topic: &str, payload: &str) {
        self.inbox
            .push_back(BrokerMessage::new(topic, payload.as_bytes()));
    }
}

impl BrokerSession for FakeBroker {
    type Error = ();

    async fn connect(&mut self) -> Result<(), ()> {
        if self.refuse_connects > 0 {
            self.refuse_connects -= 1;
            return Err(());
        }
        self.connects += 1;
        self.connected = true;
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), ()> {
        if !self.connected {
            return Err(());
        }
        if self.refuse_subscribes > 0 {
            self.refuse_subscribes -= 1;
            return Err(());
        }
        self.subscriptions.push(topic.into());
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn poll(&mut self, _now_ms: u64) -> Result<Option<BrokerMessage>, ()> {
        self.polls += 1;
        if !self.connected {
            return Err(());
        }
        Ok(self.inbox.pop_front())
    }
}

/// Serial port with a scripted receive side and a recorded transmit side
#[derive(Debug, Default)]
pub struct FakeSerial {
    pub rx: VecDeque<u8>,
    pub tx: Vec<u8>,
}

impl FakeSerial {
    pub fn send(&mut self, text: &str) {
        self.rx.extend(text.bytes());
    }

    pub fn tx_lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.tx)
            .lines()
            .map(String::from)
            .collect()
    }
}

impl UartTx for FakeSerial {
    type Error = ();

    fn write_blocking(&mut self, data: &[u8]) -> Result<(), ()> {
        self.tx.extend_from_slice(data);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), ()> {
        Ok(())
    }
}

impl UartRx for FakeSerial {
    type Error = ();

    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, ()> {
        let mut n = 0;
        while n < buf.len() {
            match self.rx.pop_front() {
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

#[derive(Debug, Default)]
pub struct FakeSteering {
    pub pulses: Vec<u16>,
}

impl SteeringActuator for FakeSteering {
    fn set_pulse_us(&mut self, pulse_us: u16) {
        self.pulses.push(pulse_us);
    }

    fn pulse_us(&self) -> u16 {
        self.pulses.last().copied().unwrap_or(0)
    }
}

/// `None` entries record `hold_low`
#[derive(Debug, Default)]
pub struct FakeThrottle {
    pub history: Vec<Option<ThrottleSignal>>,
}

impl ThrottleActuator for FakeThrottle {
    fn apply(&mut self, signal: ThrottleSignal) {
        self.history.push(Some(signal));
    }

    fn hold_low(&mut self) {
        self.history.push(None);
    }

    fn signal(&self) -> Option<ThrottleSignal> {
        self.history.last().copied().flatten()
    }
}

/// A jumper between an output and an input, optionally shorted to a rail
pub fn loopback(stuck: Option<bool>) -> (FakeOut, FakeIn) {
    let wire = Rc::new(Cell::new(false));
    (
        FakeOut { wire: wire.clone() },
        FakeIn { wire, stuck },
    )
}

pub struct FakeOut {
    wire: Rc<Cell<bool>>,
}

impl OutputPin for FakeOut {
    fn set_high(&mut self) {
        self.wire.set(true);
    }

    fn set_low(&mut self) {
        self.wire.set(false);
    }

    fn is_set_high(&self) -> bool {
        self.wire.get()
    }
}

pub struct FakeIn {
    wire: Rc<Cell<bool>>,
    stuck: Option<bool>,
}

impl InputPin for FakeIn {
    fn is_high(&self) -> bool {
        self.stuck.unwrap_or_else(|| self.wire.get())
    }
}

/// ADC that cycles through a fixed list of raw readings
pub struct FakeAdc {
    pub readings: Vec<u16>,
    pub next: usize,
    pub fail: bool,
}

impl FakeAdc {
    pub fn steady(raw: u16) -> Self {
        Self::cycling(&[raw])
    }

    pub fn cycling(readings: &[u16]) -> Self {
        Self {
            readings: readings.to_vec(),
            next: 0,
            fail: false,
        }
    }
}

impl AnalogInput for FakeAdc {
    fn read_raw(&mut self) -> Result<u16, AdcError> {
        if self.fail {
            return Err(AdcError::Conversion);
        }
        let raw = self.readings[self.next % self.readings.len()];
        self.next += 1;
        Ok(raw)
    }

    fn full_scale(&self) -> u16 {
        4095
    }
}
