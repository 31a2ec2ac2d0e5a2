//! Pico W board bring-up
//!
//! Fixed wiring:
//!
//! | Role | GPIO |
//! |---|---|
//! | UART0 TX / RX | 0 / 1 |
//! | Steering servo (PWM slice 0 A) | 16 |
//! | Throttle ESC or H-bridge enable (PWM slice 0 B) | 17 |
//! | H-bridge IN1 / IN2 | 18 / 19 |
//! | Battery sense (ADC0) | 26 |
//! | CYW43 radio | 23, 24, 25, 29 |
//!
//! Diagnostic loopback jumpers and analog probes are claimed by number
//! from whatever is left.

use defmt::*;
use embassy_rp::gpio::{Level, Output};
use embassy_rp::peripherals::{PWM_SLICE0, UART0};
use embassy_rp::pwm::Pwm;
use embassy_rp::uart::Uart;
use embassy_rp::Peri;
use rcbridge_core::actuator::ThrottleSignal;
use rcbridge_core::config::{BridgeConfig, PinMap, ThrottleDriver};
use rcbridge_core::traits::ThrottleActuator;
use rcbridge_drivers::{Esc, HBridge, SteeringServo};
use rcbridge_hal::uart::UartConfig;
use rcbridge_hal_rp2040::gpio::{AllocError, GpioAllocator, OutputLine};
use rcbridge_hal_rp2040::pins::GpioPeripherals;
use rcbridge_hal_rp2040::pwm::{servo_config, DutyOutput, ServoOutput};
use rcbridge_hal_rp2040::uart::{to_embassy_config, BufferedSerial};
use static_cell::StaticCell;

use crate::Irqs;

pub const UART_TX_PIN: u8 = 0;
pub const UART_RX_PIN: u8 = 1;
pub const MOTOR_IN1_PIN: u8 = 18;
pub const MOTOR_IN2_PIN: u8 = 19;

const SERIAL_BUF: usize = 256;

static TX_BUF: StaticCell<[u8; SERIAL_BUF]> = StaticCell::new();
static RX_BUF: StaticCell<[u8; SERIAL_BUF]> = StaticCell::new();

/// Board bring-up failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub enum SetupError {
    /// A fixed-function pin was already handed out
    PinTaken(u8),
    /// The PWM slice did not yield both outputs
    Pwm,
    Alloc(AllocError),
}

impl From<AllocError> for SetupError {
    fn from(e: AllocError) -> Self {
        SetupError::Alloc(e)
    }
}

pub type Steering = SteeringServo<ServoOutput>;

/// Throttle driver selected by the hardware profile
pub enum Throttle {
    Esc(Esc<ServoOutput>),
    HBridge(HBridge<DutyOutput, OutputLine, OutputLine>),
}

impl ThrottleActuator for Throttle {
    fn apply(&mut self, signal: ThrottleSignal) {
        match self {
            Throttle::Esc(esc) => esc.apply(signal),
            Throttle::HBridge(bridge) => bridge.apply(signal),
        }
    }

    fn hold_low(&mut self) {
        match self {
            Throttle::Esc(esc) => esc.hold_low(),
            Throttle::HBridge(bridge) => bridge.hold_low(),
        }
    }

    fn signal(&self) -> Option<ThrottleSignal> {
        match self {
            Throttle::Esc(esc) => esc.signal(),
            Throttle::HBridge(bridge) => bridge.signal(),
        }
    }
}

/// Fixed-function outputs, all held LOW until armed
pub struct Board {
    pub serial: BufferedSerial,
    pub steering: Steering,
    pub throttle: Throttle,
}

impl Board {
    /// Claim the fixed pins and build the serial port and actuators
    ///
    /// Marks every claimed pin in `allocator`.
    pub fn setup(
        pins: &mut GpioPeripherals,
        uart0: Peri<'static, UART0>,
        slice0: Peri<'static, PWM_SLICE0>,
        config: &BridgeConfig,
        allocator: &mut GpioAllocator,
    ) -> Result<Self, SetupError> {
        let defaults = PinMap::default();

        allocator.allocate_all(&[UART_TX_PIN, UART_RX_PIN])?;
        let tx = pins.pin0.take().ok_or(SetupError::PinTaken(UART_TX_PIN))?;
        let rx = pins.pin1.take().ok_or(SetupError::PinTaken(UART_RX_PIN))?;
        let uart = Uart::new_blocking(uart0, tx, rx, to_embassy_config(&UartConfig::default()))
            .into_buffered(
                Irqs,
                TX_BUF.init([0; SERIAL_BUF]),
                RX_BUF.init([0; SERIAL_BUF]),
            );
        let serial = BufferedSerial::new(uart);

        allocator.allocate_all(&[defaults.steering_pwm, defaults.throttle_pwm])?;
        let steering_pin = pins
            .pin16
            .take()
            .ok_or(SetupError::PinTaken(defaults.steering_pwm))?;
        let throttle_pin = pins
            .pin17
            .take()
            .ok_or(SetupError::PinTaken(defaults.throttle_pwm))?;
        let (a, b) =
            Pwm::new_output_ab(slice0, steering_pin, throttle_pin, servo_config()).split();
        let (Some(a), Some(b)) = (a, b) else {
            return Err(SetupError::Pwm);
        };

        let steering = SteeringServo::new(ServoOutput::new(a));
        let throttle = match config.hardware.throttle {
            ThrottleDriver::ServoEsc { .. } => Throttle::Esc(Esc::new(ServoOutput::new(b))),
            ThrottleDriver::HBridge { .. } => {
                allocator.allocate_all(&[MOTOR_IN1_PIN, MOTOR_IN2_PIN])?;
                let in1 = pins.pin18.take().ok_or(SetupError::PinTaken(MOTOR_IN1_PIN))?;
                let in2 = pins.pin19.take().ok_or(SetupError::PinTaken(MOTOR_IN2_PIN))?;
                Throttle::HBridge(HBridge::new(
                    DutyOutput::new(b),
                    OutputLine(Output::new(in1, Level::Low)),
                    OutputLine(Output::new(in2, Level::Low)),
                ))
            }
        };

        info!("board ready, throttle driver {}", config.hardware.throttle.name());
        Ok(Self {
            serial,
            steering,
            throttle,
        })
    }
}

/// Warn about `[pins]` entries that differ from the fixed wiring
pub fn check_wiring(pins: &PinMap) {
    let fixed = PinMap::default();
    let roles = [
        ("steering_pwm", pins.steering_pwm, fixed.steering_pwm),
        ("throttle_pwm", pins.throttle_pwm, fixed.throttle_pwm),
        ("motor_in1", pins.motor_in1, fixed.motor_in1),
        ("motor_in2", pins.motor_in2, fixed.motor_in2),
        ("battery_adc", pins.battery_adc, fixed.battery_adc),
    ];
    for (role, configured, wired) in roles {
        if configured != wired {
            warn!(
                "[pins] {} = gpio{} ignored, board wires gpio{}",
                role, configured, wired
            );
        }
    }
}
