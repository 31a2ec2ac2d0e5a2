//! Dual-input H-bridge driver (L298N, TB6612 and similar)
//!
//! | IN1  | IN2  | Enable | Motor          |
//! |------|------|--------|----------------|
//! | HIGH | LOW  | duty   | forward        |
//! | HIGH | HIGH | full   | brake (shorted)|
//! | LOW  | LOW  | 0      | off            |
//!
//! The bridge only drives forward. Reverse is never commanded.

use rcbridge_core::actuator::ThrottleSignal;
use rcbridge_core::traits::ThrottleActuator;
use rcbridge_hal::{DutyPwm, OutputPin};

/// Enable duty used while braking
const BRAKE_DUTY: u8 = u8::MAX;

pub struct HBridge<PWM, IN1, IN2> {
    enable: PWM,
    in1: IN1,
    in2: IN2,
    signal: Option<ThrottleSignal>,
}

impl<PWM, IN1, IN2> HBridge<PWM, IN1, IN2>
where
    PWM: DutyPwm,
    IN1: OutputPin,
    IN2: OutputPin,
{
    /// Create a driver with every line held low
    pub fn new(enable: PWM, in1: IN1, in2: IN2) -> Self {
        let mut bridge = Self {
            enable,
            in1,
            in2,
            signal: None,
        };
        bridge.hold_low();
        bridge
    }

    /// Line states as (IN1 high, IN2 high, enable duty)
    pub fn lines(&self) -> (bool, bool, u8) {
        (
            self.in1.is_set_high(),
            self.in2.is_set_high(),
            self.enable.duty(),
        )
    }
}

impl<PWM, IN1, IN2> ThrottleActuator for HBridge<PWM, IN1, IN2>
where
    PWM: DutyPwm,
    IN1: OutputPin,
    IN2: OutputPin,
{
    fn apply(&mut self, signal: ThrottleSignal) {
        if signal.brake_active {
            self.in1.set_high();
            self.in2.set_high();
            self.enable.set_duty(BRAKE_DUTY);
        } else {
            self.in1.set_high();
            self.in2.set_low();
            self.enable.set_duty(signal.level.min(u8::MAX as u16) as u8);
        }
        self.signal = Some(signal);
    }

    fn hold_low(&mut self) {
        self.enable.set_duty(0);
        self.in1.set_low();
        self.in2.set_low();
        self.signal = None;
    }

    fn signal(&self) -> Option<ThrottleSignal> {
        self.signal
    }
}
