//! Servo-rate PWM outputs
//!
//! Both outputs of a slice share its 50 Hz period. With the counter clocked
//! at 1 MHz one count is one microsecond, so a servo pulse width is written
//! straight into the compare register.

use embassy_rp::pwm::{Config, PwmOutput};
use embedded_hal::pwm::SetDutyCycle;
use fixed::traits::ToFixed;
use rcbridge_hal::{DutyPwm, ServoPwm};

/// 125 MHz system clock / 125 = 1 MHz counter
pub const SERVO_DIVIDER: u8 = 125;

/// 20 000 counts at 1 MHz = 20 ms frame
pub const SERVO_TOP: u16 = 19_999;

/// Slice configuration for 50 Hz servo frames with both outputs low
pub fn servo_config() -> Config {
    let mut config = Config::default();
    config.divider = SERVO_DIVIDER.to_fixed();
    config.top = SERVO_TOP;
    config.compare_a = 0;
    config.compare_b = 0;
    config
}

/// One slice output driving a servo or ESC signal line
pub struct ServoOutput {
    output: PwmOutput<'static>,
    pulse_us: Option<u16>,
}

impl ServoOutput {
    /// Wrap an output from a slice set up with [`servo_config`]
    pub fn new(output: PwmOutput<'static>) -> Self {
        let mut servo = Self {
            output,
            pulse_us: None,
        };
        servo.hold_low();
        servo
    }
}

impl ServoPwm for ServoOutput {
    fn set_pulse_us(&mut self, pulse_us: u16) {
        let _ = self.output.set_duty_cycle(pulse_us.min(SERVO_TOP));
        self.pulse_us = Some(pulse_us);
    }

    fn hold_low(&mut self) {
        let _ = self.output.set_duty_cycle_fully_off();
        self.pulse_us = None;
    }

    fn pulse_us(&self) -> Option<u16> {
        self.pulse_us
    }
}

/// One slice output used as an H-bridge enable
///
/// Runs at the slice's servo frame rate.
pub struct DutyOutput {
    output: PwmOutput<'static>,
    duty: u8,
}

impl DutyOutput {
    pub fn new(output: PwmOutput<'static>) -> Self {
        let mut out = Self { output, duty: 0 };
        out.set_duty(0);
        out
    }
}

impl DutyPwm for DutyOutput {
    fn set_duty(&mut self, duty: u8) {
        let _ = self.output.set_duty_cycle_fraction(duty as u16, u8::MAX as u16);
        self.duty = duty;
    }

    fn duty(&self) -> u8 {
        self.duty
    }
}
