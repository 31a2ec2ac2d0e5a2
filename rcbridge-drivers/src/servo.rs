//! Steering servo driver

use rcbridge_core::traits::SteeringActuator;
use rcbridge_hal::ServoPwm;

/// Steering servo on a 50 Hz pulse output
///
/// Pulses arrive already mapped and clamped to the steering range.
pub struct SteeringServo<P> {
    pwm: P,
    pulse_us: u16,
}

impl<P: ServoPwm> SteeringServo<P> {
    /// Create a servo driver; the output stays low until the first pulse
    pub fn new(mut pwm: P) -> Self {
        pwm.hold_low();
        Self { pwm, pulse_us: 0 }
    }

    /// Access the underlying output
    pub fn pwm(&self) -> &P {
        &self.pwm
    }
}

impl<P: ServoPwm> SteeringActuator for SteeringServo<P> {
    fn set_pulse_us(&mut self, pulse_us: u16) {
        if pulse_us != self.pulse_us {
            log_trace!("steering pulse {}us", pulse_us);
        }
        self.pulse_us = pulse_us;
        self.pwm.set_pulse_us(pulse_us);
    }

    fn pulse_us(&self) -> u16 {
        self.pulse_us
    }
}


#[cfg(test)]
mod tests {
    use super::fake::FakeServoPwm;
    use super::*;

    #[test]
    fn test_starts_held_low() {
        let mut pwm = FakeServoPwm::default();
        pwm.pulse = Some(1500);
        let servo = SteeringServo::new(pwm);
        assert_eq!(servo.pwm().pulse_us(), None);
        assert_eq!(servo.pulse_us(), 0);
    }

    #[test]
    fn test_pulse_passes_through() {
        let mut servo = SteeringServo::new(FakeServoPwm::default());
        servo.set_pulse_us(1320);
        assert_eq!(servo.pwm().pulse_us(), Some(1320));
        assert_eq!(servo.pulse_us(), 1320);
    }
}
