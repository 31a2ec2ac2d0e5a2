//! Servo-style ESC driver
//!
//! The ESC reads a 50 Hz pulse. Neutral is both "stopped" and "brake";
//! whether the ESC actively brakes at neutral is an ESC setting.

use rcbridge_core::actuator::ThrottleSignal;
use rcbridge_core::traits::ThrottleActuator;
use rcbridge_hal::ServoPwm;

pub struct Esc<P> {
    pwm: P,
    signal: Option<ThrottleSignal>,
}

impl<P: ServoPwm> Esc<P> {
    /// Create an ESC driver with the signal line held low
    ///
    /// Holding low until arming keeps the ESC from seeing a pulse before
    /// it has been fed neutral.
    pub fn new(mut pwm: P) -> Self {
        pwm.hold_low();
        Self { pwm, signal: None }
    }

    pub fn pwm(&self) -> &P {
        &self.pwm
    }
}

impl<P: ServoPwm> ThrottleActuator for Esc<P> {
    fn apply(&mut self, signal: ThrottleSignal) {
        self.pwm.set_pulse_us(signal.level);
        self.signal = Some(signal);
    }

    fn hold_low(&mut self) {
        self.pwm.hold_low();
        self.signal = None;
    }

    fn signal(&self) -> Option<ThrottleSignal> {
        self.signal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::servo::fake::FakeServoPwm;
    use rcbridge_core::actuator::ActuatorMapper;
    use rcbridge_core::config::HardwareProfile;

    #[test]
    fn test_held_low_until_applied() {
        let esc = Esc::new(FakeServoPwm::default());
        assert_eq!(esc.pwm().pulse_us(), None);
        assert_eq!(esc.signal(), None);
    }

    #[test]
    fn test_brake_outputs_neutral_pulse() {
        let mapper = ActuatorMapper::new(HardwareProfile::default());
        let mut esc = Esc::new(FakeServoPwm::default());

        esc.apply(mapper.map_throttle(0.0));
        assert_eq!(esc.pwm().pulse_us(), Some(1500));
        assert!(esc.signal().unwrap().brake_active);

        esc.apply(mapper.map_throttle(1.0));
        assert_eq!(esc.pwm().pulse_us(), Some(2000));
    }

    #[test]
    fn test_hold_low_stops_pulses() {
        let mut esc = Esc::new(FakeServoPwm::default());
        esc.apply(ThrottleSignal {
            level: 1700,
            brake_active: false,
        });
        esc.hold_low();
        assert_eq!(esc.pwm().pulse_us(), None);
        assert_eq!(esc.signal(), None);
    }
}
