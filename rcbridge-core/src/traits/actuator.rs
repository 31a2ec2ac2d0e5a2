//! Actuator driver traits
//!
//! Drivers receive already-mapped output levels. All range and trim
//! handling happens in [`ActuatorMapper`](crate::actuator::ActuatorMapper)
//! before a value reaches these traits.

use crate::actuator::ThrottleSignal;

/// Steering servo
pub trait SteeringActuator {
    /// Output a pulse of `pulse_us` microseconds
    fn set_pulse_us(&mut self, pulse_us: u16);

    /// Last pulse written
    fn pulse_us(&self) -> u16;
}

/// Throttle output (ESC or H-bridge)
pub trait ThrottleActuator {
    /// Apply a mapped throttle signal
    ///
    /// `signal.level` is a pulse width for ESCs and a duty cycle for
    /// H-bridges. With `brake_active` set the driver must actively stop the
    /// motor rather than just remove drive.
    fn apply(&mut self, signal: ThrottleSignal);

    /// Drive every output line to a physical LOW, emitting no pulses
    fn hold_low(&mut self);

    /// Last signal applied, `None` while held low
    fn signal(&self) -> Option<ThrottleSignal>;
}

impl<T: SteeringActuator + ?Sized> SteeringActuator for &mut T {
    fn set_pulse_us(&mut self, pulse_us: u16) {
        T::set_pulse_us(self, pulse_us)
    }

    fn pulse_us(&self) -> u16 {
        T::pulse_us(self)
    }
}

impl<T: ThrottleActuator + ?Sized> ThrottleActuator for &mut T {
    fn apply(&mut self, signal: ThrottleSignal) {
        T::apply(self, signal)
    }

    fn hold_low(&mut self) {
        T::hold_low(self)
    }

    fn signal(&self) -> Option<ThrottleSignal> {
        T::signal(self)
    }
}
