//! Pulse-width output abstractions
//!
//! Two flavours of PWM show up on RC hardware:
//! - Servo-style outputs (50 Hz frame, information carried in the pulse
//!   width in microseconds) for steering servos and ESCs
//! - Duty-cycle outputs (fast PWM, information carried in the duty ratio)
//!   for H-bridge enable pins

/// Servo-style pulse output
pub trait ServoPwm {
    /// Emit pulses with the given high time in microseconds
    fn set_pulse_us(&mut self, pulse_us: u16);

    /// Stop emitting pulses and hold the line at a physical LOW
    fn hold_low(&mut self);

    /// Current pulse width, or `None` while the line is held low
    fn pulse_us(&self) -> Option<u16>;
}

/// Duty-cycle output with 8-bit resolution
pub trait DutyPwm {
    /// Set the duty cycle (0 = always low, 255 = always high)
    fn set_duty(&mut self, duty: u8);

    /// Current duty cycle
    fn duty(&self) -> u8;
}
