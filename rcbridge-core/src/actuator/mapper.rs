//! Actuator mapper
//!
//! Pure functions from normalized values to output levels:
//!
//! ```text
//! steer  -1.0 ─── 0.0 ─── 1.0      throttle 0.0 ─ ε ──────── 1.0
//!         min   center    max                brake  neutral ─ max
//! ```
//!
//! Steering is clamped twice: once on the normalized input and once after
//! trim is added, since trim alone can push a valid input past the servo's
//! mechanical limits.

use crate::config::{HardwareProfile, ThrottleDriver};

/// Mapped throttle output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ThrottleSignal {
    /// Pulse width in microseconds (ESC) or duty cycle (H-bridge)
    pub level: u16,
    /// Motor terminals should be shorted to stop the motor
    pub brake_active: bool,
}

impl ThrottleSignal {
    /// Braking signal for `driver`: neutral pulse or zero duty
    pub fn brake(driver: &ThrottleDriver) -> Self {
        Self {
            level: driver.neutral(),
            brake_active: true,
        }
    }

    /// Stopped but not braking
    pub fn neutral(driver: &ThrottleDriver) -> Self {
        Self {
            level: driver.neutral(),
            brake_active: false,
        }
    }
}

/// Maps normalized control values using a hardware profile
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ActuatorMapper {
    profile: HardwareProfile,
}

impl ActuatorMapper {
    pub fn new(profile: HardwareProfile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> &HardwareProfile {
        &self.profile
    }

    /// Map steering in [-1, 1] plus trim to a servo pulse
    ///
    /// Zero maps to the configured center. Each side scales independently,
    /// so -1 and 1 always reach min and max even when center is offset.
    pub fn map_steering(&self, value: f32, trim_us: i16) -> u16 {
        let range = &self.profile.steering;
        let value = clamp_signed(value);
        let center = range.center_us as f32;

        let offset = if value >= 0.0 {
            value * (range.max_us as f32 - center)
        } else {
            value * (center - range.min_us as f32)
        };

        let pulse = round_to_i32(center + offset) + trim_us as i32;
        pulse.clamp(range.min_us as i32, range.max_us as i32) as u16
    }

    /// Map throttle in [0, 1] to an output signal
    ///
    /// Below the brake epsilon the active brake engages instead of
    /// outputting zero drive.
    pub fn map_throttle(&self, value: f32) -> ThrottleSignal {
        let driver = &self.profile.throttle;
        let value = clamp_unit(value);

        if value < self.profile.brake_epsilon {
            return ThrottleSignal::brake(driver);
        }

        let level = match *driver {
            ThrottleDriver::ServoEsc { neutral_us, max_us } => {
                let span = max_us as f32 - neutral_us as f32;
                round_to_i32(neutral_us as f32 + value * span) as u16
            }
            ThrottleDriver::HBridge { max_duty } => round_to_i32(value * max_duty as f32) as u16,
        };

        ThrottleSignal {
            level,
            brake_active: false,
        }
    }

    /// Map throttle with a separate brake input
    ///
    /// A brake above the epsilon wins over any throttle.
    pub fn map_throttle_with_brake(&self, throttle: f32, brake: f32) -> ThrottleSignal {
        if clamp_unit(brake) > self.profile.brake_epsilon {
            ThrottleSignal::brake(&self.profile.throttle)
        } else {
            self.map_throttle(throttle)
        }
    }

    /// Pulse for straight ahead with `trim_us` applied
    pub fn steering_center(&self, trim_us: i16) -> u16 {
        self.map_steering(0.0, trim_us)
    }
}

/// Clamp to [-1, 1]; NaN reads as 0
pub(crate) fn clamp_signed(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(-1.0, 1.0)
    }
}

/// Clamp to [0, 1]; NaN reads as 0
pub(crate) fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Round half away from zero (`f32::round` needs std)
fn round_to_i32(value: f32) -> i32 {
    if value >= 0.0 {
        (value + 0.5) as i32
    } else {
        (value - 0.5) as i32
    }
}
