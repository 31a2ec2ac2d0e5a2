//! Control state
//!
//! Owned by the control loop and changed only by decoded commands. Every
//! setter clamps, so the stored values are always within range.

use rcbridge_protocol::{Channel, Command};

use crate::actuator::mapper::{clamp_signed, clamp_unit};

/// Largest steering trim in either direction
pub const MAX_TRIM_US: i16 = 500;

/// Last commanded control values
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControlState {
    /// -1.0 (left) .. 1.0 (right)
    steer: f32,
    /// 0.0 .. 1.0
    throttle: f32,
    /// 0.0 .. 1.0
    brake: f32,
    trim_us: i16,
}

impl Default for ControlState {
    fn default() -> Self {
        Self::new(0)
    }
}

impl ControlState {
    /// Centered, stopped, with the given boot trim
    pub fn new(trim_us: i16) -> Self {
        Self {
            steer: 0.0,
            throttle: 0.0,
            brake: 0.0,
            trim_us: clamp_trim(trim_us),
        }
    }

    pub fn steer(&self) -> f32 {
        self.steer
    }

    pub fn throttle(&self) -> f32 {
        self.throttle
    }

    pub fn brake(&self) -> f32 {
        self.brake
    }

    pub fn trim_us(&self) -> i16 {
        self.trim_us
    }

    /// Apply a command, returning the channel it changed
    ///
    /// `Unknown` changes nothing.
    pub fn apply(&mut self, command: &Command) -> Option<Channel> {
        match *command {
            Command::Steer(v) => self.steer = clamp_signed(v),
            Command::Throttle(v) => self.throttle = clamp_unit(v),
            Command::Brake(v) => self.brake = clamp_unit(v),
            Command::TrimAdjust(t) => self.trim_us = clamp_trim(t),
            Command::Unknown(_) => return None,
        }
        command.channel()
    }
}

fn clamp_trim(trim_us: i16) -> i16 {
    trim_us.clamp(-MAX_TRIM_US, MAX_TRIM_US)
}
