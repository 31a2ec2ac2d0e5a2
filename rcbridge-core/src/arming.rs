//! ESC arming sequence
//!
//! Runs once at boot before any command is accepted:
//!
//! 1. Throttle line held physically LOW for the guard interval, so boot
//!    noise on the pin cannot look like a pulse.
//! 2. Neutral output held for the full neutral window, which ESCs need to
//!    see before they arm.
//!
//! Steering is centered during the neutral window as well.

use embedded_hal_async::delay::DelayNs;

use crate::actuator::{ActuatorMapper, ThrottleSignal};
use crate::config::ArmingConfig;
use crate::traits::{SteeringActuator, ThrottleActuator};

/// One-shot arming guard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ArmingSequence {
    config: ArmingConfig,
    armed: bool,
}

impl ArmingSequence {
    pub fn new(config: ArmingConfig) -> Self {
        Self {
            config,
            armed: false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Run the sequence; later calls return immediately
    ///
    /// Returns `true` if this call performed the sequence.
    pub async fn run<S, T, D>(
        &mut self,
        mapper: &ActuatorMapper,
        trim_us: i16,
        steering: &mut S,
        throttle: &mut T,
        delay: &mut D,
    ) -> bool
    where
        S: SteeringActuator + ?Sized,
        T: ThrottleActuator + ?Sized,
        D: DelayNs + ?Sized,
    {
        if self.armed {
            return false;
        }

        log_info!("arming: guard low {} ms", self.config.guard_low_ms);
        throttle.hold_low();
        delay.delay_ms(self.config.guard_low_ms).await;

        log_info!("arming: neutral hold {} ms", self.config.neutral_hold_ms);
        throttle.apply(ThrottleSignal::neutral(&mapper.profile().throttle));
        steering.set_pulse_us(mapper.steering_center(trim_us));
        delay.delay_ms(self.config.neutral_hold_ms).await;

        self.armed = true;
        log_info!("arming complete");
        true
    }
}
