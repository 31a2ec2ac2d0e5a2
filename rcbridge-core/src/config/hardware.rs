//! Hardware profile
//!
//! One profile describes a vehicle's wiring: servo range, which kind of
//! throttle driver is fitted, and which GPIOs carry which role. The
//! actuator mapper is parameterized by it, so ESC and H-bridge builds share
//! one code path.

/// Steering servo pulse range in microseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SteeringRange {
    /// Pulse at full left
    pub min_us: u16,
    /// Pulse at straight ahead, before trim
    pub center_us: u16,
    /// Pulse at full right
    pub max_us: u16,
}

impl Default for SteeringRange {
    fn default() -> Self {
        Self {
            min_us: 1000,
            center_us: 1500,
            max_us: 2000,
        }
    }
}

impl SteeringRange {
    /// Check that min < center < max
    pub fn is_valid(&self) -> bool {
        self.min_us < self.center_us && self.center_us < self.max_us
    }
}

/// Throttle driver fitted to the vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ThrottleDriver {
    /// Servo-style ESC: neutral pulse is stopped, `max_us` is full forward
    ServoEsc { neutral_us: u16, max_us: u16 },
    /// H-bridge motor driver with a PWM enable and two direction inputs
    HBridge { max_duty: u8 },
}

pub const DEFAULT_ESC_NEUTRAL_US: u16 = 1500;
pub const DEFAULT_ESC_MAX_US: u16 = 2000;

impl Default for ThrottleDriver {
    fn default() -> Self {
        ThrottleDriver::ServoEsc {
            neutral_us: DEFAULT_ESC_NEUTRAL_US,
            max_us: DEFAULT_ESC_MAX_US,
        }
    }
}

impl ThrottleDriver {
    /// Short name used in config files and reports
    pub fn name(&self) -> &'static str {
        match self {
            ThrottleDriver::ServoEsc { .. } => "esc",
            ThrottleDriver::HBridge { .. } => "hbridge",
        }
    }

    /// Output level that means "stopped"
    pub fn neutral(&self) -> u16 {
        match *self {
            ThrottleDriver::ServoEsc { neutral_us, .. } => neutral_us,
            ThrottleDriver::HBridge { .. } => 0,
        }
    }
}

/// Default throttle below which the active brake engages
pub const DEFAULT_BRAKE_EPSILON: f32 = 0.01;

/// Everything the actuator mapper needs to know about the vehicle
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HardwareProfile {
    pub steering: SteeringRange,
    pub throttle: ThrottleDriver,
    /// Throttle (and brake) threshold for the active brake
    pub brake_epsilon: f32,
}

impl Default for HardwareProfile {
    fn default() -> Self {
        Self {
            steering: SteeringRange::default(),
            throttle: ThrottleDriver::default(),
            brake_epsilon: DEFAULT_BRAKE_EPSILON,
        }
    }
}

/// GPIO roles on the board
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PinMap {
    /// Steering servo signal
    pub steering_pwm: u8,
    /// ESC signal, or H-bridge enable
    pub throttle_pwm: u8,
    /// H-bridge direction input 1
    pub motor_in1: u8,
    /// H-bridge direction input 2
    pub motor_in2: u8,
    /// Battery divider on an ADC-capable pin
    pub battery_adc: u8,
}

impl Default for PinMap {
    /// Pico W wiring
    fn default() -> Self {
        Self {
            steering_pwm: 16,
            throttle_pwm: 17,
            motor_in1: 18,
            motor_in2: 19,
            battery_adc: 26,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profile() {
        let profile = HardwareProfile::default();
        assert!(profile.steering.is_valid());
        assert_eq!(profile.throttle.name(), "esc");
        assert_eq!(profile.throttle.neutral(), 1500);
    }

    #[test]
    fn test_hbridge_neutral_is_zero_duty() {
        let driver = ThrottleDriver::HBridge { max_duty: 200 };
        assert_eq!(driver.neutral(), 0);
        assert_eq!(driver.name(), "hbridge");
    }

    #[test]
    fn test_invalid_range() {
        let range = SteeringRange {
            min_us: 1500,
            center_us: 1500,
            max_us: 2000,
        };
        assert!(!range.is_valid());
    }
}
