//! Top-level configuration types

use heapless::{String, Vec};

use super::hardware::{HardwareProfile, PinMap};
use super::network::{BrokerConfig, WifiConfig};

/// Maximum label length
pub const MAX_LABEL_LEN: usize = 16;

/// Maximum loopback pin pairs checked by diagnostics
pub const MAX_LOOPBACK_PAIRS: usize = 4;

/// Maximum analog probes checked by diagnostics
pub const MAX_ANALOG_PROBES: usize = 4;

/// What the firmware does after boot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BootMode {
    /// Arm outputs, then run the control loop forever
    #[default]
    Bridge,
    /// Run the diagnostic suite once, then idle
    Diagnostics,
}

/// ESC arming timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ArmingConfig {
    /// Time the throttle line is held physically LOW
    pub guard_low_ms: u32,
    /// Time neutral is held before commands are accepted
    pub neutral_hold_ms: u32,
}

impl Default for ArmingConfig {
    fn default() -> Self {
        Self {
            guard_low_ms: 200,
            neutral_hold_ms: 3000,
        }
    }
}

/// Output pin wired back to an input pin for the loopback test
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LoopbackPair {
    pub label: String<MAX_LABEL_LEN>,
    pub out_pin: u8,
    pub in_pin: u8,
}

/// Analog channel checked against fixed thresholds, in millivolts
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AnalogProbeConfig {
    pub label: String<MAX_LABEL_LEN>,
    pub pin: u8,
    /// Mean below this is a FAIL
    pub fail_below_mv: u16,
    /// Mean below this is a WARN
    pub warn_below_mv: u16,
    /// Mean above this is a WARN
    pub warn_above_mv: u16,
    /// Max-min spread above this is a WARN
    pub noise_limit_mv: u16,
}

impl Default for AnalogProbeConfig {
    fn default() -> Self {
        Self {
            label: String::new(),
            pin: 26,
            fail_below_mv: 0,
            warn_below_mv: 0,
            warn_above_mv: 3300,
            noise_limit_mv: 100,
        }
    }
}

impl AnalogProbeConfig {
    /// Thresholds must be ordered fail <= warn_below <= warn_above
    pub fn is_valid(&self) -> bool {
        self.fail_below_mv <= self.warn_below_mv && self.warn_below_mv <= self.warn_above_mv
    }
}

/// Diagnostic suite configuration
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DiagnosticsConfig {
    pub on_boot: BootMode,
    /// ADC pin sensing motor current during the throttle ramp
    pub current_sense_pin: Option<u8>,
    pub loopback: Vec<LoopbackPair, MAX_LOOPBACK_PAIRS>,
    pub analog: Vec<AnalogProbeConfig, MAX_ANALOG_PROBES>,
}

/// Complete bridge configuration
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BridgeConfig {
    pub wifi: WifiConfig,
    pub broker: BrokerConfig,
    pub hardware: HardwareProfile,
    pub pins: PinMap,
    pub arming: ArmingConfig,
    pub diagnostics: DiagnosticsConfig,
    /// Steering trim applied at boot
    pub boot_trim_us: i16,
}

impl BridgeConfig {
    /// Create a configuration with every default
    pub fn new() -> Self {
        Self::default()
    }

    pub fn boot_mode(&self) -> BootMode {
        self.diagnostics.on_boot
    }

    pub fn find_loopback(&self, label: &str) -> Option<&LoopbackPair> {
        self.diagnostics
            .loopback
            .iter()
            .find(|p| p.label.as_str() == label)
    }

    pub fn find_analog(&self, label: &str) -> Option<&AnalogProbeConfig> {
        self.diagnostics
            .analog
            .iter()
            .find(|p| p.label.as_str() == label)
    }
}
