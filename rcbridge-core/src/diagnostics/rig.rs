//! Hardware handed to the diagnostic runner

use rcbridge_hal::{AnalogInput, InputPin, OutputPin};

use crate::config::AnalogProbeConfig;
use crate::traits::{SteeringActuator, ThrottleActuator};

/// Output pin jumpered to an input pin
pub struct LoopbackProbe<'p> {
    pub label: &'p str,
    pub output: &'p mut dyn OutputPin,
    pub input: &'p mut dyn InputPin,
}

/// Analog channel with its thresholds
pub struct AnalogProbe<'p> {
    pub config: &'p AnalogProbeConfig,
    pub input: &'p mut dyn AnalogInput,
}

/// Everything one diagnostic run may touch
pub struct DiagnosticRig<'a, 'p> {
    /// Board description for the report header
    pub board: &'a str,
    pub steering: &'a mut dyn SteeringActuator,
    pub throttle: &'a mut dyn ThrottleActuator,
    pub loopbacks: &'a mut [LoopbackProbe<'p>],
    pub analog: &'a mut [AnalogProbe<'p>],
    /// Motor current sense, if fitted
    pub current_sense: Option<&'a mut dyn AnalogInput>,
}
