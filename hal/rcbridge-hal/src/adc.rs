//! Analog input abstractions

/// Errors that can occur while sampling an analog input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AdcError {
    /// The conversion did not complete
    Conversion,
    /// The channel is not wired on this board
    Unavailable,
}

/// Single analog input channel
pub trait AnalogInput {
    /// Take one raw sample
    fn read_raw(&mut self) -> Result<u16, AdcError>;

    /// Raw value corresponding to the reference voltage
    /// (e.g. 4095 for a 12-bit converter)
    fn full_scale(&self) -> u16;

    /// Reference voltage in millivolts
    fn reference_mv(&self) -> u16 {
        3300
    }

    /// Convert a raw sample to millivolts at the pin
    fn to_millivolts(&self, raw: u16) -> u16 {
        let full_scale = self.full_scale().max(1) as u32;
        (raw as u32 * self.reference_mv() as u32 / full_scale) as u16
    }
}
