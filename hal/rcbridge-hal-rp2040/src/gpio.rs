//! GPIO wrappers and allocation
//!
//! Tracks which GPIO pins are in use so a config cannot wire two functions
//! to the same pin.

use embassy_rp::gpio::{Input, Output};
use heapless::FnvIndexSet;
use rcbridge_hal::{InputPin, OutputPin};

/// Maximum number of GPIO pins on RP2040
pub const GPIO_COUNT: usize = 30;

/// Pins the Pico W wires to the CYW43 radio
pub const CYW43_PINS: [u8; 4] = [23, 24, 25, 29];

/// Output driven through embassy-rp
pub struct OutputLine(pub Output<'static>);

impl OutputPin for OutputLine {
    fn set_high(&mut self) {
        self.0.set_high();
    }

    fn set_low(&mut self) {
        self.0.set_low();
    }

    fn is_set_high(&self) -> bool {
        self.0.is_set_high()
    }
}

/// Input read through embassy-rp
pub struct InputLine(pub Input<'static>);

impl InputPin for InputLine {
    fn is_high(&self) -> bool {
        self.0.is_high()
    }
}

/// Reason a pin could not be allocated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AllocError {
    /// Pin number out of range (0-29 valid)
    InvalidPin(u8),
    /// Pin already claimed by another function
    InUse(u8),
}

/// GPIO allocator to track pin usage
pub struct GpioAllocator {
    allocated: FnvIndexSet<u8, 32>,
}

impl Default for GpioAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl GpioAllocator {
    pub fn new() -> Self {
        Self {
            allocated: FnvIndexSet::new(),
        }
    }

    /// Allocator with the radio pins already claimed
    pub fn pico_w() -> Self {
        let mut alloc = Self::new();
        for pin in CYW43_PINS {
            let _ = alloc.allocate(pin);
        }
        alloc
    }

    /// Claim a pin
    pub fn allocate(&mut self, pin: u8) -> Result<(), AllocError> {
        if pin >= GPIO_COUNT as u8 {
            return Err(AllocError::InvalidPin(pin));
        }
        match self.allocated.insert(pin) {
            Ok(true) => Ok(()),
            _ => Err(AllocError::InUse(pin)),
        }
    }

    /// Claim every pin in `pins`, stopping at the first conflict
    pub fn allocate_all(&mut self, pins: &[u8]) -> Result<(), AllocError> {
        pins.iter().try_for_each(|&pin| self.allocate(pin))
    }

    pub fn release(&mut self, pin: u8) {
        self.allocated.remove(&pin);
    }

    pub fn is_allocated(&self, pin: u8) -> bool {
        self.allocated.contains(&pin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocator() {
        let mut alloc = GpioAllocator::new();

        assert_eq!(alloc.allocate(16), Ok(()));
        assert!(alloc.is_allocated(16));
        assert_eq!(alloc.allocate(16), Err(AllocError::InUse(16)));

        alloc.release(16);
        assert_eq!(alloc.allocate(16), Ok(()));
        assert_eq!(alloc.allocate(30), Err(AllocError::InvalidPin(30)));
    }

    #[test]
    fn test_pico_w_reserves_radio_pins() {
        let mut alloc = GpioAllocator::pico_w();
        assert_eq!(alloc.allocate_all(&[16, 17, 25]), Err(AllocError::InUse(25)));
    }
}
