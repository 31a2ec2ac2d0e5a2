//! Blocking ADC channels
//!
//! The RP2040 has one converter multiplexed over several inputs. Channels
//! borrow it through a `RefCell`; everything runs on one executor, so a
//! read never overlaps another.

use core::cell::RefCell;

use embassy_rp::adc::{Adc, Blocking, Channel};
use rcbridge_hal::adc::{AdcError, AnalogInput};

/// 12-bit converter
pub const ADC_FULL_SCALE: u16 = 4095;

pub type SharedAdc = RefCell<Adc<'static, Blocking>>;

/// One input channel on the shared converter
pub struct AdcInput<'a> {
    adc: &'a SharedAdc,
    channel: Channel<'static>,
}

impl<'a> AdcInput<'a> {
    pub fn new(adc: &'a SharedAdc, channel: Channel<'static>) -> Self {
        Self { adc, channel }
    }
}

impl AnalogInput for AdcInput<'_> {
    fn read_raw(&mut self) -> Result<u16, AdcError> {
        let mut adc = self.adc.try_borrow_mut().map_err(|_| AdcError::Unavailable)?;
        adc.blocking_read(&mut self.channel)
            .map_err(|_| AdcError::Conversion)
    }

    fn full_scale(&self) -> u16 {
        ADC_FULL_SCALE
    }
}
