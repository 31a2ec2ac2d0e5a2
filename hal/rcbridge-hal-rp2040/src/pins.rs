//! Dynamic pin allocation for config-driven hardware setup
//!
//! The PWM outputs and the radio use fixed pins taken straight from
//! [`GpioPeripherals`]. Whatever remains goes into a [`PinBank`] so config
//! sections (loopback jumpers, analog probes) can claim pins by number.

use embassy_rp::adc::Channel;
use embassy_rp::gpio::{AnyPin, Pull};
use embassy_rp::{Peri, Peripherals};

/// Error when requesting a pin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PinError {
    /// Pin number out of range (0-29 valid)
    InvalidPin,
    /// Pin already taken
    AlreadyTaken,
    /// Pin has no ADC input (only GPIO26-28 are usable)
    NotAnalog,
}

/// Every GPIO pin, each taken at most once
pub struct GpioPeripherals {
    pub pin0: Option<Peri<'static, embassy_rp::peripherals::PIN_0>>,
    pub pin1: Option<Peri<'static, embassy_rp::peripherals::PIN_1>>,
    pub pin2: Option<Peri<'static, embassy_rp::peripherals::PIN_2>>,
    pub pin3: Option<Peri<'static, embassy_rp::peripherals::PIN_3>>,
    pub pin4: Option<Peri<'static, embassy_rp::peripherals::PIN_4>>,
    pub pin5: Option<Peri<'static, embassy_rp::peripherals::PIN_5>>,
    pub pin6: Option<Peri<'static, embassy_rp::peripherals::PIN_6>>,
    pub pin7: Option<Peri<'static, embassy_rp::peripherals::PIN_7>>,
    pub pin8: Option<Peri<'static, embassy_rp::peripherals::PIN_8>>,
    pub pin9: Option<Peri<'static, embassy_rp::peripherals::PIN_9>>,
    pub pin10: Option<Peri<'static, embassy_rp::peripherals::PIN_10>>,
    pub pin11: Option<Peri<'static, embassy_rp::peripherals::PIN_11>>,
    pub pin12: Option<Peri<'static, embassy_rp::peripherals::PIN_12>>,
    pub pin13: Option<Peri<'static, embassy_rp::peripherals::PIN_13>>,
    pub pin14: Option<Peri<'static, embassy_rp::peripherals::PIN_14>>,
    pub pin15: Option<Peri<'static, embassy_rp::peripherals::PIN_15>>,
    pub pin16: Option<Peri<'static, embassy_rp::peripherals::PIN_16>>,
    pub pin17: Option<Peri<'static, embassy_rp::peripherals::PIN_17>>,
    pub pin18: Option<Peri<'static, embassy_rp::peripherals::PIN_18>>,
    pub pin19: Option<Peri<'static, embassy_rp::peripherals::PIN_19>>,
    pub pin20: Option<Peri<'static, embassy_rp::peripherals::PIN_20>>,
    pub pin21: Option<Peri<'static, embassy_rp::peripherals::PIN_21>>,
    pub pin22: Option<Peri<'static, embassy_rp::peripherals::PIN_22>>,
    pub pin23: Option<Peri<'static, embassy_rp::peripherals::PIN_23>>,
    pub pin24: Option<Peri<'static, embassy_rp::peripherals::PIN_24>>,
    pub pin25: Option<Peri<'static, embassy_rp::peripherals::PIN_25>>,
    pub pin26: Option<Peri<'static, embassy_rp::peripherals::PIN_26>>,
    pub pin27: Option<Peri<'static, embassy_rp::peripherals::PIN_27>>,
    pub pin28: Option<Peri<'static, embassy_rp::peripherals::PIN_28>>,
    pub pin29: Option<Peri<'static, embassy_rp::peripherals::PIN_29>>,
}

/// Non-GPIO peripherals left after splitting off the pins
pub struct RemainingPeripherals {
    pub pio0: Peri<'static, embassy_rp::peripherals::PIO0>,
    pub uart0: Peri<'static, embassy_rp::peripherals::UART0>,
    pub adc: Peri<'static, embassy_rp::peripherals::ADC>,
    pub pwm_slice0: Peri<'static, embassy_rp::peripherals::PWM_SLICE0>,
    pub pwm_slice1: Peri<'static, embassy_rp::peripherals::PWM_SLICE1>,
    pub dma_ch0: Peri<'static, embassy_rp::peripherals::DMA_CH0>,
}

impl GpioPeripherals {
    /// Split the pins off Embassy peripherals
    pub fn from_peripherals(p: Peripherals) -> (Self, RemainingPeripherals) {
        let pins = Self {
            pin0: Some(p.PIN_0),
            pin1: Some(p.PIN_1),
            pin2: Some(p.PIN_2),
            pin3: Some(p.PIN_3),
            pin4: Some(p.PIN_4),
            pin5: Some(p.PIN_5),
            pin6: Some(p.PIN_6),
            pin7: Some(p.PIN_7),
            pin8: Some(p.PIN_8),
            pin9: Some(p.PIN_9),
            pin10: Some(p.PIN_10),
            pin11: Some(p.PIN_11),
            pin12: Some(p.PIN_12),
            pin13: Some(p.PIN_13),
            pin14: Some(p.PIN_14),
            pin15: Some(p.PIN_15),
            pin16: Some(p.PIN_16),
            pin17: Some(p.PIN_17),
            pin18: Some(p.PIN_18),
            pin19: Some(p.PIN_19),
            pin20: Some(p.PIN_20),
            pin21: Some(p.PIN_21),
            pin22: Some(p.PIN_22),
            pin23: Some(p.PIN_23),
            pin24: Some(p.PIN_24),
            pin25: Some(p.PIN_25),
            pin26: Some(p.PIN_26),
            pin27: Some(p.PIN_27),
            pin28: Some(p.PIN_28),
            pin29: Some(p.PIN_29),
        };
        let remaining = RemainingPeripherals {
            pio0: p.PIO0,
            uart0: p.UART0,
            adc: p.ADC,
            pwm_slice0: p.PWM_SLICE0,
            pwm_slice1: p.PWM_SLICE1,
            dma_ch0: p.DMA_CH0,
        };
        (pins, remaining)
    }

    /// Take an ADC channel by GPIO number
    pub fn take_adc_channel(&mut self, pin_num: u8) -> Result<Channel<'static>, PinError> {
        match pin_num {
            26 => self.pin26.take().map(|p| Channel::new_pin(p, Pull::None)),
            27 => self.pin27.take().map(|p| Channel::new_pin(p, Pull::None)),
            28 => self.pin28.take().map(|p| Channel::new_pin(p, Pull::None)),
            0..=29 => return Err(PinError::NotAnalog),
            _ => return Err(PinError::InvalidPin),
        }
        .ok_or(PinError::AlreadyTaken)
    }
}

/// Pin bank that holds the remaining GPIO pins and hands them out by number
pub struct PinBank {
    pins: [Option<Peri<'static, AnyPin>>; 30],
}

impl PinBank {
    /// Move every pin still present in `p` into the bank
    pub fn new(p: &mut GpioPeripherals) -> Self {
        Self {
            pins: [
                p.pin0.take().map(Into::into),
                p.pin1.take().map(Into::into),
                p.pin2.take().map(Into::into),
                p.pin3.take().map(Into::into),
                p.pin4.take().map(Into::into),
                p.pin5.take().map(Into::into),
                p.pin6.take().map(Into::into),
                p.pin7.take().map(Into::into),
                p.pin8.take().map(Into::into),
                p.pin9.take().map(Into::into),
                p.pin10.take().map(Into::into),
                p.pin11.take().map(Into::into),
                p.pin12.take().map(Into::into),
                p.pin13.take().map(Into::into),
                p.pin14.take().map(Into::into),
                p.pin15.take().map(Into::into),
                p.pin16.take().map(Into::into),
                p.pin17.take().map(Into::into),
                p.pin18.take().map(Into::into),
                p.pin19.take().map(Into::into),
                p.pin20.take().map(Into::into),
                p.pin21.take().map(Into::into),
                p.pin22.take().map(Into::into),
                p.pin23.take().map(Into::into),
                p.pin24.take().map(Into::into),
                p.pin25.take().map(Into::into),
                p.pin26.take().map(Into::into),
                p.pin27.take().map(Into::into),
                p.pin28.take().map(Into::into),
                p.pin29.take().map(Into::into),
            ],
        }
    }

    /// Take a pin by number
    pub fn take(&mut self, pin_num: u8) -> Result<Peri<'static, AnyPin>, PinError> {
        if pin_num >= 30 {
            return Err(PinError::InvalidPin);
        }
        self.pins[pin_num as usize]
            .take()
            .ok_or(PinError::AlreadyTaken)
    }

    pub fn is_available(&self, pin_num: u8) -> bool {
        self.pins
            .get(pin_num as usize)
            .is_some_and(Option::is_some)
    }
}
