//! RP2040-specific HAL for the RC bridge firmware
//!
//! This crate provides RP2040 implementations of the shared
//! `rcbridge-hal` traits:
//! - GPIO wrappers and pin allocation checks
//! - Dynamic pin allocation for config-driven setup
//! - Servo-rate PWM outputs (steering, ESC, H-bridge enable)
//! - Blocking ADC channels
//! - Buffered UART serial port

#![no_std]

pub mod adc;
pub mod gpio;
pub mod pins;
pub mod pwm;
pub mod uart;
