//! Minimal TOML parser for the bridge configuration
//!
//! Handles only the subset the bridge needs. It does NOT support the full
//! TOML format.
//!
//! Supported features:
//! - Key = value pairs (string, integer, float, boolean)
//! - `[section]` headers and `[section.name]` headers
//! - Comments (`# ...`), including trailing comments
//!
//! Unknown keys are ignored so older firmware accepts newer files. Unknown
//! sections and malformed values are errors.

use heapless::String;

use super::hardware::{ThrottleDriver, DEFAULT_ESC_MAX_US, DEFAULT_ESC_NEUTRAL_US};
use super::types::{AnalogProbeConfig, BootMode, BridgeConfig, LoopbackPair, MAX_LABEL_LEN};

/// Parse error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ParseError {
    /// Invalid or unknown section header
    InvalidSection,
    /// Invalid value type
    InvalidValue,
    /// String longer than its field allows
    ValueTooLong,
    /// Too many items (exceeded heapless capacity)
    TooManyItems,
    /// Invalid pin string
    InvalidPin,
    /// Values parse but contradict each other (e.g. min above max)
    InvalidRange,
}

/// Current parsing context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Root,
    Wifi,
    Broker,
    Steering,
    Throttle,
    Arming,
    Diagnostics,
    Pins,
    Loopback,
    Analog,
}

/// Throttle keys are collected first since `driver` may come last
#[derive(Debug, Default)]
struct ThrottleFields {
    driver: Option<ThrottleKind>,
    neutral_us: Option<u16>,
    max_us: Option<u16>,
    max_duty: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ThrottleKind {
    Esc,
    HBridge,
}

/// Parse TOML configuration into a [`BridgeConfig`]
pub fn parse_config(input: &str) -> Result<BridgeConfig, ParseError> {
    let mut config = BridgeConfig::new();
    let mut section = Section::Root;
    let mut throttle = ThrottleFields::default();

    for line in input.lines() {
        let line = line.trim();

        // Skip empty lines and comments
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if line.starts_with('[') && line.ends_with(']') {
            section = parse_section_header(&line[1..line.len() - 1], &mut config)?;
            continue;
        }

        if let Some((key, value)) = parse_key_value(line) {
            apply_value(section, key, value, &mut config, &mut throttle)?;
        }
    }

    config.hardware.throttle = build_throttle(&throttle);
    validate(&config)?;
    Ok(config)
}

/// Parse a section header, creating the named entry for dotted sections
fn parse_section_header(header: &str, config: &mut BridgeConfig) -> Result<Section, ParseError> {
    let header = header.trim();

    if let Some((kind, name)) = header.split_once('.') {
        let label = parse_label(name)?;
        return match kind {
            "loopback" => {
                config
                    .diagnostics
                    .loopback
                    .push(LoopbackPair {
                        label,
                        ..LoopbackPair::default()
                    })
                    .map_err(|_| ParseError::TooManyItems)?;
                Ok(Section::Loopback)
            }
            "analog" => {
                config
                    .diagnostics
                    .analog
                    .push(AnalogProbeConfig {
                        label,
                        ..AnalogProbeConfig::default()
                    })
                    .map_err(|_| ParseError::TooManyItems)?;
                Ok(Section::Analog)
            }
            _ => Err(ParseError::InvalidSection),
        };
    }

    match header {
        "wifi" => Ok(Section::Wifi),
        "broker" => Ok(Section::Broker),
        "steering" => Ok(Section::Steering),
        "throttle" => Ok(Section::Throttle),
        "arming" => Ok(Section::Arming),
        "diagnostics" => Ok(Section::Diagnostics),
        "pins" => Ok(Section::Pins),
        _ => Err(ParseError::InvalidSection),
    }
}

fn parse_label(name: &str) -> Result<String<MAX_LABEL_LEN>, ParseError> {
    let name = name.trim();
    if name.is_empty() || name.contains('.') {
        return Err(ParseError::InvalidSection);
    }
    String::try_from(name).map_err(|_| ParseError::ValueTooLong)
}

/// Parse "key = value" line
fn parse_key_value(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    let value = value.trim();

    // Remove inline comments, unless the # sits inside a string
    let value = match value.find('#') {
        Some(hash_pos) if value[..hash_pos].matches('"').count() % 2 == 0 => {
            value[..hash_pos].trim()
        }
        _ => value,
    };

    if key.is_empty() || value.is_empty() {
        return None;
    }

    Some((key, value))
}

/// Parse a string value (removes quotes)
fn parse_string(value: &str) -> &str {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        &value[1..value.len() - 1]
    } else {
        // Allow unquoted strings for simple values
        value
    }
}

fn parse_heapless<const N: usize>(value: &str) -> Result<String<N>, ParseError> {
    String::try_from(parse_string(value)).map_err(|_| ParseError::ValueTooLong)
}

/// Parse an integer value
fn parse_int<T: core::str::FromStr>(value: &str) -> Result<T, ParseError> {
    value.parse().map_err(|_| ParseError::InvalidValue)
}

fn parse_float(value: &str) -> Result<f32, ParseError> {
    let v: f32 = value.parse().map_err(|_| ParseError::InvalidValue)?;
    if v.is_finite() {
        Ok(v)
    } else {
        Err(ParseError::InvalidValue)
    }
}

/// Parse a pin given as `16` or `"gpio16"`
fn parse_pin(value: &str) -> Result<u8, ParseError> {
    let value = parse_string(value);
    let digits = value.strip_prefix("gpio").unwrap_or(value);
    let pin: u8 = digits.parse().map_err(|_| ParseError::InvalidPin)?;
    // RP2040 has GPIO0-29
    if pin > 29 {
        return Err(ParseError::InvalidPin);
    }
    Ok(pin)
}

fn parse_boot_mode(value: &str) -> Result<BootMode, ParseError> {
    match parse_string(value) {
        "bridge" => Ok(BootMode::Bridge),
        "diagnostics" => Ok(BootMode::Diagnostics),
        _ => Err(ParseError::InvalidValue),
    }
}

fn parse_driver(value: &str) -> Result<ThrottleKind, ParseError> {
    match parse_string(value) {
        "esc" => Ok(ThrottleKind::Esc),
        "hbridge" => Ok(ThrottleKind::HBridge),
        _ => Err(ParseError::InvalidValue),
    }
}

fn apply_value(
    section: Section,
    key: &str,
    value: &str,
    config: &mut BridgeConfig,
    throttle: &mut ThrottleFields,
) -> Result<(), ParseError> {
    match section {
        Section::Root => {}
        Section::Wifi => match key {
            "ssid" => config.wifi.ssid = parse_heapless(value)?,
            "password" => config.wifi.password = parse_heapless(value)?,
            "poll_interval_ms" => config.wifi.poll_interval_ms = parse_int(value)?,
            "rejoin_every" => config.wifi.rejoin_every = parse_int(value)?,
            _ => {}
        },
        Section::Broker => match key {
            "host" => config.broker.host = parse_heapless(value)?,
            "port" => config.broker.port = parse_int(value)?,
            "client_id" => config.broker.client_id = parse_heapless(value)?,
            "topic_prefix" => config.broker.topic_prefix = parse_heapless(value)?,
            "keepalive_s" => config.broker.keepalive_s = parse_int(value)?,
            "retry_ms" => config.broker.retry_ms = parse_int(value)?,
            _ => {}
        },
        Section::Steering => match key {
            "min_us" => config.hardware.steering.min_us = parse_int(value)?,
            "center_us" => config.hardware.steering.center_us = parse_int(value)?,
            "max_us" => config.hardware.steering.max_us = parse_int(value)?,
            "trim_us" => config.boot_trim_us = parse_int(value)?,
            _ => {}
        },
        Section::Throttle => match key {
            "driver" => throttle.driver = Some(parse_driver(value)?),
            "neutral_us" => throttle.neutral_us = Some(parse_int(value)?),
            "max_us" => throttle.max_us = Some(parse_int(value)?),
            "max_duty" => throttle.max_duty = Some(parse_int(value)?),
            "brake_epsilon" => config.hardware.brake_epsilon = parse_float(value)?,
            _ => {}
        },
        Section::Arming => match key {
            "guard_low_ms" => config.arming.guard_low_ms = parse_int(value)?,
            "neutral_hold_ms" => config.arming.neutral_hold_ms = parse_int(value)?,
            _ => {}
        },
        Section::Diagnostics => match key {
            "on_boot" => config.diagnostics.on_boot = parse_boot_mode(value)?,
            "current_sense" => config.diagnostics.current_sense_pin = Some(parse_pin(value)?),
            _ => {}
        },
        Section::Pins => match key {
            "steering_pwm" => config.pins.steering_pwm = parse_pin(value)?,
            "throttle_pwm" => config.pins.throttle_pwm = parse_pin(value)?,
            "motor_in1" => config.pins.motor_in1 = parse_pin(value)?,
            "motor_in2" => config.pins.motor_in2 = parse_pin(value)?,
            "battery_adc" => config.pins.battery_adc = parse_pin(value)?,
            _ => {}
        },
        Section::Loopback => {
            let Some(pair) = config.diagnostics.loopback.last_mut() else {
                return Err(ParseError::InvalidSection);
            };
            match key {
                "out_pin" => pair.out_pin = parse_pin(value)?,
                "in_pin" => pair.in_pin = parse_pin(value)?,
                _ => {}
            }
        }
        Section::Analog => {
            let Some(probe) = config.diagnostics.analog.last_mut() else {
                return Err(ParseError::InvalidSection);
            };
            match key {
                "pin" => probe.pin = parse_pin(value)?,
                "fail_below_mv" => probe.fail_below_mv = parse_int(value)?,
                "warn_below_mv" => probe.warn_below_mv = parse_int(value)?,
                "warn_above_mv" => probe.warn_above_mv = parse_int(value)?,
                "noise_limit_mv" => probe.noise_limit_mv = parse_int(value)?,
                _ => {}
            }
        }
    }
    Ok(())
}

fn build_throttle(fields: &ThrottleFields) -> ThrottleDriver {
    match fields.driver.unwrap_or(ThrottleKind::Esc) {
        ThrottleKind::Esc => ThrottleDriver::ServoEsc {
            neutral_us: fields.neutral_us.unwrap_or(DEFAULT_ESC_NEUTRAL_US),
            max_us: fields.max_us.unwrap_or(DEFAULT_ESC_MAX_US),
        },
        ThrottleKind::HBridge => ThrottleDriver::HBridge {
            max_duty: fields.max_duty.unwrap_or(u8::MAX),
        },
    }
}

fn validate(config: &BridgeConfig) -> Result<(), ParseError> {
    if !config.hardware.steering.is_valid() {
        return Err(ParseError::InvalidRange);
    }
    if let ThrottleDriver::ServoEsc { neutral_us, max_us } = config.hardware.throttle {
        if neutral_us >= max_us {
            return Err(ParseError::InvalidRange);
        }
    }
    if !(0.0..1.0).contains(&config.hardware.brake_epsilon) {
        return Err(ParseError::InvalidRange);
    }
    if config.diagnostics.analog.iter().any(|p| !p.is_valid()) {
        return Err(ParseError::InvalidRange);
    }
    if config.wifi.poll_interval_ms == 0 || config.wifi.rejoin_every == 0 {
        return Err(ParseError::InvalidRange);
    }
    Ok(())
}
