//! Build script for rcbridge-firmware
//!
//! - Sets up linker search paths and scripts for memory.x
//! - Validates bridge.toml at compile time

use std::env;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// GPIOs the Pico W wires to the CYW43 radio
const RADIO_PINS: [i64; 4] = [23, 24, 25, 29];

/// Pins with an ADC input
const ADC_PINS: [i64; 3] = [26, 27, 28];

const KNOWN_SECTIONS: [&str; 9] = [
    "wifi",
    "broker",
    "steering",
    "throttle",
    "arming",
    "pins",
    "diagnostics",
    "loopback",
    "analog",
];

fn main() {
    setup_linker();
    validate_config();
}

/// Set up linker search paths for memory.x
fn setup_linker() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());

    // Copy memory.x to the output directory
    let memory_x = include_bytes!("memory.x");
    let mut f = File::create(out_dir.join("memory.x")).unwrap();
    f.write_all(memory_x).unwrap();

    // Tell rustc where to find memory.x
    println!("cargo:rustc-link-search={}", out_dir.display());

    println!("cargo:rustc-link-arg-bins=--nmagic");
    println!("cargo:rustc-link-arg-bins=-Tlink.x");
    println!("cargo:rustc-link-arg-bins=-Tlink-rp.x");
    println!("cargo:rustc-link-arg-bins=-Tdefmt.x");

    // Re-run if memory.x changes
    println!("cargo:rerun-if-changed=memory.x");
    println!("cargo:rerun-if-changed=build.rs");
}

/// Validate bridge.toml configuration at compile time
fn validate_config() {
    println!("cargo:rerun-if-changed=bridge.toml");

    let config_path = Path::new("bridge.toml");

    if !config_path.exists() {
        panic!(
            "\n\
            ╔══════════════════════════════════════════════════════════════════╗\n\
            ║  ERROR: bridge.toml not found!                                   ║\n\
            ║                                                                  ║\n\
            ║  The firmware embeds a bridge.toml configuration file.           ║\n\
            ║  Please create one in the rcbridge-firmware directory.           ║\n\
            ╚══════════════════════════════════════════════════════════════════╝\n"
        );
    }

    let config_content = match fs::read_to_string(config_path) {
        Ok(content) => content,
        Err(e) => {
            panic!(
                "\n\
                ╔══════════════════════════════════════════════════════════════════╗\n\
                ║  ERROR: Failed to read bridge.toml                               ║\n\
                ║                                                                  ║\n\
                ║  Error: {:<56} ║\n\
                ╚══════════════════════════════════════════════════════════════════╝\n",
                e
            );
        }
    };

    let config: toml::Value = match toml::from_str(&config_content) {
        Ok(value) => value,
        Err(e) => {
            let error_msg = e.to_string();
            panic!(
                "\n\
                ╔══════════════════════════════════════════════════════════════════╗\n\
                ║  ERROR: Invalid TOML syntax in bridge.toml                       ║\n\
                ╠══════════════════════════════════════════════════════════════════╣\n\
                ║                                                                  ║\n\
                {}\n\
                ║                                                                  ║\n\
                ╚══════════════════════════════════════════════════════════════════╝\n",
                format_error_lines(&error_msg)
            );
        }
    };

    let mut errors = Vec::new();
    validate_sections(&config, &mut errors);
    validate_network(&config, &mut errors);
    validate_steering(&config, &mut errors);
    validate_throttle(&config, &mut errors);
    validate_pins(&config, &mut errors);
    validate_diagnostics(&config, &mut errors);

    if !errors.is_empty() {
        panic!(
            "\n\
            ╔══════════════════════════════════════════════════════════════════╗\n\
            ║  ERROR: Invalid bridge.toml                                      ║\n\
            ╠══════════════════════════════════════════════════════════════════╣\n\
            {}\n\
            ╚══════════════════════════════════════════════════════════════════╝\n",
            errors
                .iter()
                .map(|e| format!("║  • {:<62} ║", e))
                .collect::<Vec<_>>()
                .join("\n")
        );
    }

    println!("cargo:warning=bridge.toml validated successfully");
}

/// Format error message lines with box drawing
fn format_error_lines(msg: &str) -> String {
    msg.lines()
        .map(|line| {
            let truncated = if line.len() > 64 {
                format!("{}...", &line[..61])
            } else {
                line.to_string()
            };
            format!("║  {:<64} ║", truncated)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn table<'a>(config: &'a toml::Value, name: &str) -> Option<&'a toml::value::Table> {
    config.get(name).and_then(toml::Value::as_table)
}

fn int(table: &toml::value::Table, key: &str) -> Option<i64> {
    table.get(key).and_then(toml::Value::as_integer)
}

/// Pin given as `"gpioN"` or a bare integer
fn pin(value: &toml::Value) -> Option<i64> {
    match value {
        toml::Value::Integer(n) => Some(*n),
        toml::Value::String(s) => s.strip_prefix("gpio").unwrap_or(s).parse().ok(),
        _ => None,
    }
}

fn check_pin(label: String, value: &toml::Value, errors: &mut Vec<String>) -> Option<i64> {
    match pin(value) {
        Some(n) if !(0..=29).contains(&n) => {
            errors.push(format!("{} must be gpio0-gpio29", label));
            None
        }
        Some(n) if RADIO_PINS.contains(&n) => {
            errors.push(format!("{} uses radio pin gpio{}", label, n));
            None
        }
        Some(n) => Some(n),
        None => {
            errors.push(format!("{} must be \"gpioN\" or an integer", label));
            None
        }
    }
}

fn validate_sections(config: &toml::Value, errors: &mut Vec<String>) {
    let Some(root) = config.as_table() else {
        return;
    };
    for (name, value) in root {
        if !KNOWN_SECTIONS.contains(&name.as_str()) {
            errors.push(format!("Unknown section [{}]", name));
        } else if !value.is_table() {
            errors.push(format!("[{}] must be a table", name));
        }
    }
}

fn validate_network(config: &toml::Value, errors: &mut Vec<String>) {
    let mut ssid_set = false;
    if let Some(wifi) = table(config, "wifi") {
        if let Some(ssid) = wifi.get("ssid").and_then(toml::Value::as_str) {
            if ssid.len() > 32 {
                errors.push("[wifi] ssid longer than 32 bytes".to_string());
            }
            ssid_set = !ssid.is_empty();
        }
        if let Some(password) = wifi.get("password").and_then(toml::Value::as_str) {
            if password.len() > 64 {
                errors.push("[wifi] password longer than 64 bytes".to_string());
            }
        }
        for key in ["poll_interval_ms", "rejoin_every"] {
            if matches!(int(wifi, key), Some(n) if n <= 0) {
                errors.push(format!("[wifi] {} must be positive", key));
            }
        }
    }

    let Some(broker) = table(config, "broker") else {
        if ssid_set {
            errors.push("[wifi] ssid set but [broker] missing".to_string());
        }
        return;
    };
    let host = broker.get("host").and_then(toml::Value::as_str).unwrap_or("");
    if ssid_set && host.is_empty() {
        errors.push("[broker] host required when [wifi] ssid is set".to_string());
    }
    if host.len() > 64 {
        errors.push("[broker] host longer than 64 bytes".to_string());
    }
    if let Some(port) = int(broker, "port") {
        if !(1..=65535).contains(&port) {
            errors.push("[broker] port must be 1-65535".to_string());
        }
    }
    if let Some(id) = broker.get("client_id").and_then(toml::Value::as_str) {
        if id.is_empty() || id.len() > 23 {
            errors.push("[broker] client_id must be 1-23 bytes".to_string());
        }
    }
    if let Some(prefix) = broker.get("topic_prefix").and_then(toml::Value::as_str) {
        if prefix.contains(['#', '+']) {
            errors.push("[broker] topic_prefix must not contain wildcards".to_string());
        }
    }
}

fn validate_steering(config: &toml::Value, errors: &mut Vec<String>) {
    let Some(steering) = table(config, "steering") else {
        return;
    };
    let min = int(steering, "min_us").unwrap_or(1000);
    let center = int(steering, "center_us").unwrap_or(1500);
    let max = int(steering, "max_us").unwrap_or(2000);
    if !(min < center && center < max) {
        errors.push("[steering] requires min_us < center_us < max_us".to_string());
    }
    if max > 20_000 {
        errors.push("[steering] max_us exceeds the 20 ms servo frame".to_string());
    }
}

fn validate_throttle(config: &toml::Value, errors: &mut Vec<String>) {
    let Some(throttle) = table(config, "throttle") else {
        return;
    };
    match throttle.get("driver").and_then(toml::Value::as_str) {
        None | Some("esc") => {
            let neutral = int(throttle, "neutral_us").unwrap_or(1500);
            let max = int(throttle, "max_us").unwrap_or(2000);
            if neutral >= max {
                errors.push("[throttle] requires neutral_us < max_us".to_string());
            }
        }
        Some("hbridge") => {
            if let Some(duty) = int(throttle, "max_duty") {
                if !(1..=255).contains(&duty) {
                    errors.push("[throttle] max_duty must be 1-255".to_string());
                }
            }
        }
        Some(_) => errors.push("[throttle] driver must be 'esc' or 'hbridge'".to_string()),
    }
    if let Some(eps) = throttle.get("brake_epsilon").and_then(toml::Value::as_float) {
        if !(0.0..1.0).contains(&eps) {
            errors.push("[throttle] brake_epsilon must be in [0, 1)".to_string());
        }
    }
}

fn validate_pins(config: &toml::Value, errors: &mut Vec<String>) {
    let Some(pins) = table(config, "pins") else {
        return;
    };
    let mut seen = Vec::new();
    for (key, value) in pins {
        let Some(n) = check_pin(format!("[pins] {}", key), value, errors) else {
            continue;
        };
        if key == "battery_adc" && !ADC_PINS.contains(&n) {
            errors.push("[pins] battery_adc must be gpio26-gpio28".to_string());
        }
        if seen.contains(&n) {
            errors.push(format!("[pins] gpio{} assigned twice", n));
        }
        seen.push(n);
    }
}

fn validate_diagnostics(config: &toml::Value, errors: &mut Vec<String>) {
    if let Some(diag) = table(config, "diagnostics") {
        if let Some(mode) = diag.get("on_boot").and_then(toml::Value::as_str) {
            if mode != "bridge" && mode != "diagnostics" {
                errors.push("[diagnostics] on_boot must be 'bridge' or 'diagnostics'".to_string());
            }
        }
        if let Some(value) = diag.get("current_sense") {
            if let Some(n) = check_pin("[diagnostics] current_sense".to_string(), value, errors) {
                if !ADC_PINS.contains(&n) {
                    errors.push("[diagnostics] current_sense must be gpio26-gpio28".to_string());
                }
            }
        }
    }

    if let Some(loopbacks) = table(config, "loopback") {
        if loopbacks.len() > 4 {
            errors.push("At most 4 [loopback.*] sections".to_string());
        }
        for (label, pair) in loopbacks {
            let Some(pair) = pair.as_table() else {
                errors.push(format!("[loopback.{}] must be a table", label));
                continue;
            };
            if label.len() > 16 {
                errors.push(format!("[loopback.{}] label longer than 16 bytes", label));
            }
            let mut ends = Vec::new();
            for key in ["out_pin", "in_pin"] {
                match pair.get(key) {
                    Some(value) => {
                        let name = format!("[loopback.{}] {}", label, key);
                        ends.extend(check_pin(name, value, errors));
                    }
                    None => errors.push(format!("[loopback.{}] missing '{}'", label, key)),
                }
            }
            if ends.len() == 2 && ends[0] == ends[1] {
                errors.push(format!("[loopback.{}] out_pin and in_pin are equal", label));
            }
        }
    }

    if let Some(probes) = table(config, "analog") {
        if probes.len() > 4 {
            errors.push("At most 4 [analog.*] sections".to_string());
        }
        for (label, probe) in probes {
            let Some(probe) = probe.as_table() else {
                errors.push(format!("[analog.{}] must be a table", label));
                continue;
            };
            match probe.get("pin") {
                Some(value) => {
                    let name = format!("[analog.{}] pin", label);
                    if let Some(n) = check_pin(name, value, errors) {
                        if !ADC_PINS.contains(&n) {
                            errors.push(format!("[analog.{}] pin must be gpio26-gpio28", label));
                        }
                    }
                }
                None => errors.push(format!("[analog.{}] missing 'pin'", label)),
            }
            let fail = int(probe, "fail_below_mv").unwrap_or(0);
            let low = int(probe, "warn_below_mv").unwrap_or(0);
            let high = int(probe, "warn_above_mv").unwrap_or(3300);
            if !(fail <= low && low <= high) {
                errors.push(format!(
                    "[analog.{}] needs fail_below <= warn_below <= warn_above",
                    label
                ));
            }
        }
    }
}
