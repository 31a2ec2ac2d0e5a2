//! Diagnostic boot: assemble the rig from config and run the suite once

use core::cell::RefCell;

use defmt::*;
use embassy_rp::adc::{Adc, Channel, Config as AdcConfig};
use embassy_rp::gpio::{Input, Level, Output, Pull};
use embassy_rp::peripherals::ADC;
use embassy_rp::Peri;
use embassy_time::Delay;
use heapless::Vec;
use rcbridge_core::actuator::ActuatorMapper;
use rcbridge_core::arming::ArmingSequence;
use rcbridge_core::config::{
    AnalogProbeConfig, BridgeConfig, LoopbackPair, MAX_ANALOG_PROBES, MAX_LOOPBACK_PAIRS,
};
use rcbridge_core::diagnostics::{
    AnalogProbe, DiagnosticReport, DiagnosticRig, DiagnosticRunner, LoopbackProbe,
};
use rcbridge_hal::AnalogInput;
use rcbridge_hal_rp2040::adc::{AdcInput, SharedAdc};
use rcbridge_hal_rp2040::gpio::{GpioAllocator, InputLine, OutputLine};
use rcbridge_hal_rp2040::pins::{GpioPeripherals, PinBank};
use static_cell::StaticCell;

use crate::board::Board;

const BOARD_NAME: &str = "pico_w";

static SHARED_ADC: StaticCell<SharedAdc> = StaticCell::new();

/// Arm the throttle, then run every diagnostic test once
///
/// Probes whose pins are out of range or already in use are skipped with
/// a warning; the rest of the suite still runs.
pub async fn run(
    config: &BridgeConfig,
    pins: &mut GpioPeripherals,
    adc: Peri<'static, ADC>,
    board: &mut Board,
    allocator: &mut GpioAllocator,
) -> DiagnosticReport {
    let mapper = ActuatorMapper::new(config.hardware);
    let mut delay = Delay;

    ArmingSequence::new(config.arming)
        .run(
            &mapper,
            config.boot_trim_us,
            &mut board.steering,
            &mut board.throttle,
            &mut delay,
        )
        .await;

    let adc: &SharedAdc =
        SHARED_ADC.init(RefCell::new(Adc::new_blocking(adc, AdcConfig::default())));

    // ADC channels first: the pin bank takes every pin still unclaimed
    let mut analog_inputs: Vec<(AdcInput<'_>, &AnalogProbeConfig), MAX_ANALOG_PROBES> =
        Vec::new();
    for probe in &config.diagnostics.analog {
        if let Some(channel) = claim_adc(probe.pin, pins, allocator) {
            let _ = analog_inputs.push((AdcInput::new(adc, channel), probe));
        }
    }
    let mut current_sense = config
        .diagnostics
        .current_sense_pin
        .and_then(|pin| claim_adc(pin, pins, allocator))
        .map(|channel| AdcInput::new(adc, channel));

    let mut bank = PinBank::new(pins);
    let mut lines: Vec<(OutputLine, InputLine, &str), MAX_LOOPBACK_PAIRS> = Vec::new();
    for pair in &config.diagnostics.loopback {
        if let Some((out, input)) = claim_loopback(pair, &mut bank, allocator) {
            let _ = lines.push((out, input, pair.label.as_str()));
        }
    }

    let mut loopbacks: Vec<LoopbackProbe<'_>, MAX_LOOPBACK_PAIRS> = Vec::new();
    for (output, input, label) in lines.iter_mut() {
        let _ = loopbacks.push(LoopbackProbe {
            label: *label,
            output,
            input,
        });
    }
    let mut analog: Vec<AnalogProbe<'_>, MAX_ANALOG_PROBES> = Vec::new();
    for (input, probe) in analog_inputs.iter_mut() {
        let _ = analog.push(AnalogProbe {
            config: *probe,
            input,
        });
    }

    info!(
        "diagnostics: {} loopback, {} analog, current sense {}",
        loopbacks.len(),
        analog.len(),
        current_sense.is_some()
    );

    let mut rig = DiagnosticRig {
        board: BOARD_NAME,
        steering: &mut board.steering,
        throttle: &mut board.throttle,
        loopbacks: &mut loopbacks,
        analog: &mut analog,
        current_sense: current_sense
            .as_mut()
            .map(|input| input as &mut dyn AnalogInput),
    };

    DiagnosticRunner::new(mapper)
        .run(&mut rig, &mut delay, &mut board.serial)
        .await
}

fn claim_adc(
    pin: u8,
    pins: &mut GpioPeripherals,
    allocator: &mut GpioAllocator,
) -> Option<Channel<'static>> {
    if let Err(e) = allocator.allocate(pin) {
        warn!("analog gpio{} skipped: {:?}", pin, e);
        return None;
    }
    match pins.take_adc_channel(pin) {
        Ok(channel) => Some(channel),
        Err(e) => {
            warn!("analog gpio{} skipped: {:?}", pin, e);
            None
        }
    }
}

fn claim_loopback(
    pair: &LoopbackPair,
    bank: &mut PinBank,
    allocator: &mut GpioAllocator,
) -> Option<(OutputLine, InputLine)> {
    if let Err(e) = allocator.allocate_all(&[pair.out_pin, pair.in_pin]) {
        warn!("loopback {} skipped: {:?}", pair.label.as_str(), e);
        return None;
    }
    match (bank.take(pair.out_pin), bank.take(pair.in_pin)) {
        (Ok(out), Ok(input)) => Some((
            OutputLine(Output::new(out, Level::Low)),
            InputLine(Input::new(input, Pull::Down)),
        )),
        (Err(e), _) | (_, Err(e)) => {
            warn!("loopback {} skipped: {:?}", pair.label.as_str(), e);
            None
        }
    }
}
