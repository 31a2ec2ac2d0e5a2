//! RC Bridge - Control & Diagnostics Bridge Firmware
//!
//! Main firmware binary for the Raspberry Pi Pico W. Drives a hobby RC
//! car's steering servo and throttle from a pub/sub broker over WiFi or
//! from a wired serial line, or runs the wiring self-test once at boot.

#![no_std]
#![no_main]

use defmt::*;
use embassy_executor::Spawner;
use embassy_futures::join::join;
use embassy_rp::bind_interrupts;
use embassy_rp::peripherals::{PIO0, UART0};
use embassy_rp::pio::InterruptHandler as PioInterruptHandler;
use embassy_rp::uart::BufferedInterruptHandler;
use embassy_time::{Delay, Instant, Timer};
use rcbridge_core::config::{parse_config, BootMode, BridgeConfig};
use rcbridge_core::dispatch::{ControlLoop, Peripherals};
use rcbridge_drivers::{MqttBroker, MqttSettings};
use rcbridge_hal::{BrokerSession, WifiLink};
use rcbridge_hal_rp2040::gpio::GpioAllocator;
use rcbridge_hal_rp2040::pins::GpioPeripherals;
use rcbridge_hal_rp2040::uart::BufferedSerial;
use {defmt_rtt as _, panic_probe as _};

use crate::board::{Board, Steering, Throttle};
use crate::net::{Offline, PicoWifi, RadioPins, TcpTransport};

mod board;
mod channels;
mod diag;
mod net;

/// Embedded configuration (compiled into firmware)
/// Edit bridge.toml and rebuild to customize
const EMBEDDED_CONFIG: &str = include_str!("../bridge.toml");

/// Pause between control-loop ticks so the radio tasks get to run
const TICK_PERIOD_MS: u64 = 2;

bind_interrupts!(pub struct Irqs {
    UART0_IRQ => BufferedInterruptHandler<UART0>;
    PIO0_IRQ_0 => PioInterruptHandler<PIO0>;
});

type BridgeIo<W, B> = Peripherals<W, B, Delay, BufferedSerial, Steering, Throttle>;

/// Main entry point
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("RC bridge firmware starting...");

    let p = embassy_rp::init(Default::default());
    let config = load_config();
    board::check_wiring(&config.pins);

    let (mut pins, rest) = GpioPeripherals::from_peripherals(p);
    let mut allocator = GpioAllocator::pico_w();

    let mut board = match Board::setup(
        &mut pins,
        rest.uart0,
        rest.pwm_slice0,
        &config,
        &mut allocator,
    ) {
        Ok(board) => board,
        Err(e) => {
            error!("board setup failed: {:?}", e);
            idle().await
        }
    };

    if config.boot_mode() == BootMode::Diagnostics {
        let report = diag::run(&config, &mut pins, rest.adc, &mut board, &mut allocator).await;
        info!(
            "diagnostics finished: {} entries, {} failed",
            report.entries.len(),
            report.summary.fail
        );
        idle().await
    }

    let mut control = ControlLoop::new(&config);

    let radio = if config.wifi.is_configured() {
        let radio = take_radio(&mut pins, rest.pio0, rest.dma_ch0);
        if radio.is_none() {
            error!("radio pins unavailable, running serial-only");
        }
        radio
    } else {
        info!("no WiFi SSID configured, running serial-only");
        None
    };

    let mut io: BridgeIo<Offline, Offline> = Peripherals {
        wifi: Offline,
        broker: Offline,
        delay: Delay,
        serial: board.serial,
        steering: board.steering,
        throttle: board.throttle,
    };

    // Arm while the radio comes up: outputs stay neutral for the whole hold
    let bring_up = async {
        let radio = radio?;
        match net::start(spawner, config.wifi.clone(), radio).await {
            Ok(stack) => Some(stack),
            Err(_) => {
                error!("failed to spawn radio tasks, running serial-only");
                None
            }
        }
    };
    let (armed, stack) = join(control.arm(&mut io), bring_up).await;
    if armed {
        info!("throttle armed");
    }

    let Some(stack) = stack else {
        run_bridge(control, io).await
    };

    let broker = MqttBroker::new(
        TcpTransport::new(stack, &config.broker),
        MqttSettings::from_config(&config.broker),
    );
    let io = Peripherals {
        wifi: PicoWifi::new(stack),
        broker,
        delay: io.delay,
        serial: io.serial,
        steering: io.steering,
        throttle: io.throttle,
    };
    run_bridge(control, io).await
}

/// Tick the control loop forever
async fn run_bridge<W, B>(mut control: ControlLoop, mut io: BridgeIo<W, B>) -> !
where
    W: WifiLink,
    B: BrokerSession,
{
    info!("control loop running");
    let mut last_state = None;
    loop {
        let report = control.tick(&mut io, Instant::now().as_millis()).await;
        if report.connection != last_state {
            debug!("link state {:?}", report.connection);
            last_state = report.connection;
        }
        if report.rejected > 0 {
            debug!("dropped {} lines", report.rejected);
        }
        Timer::after_millis(TICK_PERIOD_MS).await;
    }
}

fn take_radio(
    pins: &mut GpioPeripherals,
    pio: embassy_rp::Peri<'static, PIO0>,
    dma: embassy_rp::Peri<'static, embassy_rp::peripherals::DMA_CH0>,
) -> Option<RadioPins> {
    Some(RadioPins {
        pwr: pins.pin23.take()?,
        dio: pins.pin24.take()?,
        cs: pins.pin25.take()?,
        clk: pins.pin29.take()?,
        pio,
        dma,
    })
}

/// Parse the embedded bridge.toml, falling back to defaults
fn load_config() -> BridgeConfig {
    match parse_config(EMBEDDED_CONFIG) {
        Ok(config) => {
            info!("Parsed embedded configuration successfully");
            config
        }
        Err(e) => {
            // build.rs validates bridge.toml, so this only trips on values
            // the TOML check accepts but the firmware parser does not
            error!("Failed to parse embedded config: {:?}", e);
            error!("Using default configuration");
            BridgeConfig::new()
        }
    }
}

/// Nothing left to do
async fn idle() -> ! {
    loop {
        Timer::after_secs(60).await;
        trace!("idle heartbeat");
    }
}
