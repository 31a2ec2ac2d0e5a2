//! Pico W radio, network stack and broker transport
//!
//! Bring-up order follows the CYW43 driver's requirements:
//!
//! 1. Load the radio firmware over PIO SPI
//! 2. Spawn the radio runner, then load the CLM blob
//! 3. Create the embassy-net stack (DHCP) and spawn its runner
//! 4. Hand the `Control` handle to a task serving join requests
//!
//! The control loop only sees the [`PicoWifi`] link and the
//! [`TcpTransport`] byte stream.
//!
//! The radio firmware blobs (`43439A0.bin`, `43439A0_clm.bin`,
//! `nvram_rp2040.bin`) are not part of this repository. Copy them from the
//! embassy `cyw43-firmware` directory into `cyw43-firmware/` at the
//! workspace root before building.

use cyw43::{aligned_bytes, JoinOptions};
use cyw43_pio::{PioSpi, DEFAULT_CLOCK_DIVIDER};
use defmt::*;
use embassy_executor::{SpawnError, Spawner};
use embassy_net::dns::DnsQueryType;
use embassy_net::tcp::TcpSocket;
use embassy_net::{Config as NetConfig, IpAddress, Ipv4Address, Stack, StackResources};
use embassy_rp::clocks::RoscRng;
use embassy_rp::gpio::{Level, Output};
use embassy_rp::peripherals::{DMA_CH0, PIN_23, PIN_24, PIN_25, PIN_29, PIO0};
use embassy_rp::pio::Pio;
use embassy_rp::Peri;
use embassy_time::{with_timeout, Duration};
use embedded_io_async::{ErrorKind, ErrorType, Read, Write};
use heapless::String;
use portable_atomic::{AtomicBool, Ordering};
use rcbridge_core::config::{parse_ipv4, BrokerConfig, WifiConfig, MAX_HOST_LEN};
use rcbridge_hal::{BrokerMessage, BrokerSession, Transport, WifiLink};
use static_cell::StaticCell;

use crate::channels::JOIN_REQUEST;
use crate::Irqs;

/// One association attempt
const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// TCP connect, including DNS
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Any single socket read or write
const IO_TIMEOUT: Duration = Duration::from_secs(5);

const SOCKET_BUF: usize = 1024;

/// Set by the join task after a successful join, cleared before each new one
static ASSOCIATED: AtomicBool = AtomicBool::new(false);

/// Pins and peripherals wired to the CYW43
pub struct RadioPins {
    pub pwr: Peri<'static, PIN_23>,
    pub dio: Peri<'static, PIN_24>,
    pub cs: Peri<'static, PIN_25>,
    pub clk: Peri<'static, PIN_29>,
    pub pio: Peri<'static, PIO0>,
    pub dma: Peri<'static, DMA_CH0>,
}

/// Bring up the radio and the network stack
///
/// Spawns the radio and stack runners plus the join task, then returns the
/// stack handle. Nothing joins until the control loop asks through
/// [`PicoWifi::begin`](WifiLink::begin).
pub async fn start(
    spawner: Spawner,
    wifi: WifiConfig,
    radio: RadioPins,
) -> Result<Stack<'static>, SpawnError> {
    let fw = aligned_bytes!("../../cyw43-firmware/43439A0.bin");
    let clm = include_bytes!("../../cyw43-firmware/43439A0_clm.bin");
    let nvram = aligned_bytes!("../../cyw43-firmware/nvram_rp2040.bin");

    let pwr = Output::new(radio.pwr, Level::Low);
    let cs = Output::new(radio.cs, Level::High);
    let mut pio = Pio::new(radio.pio, Irqs);
    let spi = PioSpi::new(
        &mut pio.common,
        pio.sm0,
        DEFAULT_CLOCK_DIVIDER,
        pio.irq0,
        cs,
        radio.dio,
        radio.clk,
        radio.dma,
    );

    static STATE: StaticCell<cyw43::State> = StaticCell::new();
    let state = STATE.init(cyw43::State::new());
    let (net_device, mut control, runner) = cyw43::new(state, pwr, spi, fw, nvram).await;
    spawner.spawn(wifi_task(runner)?);

    control.init(clm).await;
    control
        .set_power_management(cyw43::PowerManagementMode::None)
        .await;

    let mut rng = RoscRng;
    let seed = rng.next_u64();

    static RESOURCES: StaticCell<StackResources<3>> = StaticCell::new();
    let (stack, runner) = embassy_net::new(
        net_device,
        NetConfig::dhcpv4(Default::default()),
        RESOURCES.init(StackResources::new()),
        seed,
    );
    spawner.spawn(net_task(runner)?);
    spawner.spawn(join_task(control, wifi)?);

    info!("radio up");
    Ok(stack)
}

/// Serve join requests forever
///
/// Each request leaves any current network and makes one bounded join
/// attempt.
#[embassy_executor::task]
async fn join_task(mut control: cyw43::Control<'static>, wifi: WifiConfig) -> ! {
    loop {
        JOIN_REQUEST.wait().await;
        ASSOCIATED.store(false, Ordering::Release);
        control.leave().await;

        info!("joining {}", wifi.ssid.as_str());
        let options = JoinOptions::new(wifi.password.as_bytes());
        match with_timeout(JOIN_TIMEOUT, control.join(wifi.ssid.as_str(), options)).await {
            Ok(Ok(())) => {
                info!("associated");
                ASSOCIATED.store(true, Ordering::Release);
            }
            Ok(Err(_)) => warn!("join rejected"),
            Err(_) => warn!("join timed out"),
        }
    }
}

#[embassy_executor::task]
async fn wifi_task(
    runner: cyw43::Runner<
        'static,
        cyw43::SpiBus<Output<'static>, PioSpi<'static, PIO0, 0, DMA_CH0>>,
    >,
) -> ! {
    runner.run().await
}

#[embassy_executor::task]
async fn net_task(mut runner: embassy_net::Runner<'static, cyw43::NetDriver<'static>>) -> ! {
    runner.run().await
}

/// Wireless link backed by the join task
pub struct PicoWifi {
    stack: Stack<'static>,
}

impl PicoWifi {
    pub fn new(stack: Stack<'static>) -> Self {
        Self { stack }
    }
}

impl WifiLink for PicoWifi {
    fn begin(&mut self) {
        JOIN_REQUEST.signal(());
    }

    fn is_connected(&self) -> bool {
        ASSOCIATED.load(Ordering::Acquire) && self.stack.is_link_up() && self.stack.is_config_up()
    }
}

/// Transport failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub enum TransportError {
    /// Host name did not resolve
    Dns,
    /// TCP handshake failed or timed out
    Connect,
    /// Socket error or peer reset
    Closed,
    /// Read or write did not complete in time
    Timeout,
}

impl embedded_io_async::Error for TransportError {
    fn kind(&self) -> ErrorKind {
        match self {
            TransportError::Dns => ErrorKind::AddrNotAvailable,
            TransportError::Connect => ErrorKind::ConnectionRefused,
            TransportError::Closed => ErrorKind::ConnectionReset,
            TransportError::Timeout => ErrorKind::TimedOut,
        }
    }
}

/// TCP stream to the broker
pub struct TcpTransport {
    stack: Stack<'static>,
    socket: TcpSocket<'static>,
    host: String<MAX_HOST_LEN>,
    port: u16,
    open: bool,
}

impl TcpTransport {
    /// Create the one broker socket
    ///
    /// Backed by static buffers, so it can only be called once.
    pub fn new(stack: Stack<'static>, broker: &BrokerConfig) -> Self {
        static RX_BUF: StaticCell<[u8; SOCKET_BUF]> = StaticCell::new();
        static TX_BUF: StaticCell<[u8; SOCKET_BUF]> = StaticCell::new();
        let rx = RX_BUF.init([0; SOCKET_BUF]);
        let tx = TX_BUF.init([0; SOCKET_BUF]);

        let mut socket = TcpSocket::new(stack, rx, tx);
        socket.set_timeout(Some(IO_TIMEOUT * 2));

        Self {
            stack,
            socket,
            host: broker.host.clone(),
            port: broker.port,
            open: false,
        }
    }

    async fn resolve(&self) -> Result<IpAddress, TransportError> {
        if let Some([a, b, c, d]) = parse_ipv4(&self.host) {
            return Ok(IpAddress::Ipv4(Ipv4Address::new(a, b, c, d)));
        }
        let addrs = self
            .stack
            .dns_query(self.host.as_str(), DnsQueryType::A)
            .await
            .map_err(|_| TransportError::Dns)?;
        addrs.first().copied().ok_or(TransportError::Dns)
    }
}

impl ErrorType for TcpTransport {
    type Error = TransportError;
}

impl Read for TcpTransport {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        match with_timeout(IO_TIMEOUT, self.socket.read(buf)).await {
            Ok(Ok(n)) => {
                if n == 0 {
                    self.open = false;
                }
                Ok(n)
            }
            Ok(Err(_)) => {
                self.open = false;
                Err(TransportError::Closed)
            }
            Err(_) => Err(TransportError::Timeout),
        }
    }
}

impl Write for TcpTransport {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, TransportError> {
        match with_timeout(IO_TIMEOUT, self.socket.write(buf)).await {
            Ok(Ok(n)) => Ok(n),
            Ok(Err(_)) => {
                self.open = false;
                Err(TransportError::Closed)
            }
            Err(_) => Err(TransportError::Timeout),
        }
    }

    async fn flush(&mut self) -> Result<(), TransportError> {
        match with_timeout(IO_TIMEOUT, self.socket.flush()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => {
                self.open = false;
                Err(TransportError::Closed)
            }
            Err(_) => Err(TransportError::Timeout),
        }
    }
}

impl Transport for TcpTransport {
    async fn open(&mut self) -> Result<(), TransportError> {
        self.close();

        let connect = async {
            let addr = self.resolve().await?;
            debug!("connecting to broker port {}", self.port);
            self.socket
                .connect((addr, self.port))
                .await
                .map_err(|_| TransportError::Connect)
        };
        match with_timeout(CONNECT_TIMEOUT, connect).await {
            Ok(Ok(())) => {
                self.open = true;
                Ok(())
            }
            Ok(Err(e)) => {
                self.socket.abort();
                Err(e)
            }
            Err(_) => {
                self.socket.abort();
                Err(TransportError::Timeout)
            }
        }
    }

    fn close(&mut self) {
        self.socket.abort();
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open && self.socket.may_send()
    }

    fn read_ready(&mut self) -> bool {
        self.socket.can_recv()
    }
}

/// Link and session stand-in for serial-only builds
///
/// Never associates, so the connection manager never gets past
/// `WifiConnecting`.
pub struct Offline;

impl WifiLink for Offline {
    fn begin(&mut self) {}

    fn is_connected(&self) -> bool {
        false
    }
}

impl BrokerSession for Offline {
    type Error = TransportError;

    async fn connect(&mut self) -> Result<(), TransportError> {
        Err(TransportError::Connect)
    }

    async fn subscribe(&mut self, _topic: &str) -> Result<(), TransportError> {
        Err(TransportError::Closed)
    }

    fn is_connected(&self) -> bool {
        false
    }

    async fn poll(&mut self, _now_ms: u64) -> Result<Option<BrokerMessage>, TransportError> {
        Ok(None)
    }
}
