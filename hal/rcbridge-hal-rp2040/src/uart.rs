//! Buffered UART serial port
//!
//! Interrupt-driven ring buffers sit behind both directions, so writes only
//! block when the transmit buffer is full and reads never block.

use embassy_rp::uart::{self, BufferedUart};
use embedded_io::{Read, ReadReady, Write};
use rcbridge_hal::uart::{DataBits, Parity, StopBits, UartConfig};
use rcbridge_hal::{UartRx, UartTx};

/// Translate the board-agnostic settings to embassy-rp's
pub fn to_embassy_config(config: &UartConfig) -> uart::Config {
    let mut out = uart::Config::default();
    out.baudrate = config.baudrate;
    out.data_bits = match config.data_bits {
        DataBits::Seven => uart::DataBits::DataBits7,
        DataBits::Eight => uart::DataBits::DataBits8,
    };
    out.parity = match config.parity {
        Parity::None => uart::Parity::ParityNone,
        Parity::Even => uart::Parity::ParityEven,
        Parity::Odd => uart::Parity::ParityOdd,
    };
    out.stop_bits = match config.stop_bits {
        StopBits::One => uart::StopBits::STOP1,
        StopBits::Two => uart::StopBits::STOP2,
    };
    out
}

/// Serial command/report port
pub struct BufferedSerial {
    uart: BufferedUart,
}

impl BufferedSerial {
    pub fn new(uart: BufferedUart) -> Self {
        Self { uart }
    }
}

impl UartTx for BufferedSerial {
    type Error = uart::Error;

    fn write_blocking(&mut self, data: &[u8]) -> Result<(), uart::Error> {
        self.uart.write_all(data)
    }

    fn flush(&mut self) -> Result<(), uart::Error> {
        Write::flush(&mut self.uart)
    }
}

impl UartRx for BufferedSerial {
    type Error = uart::Error;

    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, uart::Error> {
        if buf.is_empty() || !self.uart.read_ready()? {
            return Ok(0);
        }
        self.uart.read(buf)
    }
}
