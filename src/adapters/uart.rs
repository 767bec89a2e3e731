//! ESP-IDF UART adapter implementing [`SerialPort`].
//!
//! Non-blocking reads (`NON_BLOCK`), FIFO-limited writes. An optional
//! GPIO drives the board's UART multiplexer select line.

use esp_idf_hal::delay::NON_BLOCK;
use esp_idf_hal::gpio::{AnyOutputPin, Output, PinDriver};
use esp_idf_hal::uart::UartDriver;
use esp_idf_hal::units::Hertz;
use esp_idf_sys::EspError;

use crate::ports::SerialPort;

/// UART driver plus optional multiplexer select pin.
pub struct EspUartPort {
    uart: UartDriver<'static>,
    mux: Option<PinDriver<'static, AnyOutputPin, Output>>,
}

impl EspUartPort {
    pub fn new(uart: UartDriver<'static>, mux: Option<PinDriver<'static, AnyOutputPin, Output>>) -> Self {
        Self { uart, mux }
    }
}

impl SerialPort for EspUartPort {
    type Error = EspError;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, EspError> {
        self.uart.read(buf, NON_BLOCK)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, EspError> {
        self.uart.write(data)
    }

    fn set_baud(&mut self, baud: u32) -> Result<(), EspError> {
        self.uart.change_baudrate(Hertz(baud)).map(|_| ())
    }

    fn discard(&mut self) -> Result<(), EspError> {
        self.uart.clear_rx()
    }

    fn select(&mut self, index: u8) -> Result<(), EspError> {
        match self.mux.as_mut() {
            Some(pin) if index == 0 => pin.set_low(),
            Some(pin) => pin.set_high(),
            None => Ok(()),
        }
    }
}
