//! Line-framing UART device.
//!
//! Puts a [`SerialPort`] behind the socket contract. Writes go through a
//! bounded pending-TX buffer that is drained opportunistically; received
//! bytes are assembled into lines (configurable terminator, optional
//! printable-ASCII filter) and each complete line is handed to every
//! socket open on the device.
//!
//! The receive path is pull-based: whoever owns the polling loop calls
//! [`UartDevice::poll`] periodically.

use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, warn};

use crate::config::{LINE_BUF_SIZE, TX_BUF_SIZE};
use crate::device::{Device, DeviceRegistry, Ioctl, SocketId};
use crate::error::DeviceError;
use crate::ports::SerialPort;

const RX_CHUNK: usize = 64;

// ───────────────────────────────────────────────────────────────
// Line assembler
// ───────────────────────────────────────────────────────────────

/// Accumulates bytes until the terminator, in one reused buffer.
pub struct LineAssembler {
    buf: heapless::Vec<u8, LINE_BUF_SIZE>,
    eol: u8,
    ascii_only: bool,
    /// Current line outgrew the buffer; drop bytes until the next EOL.
    overflow: bool,
    /// `buf` holds a line already handed out; clear before reuse.
    complete: bool,
}

impl LineAssembler {
    pub fn new(eol: u8) -> Self {
        Self {
            buf: heapless::Vec::new(),
            eol,
            ascii_only: false,
            overflow: false,
            complete: false,
        }
    }

    pub fn set_eol(&mut self, eol: u8) {
        self.eol = eol;
    }

    pub fn set_ascii_only(&mut self, on: bool) {
        self.ascii_only = on;
    }

    /// Drop any partial line.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.overflow = false;
        self.complete = false;
    }

    /// Feed one byte. Returns the finished line when `byte` terminates a
    /// non-empty line; the slice is valid until the next call.
    pub fn push(&mut self, byte: u8) -> Option<&[u8]> {
        if self.complete {
            self.buf.clear();
            self.complete = false;
        }

        if byte == self.eol {
            if self.overflow {
                self.overflow = false;
                self.buf.clear();
                return None;
            }
            if self.buf.is_empty() {
                return None;
            }
            self.complete = true;
            return Some(self.buf.as_slice());
        }

        if self.overflow || (self.ascii_only && !(0x20..=0x7E).contains(&byte)) {
            return None;
        }

        if self.buf.push(byte).is_err() {
            warn!(
                "uart: line longer than {} bytes, dropping it",
                LINE_BUF_SIZE
            );
            self.overflow = true;
        }
        None
    }
}

// ───────────────────────────────────────────────────────────────
// UART device
// ───────────────────────────────────────────────────────────────

struct UartState<P> {
    port: P,
    baud: u32,
    selected: Option<u8>,
    tx: heapless::Vec<u8, TX_BUF_SIZE>,
    rx: [u8; RX_CHUNK],
    rx_pos: usize,
    rx_len: usize,
    lines: LineAssembler,
}

impl<P: SerialPort> UartState<P> {
    /// Push as much pending TX into the port as it takes.
    fn drain_tx(&mut self) -> Result<(), DeviceError> {
        while !self.tx.is_empty() {
            let n = self.port.write(&self.tx).map_err(|e| {
                warn!("uart: write failed: {:?}", e);
                DeviceError::Io
            })?;
            if n == 0 {
                break;
            }
            let n = n.min(self.tx.len());
            let rest = self.tx.len() - n;
            self.tx.copy_within(n.., 0);
            self.tx.truncate(rest);
        }
        Ok(())
    }

    /// Pull bytes until a line completes (copied into `out`) or the port
    /// runs dry.
    fn next_line(&mut self, out: &mut [u8; LINE_BUF_SIZE]) -> Option<usize> {
        loop {
            if self.rx_pos == self.rx_len {
                match self.port.read(&mut self.rx) {
                    Ok(0) => return None,
                    Ok(n) => {
                        self.rx_len = n.min(RX_CHUNK);
                        self.rx_pos = 0;
                    }
                    Err(e) => {
                        warn!("uart: read failed: {:?}", e);
                        return None;
                    }
                }
            }
            let byte = self.rx[self.rx_pos];
            self.rx_pos += 1;
            if let Some(line) = self.lines.push(byte) {
                out[..line.len()].copy_from_slice(line);
                return Some(line.len());
            }
        }
    }
}

/// A [`SerialPort`] exposed as a registrable line device.
pub struct UartDevice<P> {
    name: String,
    state: Mutex<UartState<P>>,
}

impl<P: SerialPort> UartDevice<P> {
    /// Wrap `port`; `name` must match the name the device is registered
    /// under, since received lines are routed by it.
    pub fn new(name: impl Into<String>, port: P, baud: u32) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(UartState {
                port,
                baud,
                selected: None,
                tx: heapless::Vec::new(),
                rx: [0; RX_CHUNK],
                rx_pos: 0,
                rx_len: 0,
                lines: LineAssembler::new(b'\n'),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, UartState<P>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn baud(&self) -> u32 {
        self.lock().baud
    }

    pub fn selected(&self) -> Option<u8> {
        self.lock().selected
    }

    pub fn pending_tx(&self) -> usize {
        self.lock().tx.len()
    }

    /// Drain pending TX, then deliver every complete received line to the
    /// sockets open on this device. Returns the number of lines read.
    pub fn poll(&self, registry: &DeviceRegistry) -> usize {
        let mut line = [0u8; LINE_BUF_SIZE];
        let mut lines = 0;
        loop {
            let len = {
                let mut st = self.lock();
                // A failed drain is already logged; keep receiving.
                let _ = st.drain_tx();
                st.next_line(&mut line)
            };
            let Some(len) = len else {
                break;
            };
            lines += 1;
            registry.notify(&self.name, &line[..len]);
        }
        lines
    }
}

impl<P> Device for UartDevice<P>
where
    P: SerialPort + Send,
{
    fn open(&self, _registry: &DeviceRegistry, socket: SocketId) -> Result<(), DeviceError> {
        debug!("{}: socket {} attached", self.name, socket.index());
        Ok(())
    }

    fn ioctl(
        &self,
        _registry: &DeviceRegistry,
        _socket: SocketId,
        cmd: Ioctl,
    ) -> Result<u32, DeviceError> {
        let mut st = self.lock();
        match cmd {
            Ioctl::SetBaud(baud) => {
                st.port.set_baud(baud).map_err(|e| {
                    warn!("{}: set baud {} failed: {:?}", self.name, baud, e);
                    DeviceError::Io
                })?;
                st.baud = baud;
            }
            Ioctl::SetEol(eol) => st.lines.set_eol(eol),
            Ioctl::FilterAscii(on) => st.lines.set_ascii_only(on),
            Ioctl::SelectUart(index) => {
                st.port.select(index).map_err(|e| {
                    warn!("{}: select {} failed: {:?}", self.name, index, e);
                    DeviceError::Io
                })?;
                st.selected = Some(index);
            }
            Ioctl::CheckTx => {
                st.drain_tx()?;
                return Ok(st.tx.len() as u32);
            }
            Ioctl::FlushTxRx => {
                st.tx.clear();
                st.rx_pos = 0;
                st.rx_len = 0;
                st.lines.reset();
                st.port.discard().map_err(|e| {
                    warn!("{}: discard failed: {:?}", self.name, e);
                    DeviceError::Io
                })?;
            }
        }
        Ok(0)
    }

    fn write(
        &self,
        _registry: &DeviceRegistry,
        _socket: SocketId,
        data: &[u8],
    ) -> Result<usize, DeviceError> {
        let mut st = self.lock();
        st.drain_tx()?;
        let room = st.tx.capacity() - st.tx.len();
        let take = room.min(data.len());
        if take == 0 && !data.is_empty() {
            return Err(DeviceError::Busy);
        }
        // Cannot fail: `take` fits the remaining capacity.
        let _ = st.tx.extend_from_slice(&data[..take]);
        st.drain_tx()?;
        Ok(take)
    }

    fn close(&self, registry: &DeviceRegistry, socket: SocketId) {
        debug!(
            "{}: socket {} detached ({} open)",
            self.name,
            socket.index(),
            registry.count_open(&self.name).saturating_sub(1)
        );
    }
}
