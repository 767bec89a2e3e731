//! Socket-style device layer.
//!
//! Peripherals register once as named [`Device`]s. Consumers open
//! [`Socket`]s on them by name and talk through a uniform
//! open / ioctl / write / close contract. Several sockets may share one
//! device; the device decides what sharing means.
//!
//! ```text
//!   consumer A ──┐                        ┌──▶ "uart1"   (UartDevice)
//!   consumer B ──┼──▶ DeviceRegistry ─────┤
//!   BLE FSM    ──┘    socket pool [N]     └──▶ "bleuart" (BleUartDevice)
//!                          │
//!                          └── per-socket LineSink (received lines)
//! ```
//!
//! Received data flows the other way: a device hands complete lines to
//! the [`LineSink`] registered with each socket bound to it.

pub mod registry;

use std::sync::Arc;

pub use registry::DeviceRegistry;

use crate::error::DeviceError;

// ---------------------------------------------------------------------------
// Socket identity
// ---------------------------------------------------------------------------

/// Index of a slot in the socket pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SocketId(u8);

impl SocketId {
    pub(crate) const fn new(index: usize) -> Self {
        Self(index as u8)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// An open socket. Not `Clone`: closing consumes it, so a closed handle
/// cannot be used again.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "an open socket holds a pool slot until it is closed"]
pub struct Socket {
    id: SocketId,
}

impl Socket {
    pub(crate) const fn new(id: SocketId) -> Self {
        Self { id }
    }

    pub const fn id(&self) -> SocketId {
        self.id
    }
}

// ---------------------------------------------------------------------------
// Control commands
// ---------------------------------------------------------------------------

/// Device control requests. Devices reject what they do not implement
/// with [`DeviceError::Unsupported`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ioctl {
    SetBaud(u32),
    /// Byte that terminates a received line.
    SetEol(u8),
    /// Keep only printable ASCII in received lines.
    FilterAscii(bool),
    /// Route the peripheral to a multiplexer input.
    SelectUart(u8),
    /// Returns the number of bytes still waiting to be transmitted.
    CheckTx,
    /// Drop pending transmit data and any partial received line.
    FlushTxRx,
}

// ---------------------------------------------------------------------------
// Notification sink
// ---------------------------------------------------------------------------

/// Receiver of complete lines for one socket.
///
/// `line` points into the device's reusable line buffer and is only valid
/// for the duration of the call. Copy it if it must outlive the callback.
pub trait LineSink: Send + Sync {
    fn on_line(&self, socket: SocketId, line: &[u8]);
}

impl<F> LineSink for F
where
    F: Fn(SocketId, &[u8]) + Send + Sync,
{
    fn on_line(&self, socket: SocketId, line: &[u8]) {
        self(socket, line);
    }
}

/// Shared handle to a socket's line sink.
pub type Notifier = Arc<dyn LineSink>;

/// Sink that drops everything, for write-only consumers.
pub struct NullSink;

impl LineSink for NullSink {
    fn on_line(&self, _socket: SocketId, _line: &[u8]) {}
}

// ---------------------------------------------------------------------------
// Device contract
// ---------------------------------------------------------------------------

/// A registrable device.
///
/// The registry never holds its lock while calling into a device, so a
/// device may call back into the registry (count its sockets, deliver
/// lines, open other devices) from any of these methods.
pub trait Device: Send + Sync {
    /// A socket has just been bound to this device. Returning an error
    /// makes the registry release the slot and fail the open.
    fn open(&self, registry: &DeviceRegistry, socket: SocketId) -> Result<(), DeviceError> {
        let _ = (registry, socket);
        Ok(())
    }

    fn ioctl(
        &self,
        registry: &DeviceRegistry,
        socket: SocketId,
        cmd: Ioctl,
    ) -> Result<u32, DeviceError> {
        let _ = (registry, socket, cmd);
        Err(DeviceError::Unsupported)
    }

    /// Returns the number of bytes accepted.
    fn write(
        &self,
        registry: &DeviceRegistry,
        socket: SocketId,
        data: &[u8],
    ) -> Result<usize, DeviceError>;

    /// The socket is being closed. It still counts as open while this runs;
    /// the slot is released right after.
    fn close(&self, registry: &DeviceRegistry, socket: SocketId) {
        let _ = (registry, socket);
    }
}
