//! BLE UART control. Sequences a serial-mode Bluetooth module.
//!
//! The controller is both a client and a provider of the device layer:
//!
//! ```text
//!   consumers ──open("bleuart")──▶ BleUartDevice ──TurnOn/TurnOff──▶ BLE FSM
//!                                      │   ▲                           │
//!                     write/ioctl ─────┘   └──── forwarded lines ──────┤
//!                         │                                            │
//!                         ▼                                            ▼
//!                    BleLink (running + real socket) ◀──── open("uart1"), AT commands
//! ```
//!
//! Opening the virtual device powers the module up and walks it through
//! identity check and mode set. Closing the last virtual socket drains
//! and powers it down. In `SerialRunning`, writes pass straight through
//! to the real UART and received lines are forwarded to every consumer.

pub mod context;
pub mod states;

use std::sync::Arc;

use log::{debug, warn};

pub use context::{BleContext, BleLink, CommCallback, CommStatus};

use crate::config::{BleConfig, LINE_BUF_SIZE};
use crate::device::{Device, DeviceRegistry, Ioctl, LineSink, Notifier, SocketId};
use crate::error::{ConfigError, DeviceError, Result};
use crate::fsm::{FsmHandle, StateMachine};
use crate::ports::{Clock, PowerSwitch};

/// Identity query. The reply is the card type as a bare integer.
pub const CMD_WHO: &[u8] = b"AT+WHO\r\n";
/// Switch the module to serial mode. The mode-set code differs from the
/// card type the module then reports.
pub const CMD_TYPE_SERIAL: &[u8] = b"AT+TYPE=2\r\n";

/// Queue slots module replies must leave free for `TurnOn`/`TurnOff`.
pub const CONTROL_HEADROOM: usize = 2;

// ---------------------------------------------------------------------------
// States and events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BleState {
    Off,
    WaitPowerOn,
    Starting,
    WaitTypeSerial,
    SerialRunning,
    StoppingComm,
}

/// A received line, copied out of the UART's reused buffer.
pub type Line = heapless::Vec<u8, LINE_BUF_SIZE>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BleEvent {
    TurnOn,
    TurnOff,
    /// The real UART could not be opened.
    UartFailed,
    /// A trimmed, non-empty line from the module.
    Line(Line),
}

/// What a module line means to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply<'a> {
    /// `OK` or `READY`.
    Ok,
    /// Anything starting with `ERROR`.
    Error,
    /// An unsigned decimal, e.g. the identity reply.
    Int(u32),
    /// Anything else: peer data.
    Data(&'a [u8]),
}

impl<'a> Reply<'a> {
    /// Classify a line. Returns `None` for blank lines.
    pub fn classify(line: &'a [u8]) -> Option<Self> {
        let line = line.trim_ascii();
        if line.is_empty() {
            return None;
        }
        if line == b"OK" || line == b"READY" {
            return Some(Self::Ok);
        }
        if line.starts_with(b"ERROR") {
            return Some(Self::Error);
        }
        if line.iter().all(u8::is_ascii_digit) {
            if let Some(n) = core::str::from_utf8(line)
                .ok()
                .and_then(|s| s.parse().ok())
            {
                return Some(Self::Int(n));
            }
        }
        Some(Self::Data(line))
    }
}

// ---------------------------------------------------------------------------
// Real-UART line sink → consumers or machine events
// ---------------------------------------------------------------------------

/// Sink on the real UART socket.
///
/// In pass-through, peer data goes straight to the virtual device's
/// sockets and status chatter is dropped, so a burst of data never
/// touches the machine's queue. Before that, lines are module replies
/// and are queued for the machine, leaving [`CONTROL_HEADROOM`] free.
struct BleRxSink {
    handle: FsmHandle<BleEvent>,
    registry: Arc<DeviceRegistry>,
    device_name: String,
    link: Arc<BleLink>,
}

impl LineSink for BleRxSink {
    fn on_line(&self, _socket: SocketId, line: &[u8]) {
        let line = line.trim_ascii();
        if line.is_empty() {
            return;
        }
        if self.link.is_running() {
            if let Some(Reply::Int(_) | Reply::Data(_)) = Reply::classify(line) {
                self.registry.notify(&self.device_name, line);
            }
            return;
        }
        match Line::from_slice(line) {
            Ok(copy) => {
                if !self.handle.offer_event(BleEvent::Line(copy), CONTROL_HEADROOM) {
                    warn!("BLE: event queue busy, reply '{}' dropped", line.escape_ascii());
                }
            }
            Err(()) => warn!("BLE: {}-byte line does not fit, dropped", line.len()),
        }
    }
}

// ---------------------------------------------------------------------------
// Virtual device
// ---------------------------------------------------------------------------

/// The device consumers open to use the BLE link.
pub struct BleUartDevice {
    name: String,
    handle: FsmHandle<BleEvent>,
    link: Arc<BleLink>,
}

impl Device for BleUartDevice {
    fn open(&self, _registry: &DeviceRegistry, socket: SocketId) -> core::result::Result<(), DeviceError> {
        debug!("{}: socket {} opened, requesting link", self.name, socket.index());
        // Already-running machines ignore the extra TurnOn.
        if self.handle.send_event(BleEvent::TurnOn) {
            Ok(())
        } else {
            Err(DeviceError::Busy)
        }
    }

    /// Only queue-level requests reach the real UART; line settings belong
    /// to the module link, not to consumers.
    fn ioctl(
        &self,
        registry: &DeviceRegistry,
        _socket: SocketId,
        cmd: Ioctl,
    ) -> core::result::Result<u32, DeviceError> {
        match cmd {
            Ioctl::CheckTx | Ioctl::FlushTxRx => self
                .link
                .with_running_uart(|uart| registry.ioctl(uart, cmd)),
            Ioctl::SetBaud(_) | Ioctl::SetEol(_) | Ioctl::FilterAscii(_) | Ioctl::SelectUart(_) => {
                Err(DeviceError::Unsupported)
            }
        }
    }

    fn write(
        &self,
        registry: &DeviceRegistry,
        _socket: SocketId,
        data: &[u8],
    ) -> core::result::Result<usize, DeviceError> {
        self.link
            .with_running_uart(|uart| registry.write(uart, data))
    }

    fn close(&self, registry: &DeviceRegistry, socket: SocketId) {
        // This socket still counts, so 1 means it is the last one.
        if registry.count_open(&self.name) <= 1 {
            debug!("{}: last socket {} closed, releasing link", self.name, socket.index());
            self.handle.send_event(BleEvent::TurnOff);
        }
    }
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

/// The BLE control machine.
pub type BleMachine<K> = StateMachine<BleState, BleEvent, BleContext, K>;

/// Build the controller, start it in `Off` (power line off), and register
/// its virtual device under `config.device_name`.
///
/// The returned machine must then be driven, either by
/// [`run_pending`](StateMachine::run_pending) or by the runner.
pub fn create<K: Clock>(
    registry: &Arc<DeviceRegistry>,
    config: BleConfig,
    power: Option<Box<dyn PowerSwitch + Send>>,
    callback: CommCallback,
    clock: K,
) -> Result<BleMachine<K>> {
    config.validate()?;
    if registry.contains(&config.device_name) {
        return Err(ConfigError::AlreadyRegistered.into());
    }

    let handle = FsmHandle::new("bleuart");
    let link = Arc::new(BleLink::default());
    let rx_sink: Notifier = Arc::new(BleRxSink {
        handle: handle.clone(),
        registry: registry.clone(),
        device_name: config.device_name.clone(),
        link: link.clone(),
    });
    let device = Arc::new(BleUartDevice {
        name: config.device_name.clone(),
        handle: handle.clone(),
        link: link.clone(),
    });
    let name = config.device_name.clone();

    let context = BleContext::new(registry.clone(), config, power, link, rx_sink, callback);
    let mut machine = StateMachine::new(handle, &states::STATE_TABLE, BleState::Off, context, clock);
    machine.start();

    registry.register(&name, device);
    Ok(machine)
}
