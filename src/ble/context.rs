//! State owned by the BLE control machine, plus the link cell it shares
//! with its virtual device.
//!
//! Only the machine's own task mutates [`BleContext`]. The virtual device
//! runs on whatever task calls into the registry, so everything it needs
//! (is the link up, which real socket to use) lives in [`BleLink`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, warn};

use crate::config::BleConfig;
use crate::device::{DeviceRegistry, Ioctl, Notifier, Socket};
use crate::error::DeviceError;
use crate::ports::PowerSwitch;

// ---------------------------------------------------------------------------
// Upward notifications
// ---------------------------------------------------------------------------

/// Link status reported to the layer that owns the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommStatus {
    /// Module answered and is in serial mode.
    Ok { card_type: u32 },
    /// Module could not be reached; the controller is back in `Off`.
    Fail,
}

/// Called from the machine's task on every status change.
pub type CommCallback = Box<dyn FnMut(CommStatus) + Send>;

// ---------------------------------------------------------------------------
// Shared link cell
// ---------------------------------------------------------------------------

#[derive(Default)]
struct LinkState {
    running: bool,
    uart: Option<Socket>,
}

/// Real-UART socket and running flag, shared between the machine and its
/// virtual device.
#[derive(Default)]
pub struct BleLink {
    state: Mutex<LinkState>,
}

impl BleLink {
    fn lock(&self) -> MutexGuard<'_, LinkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether the module is in serial pass-through.
    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    /// Whether the real UART is currently open.
    pub fn has_uart(&self) -> bool {
        self.lock().uart.is_some()
    }

    pub(super) fn set_running(&self, running: bool) {
        self.lock().running = running;
    }

    pub(super) fn attach(&self, socket: Socket) -> Option<Socket> {
        self.lock().uart.replace(socket)
    }

    pub(super) fn detach(&self) -> Option<Socket> {
        self.lock().uart.take()
    }

    /// Run `f` on the real socket, whatever the machine state.
    pub(super) fn with_uart<R>(
        &self,
        f: impl FnOnce(&Socket) -> Result<R, DeviceError>,
    ) -> Result<R, DeviceError> {
        let st = self.lock();
        let uart = st.uart.as_ref().ok_or(DeviceError::NoDevice)?;
        f(uart)
    }

    /// Run `f` on the real socket only while in serial pass-through.
    pub(super) fn with_running_uart<R>(
        &self,
        f: impl FnOnce(&Socket) -> Result<R, DeviceError>,
    ) -> Result<R, DeviceError> {
        let st = self.lock();
        if !st.running {
            return Err(DeviceError::NotReady);
        }
        let uart = st.uart.as_ref().ok_or(DeviceError::NoDevice)?;
        f(uart)
    }
}

// ---------------------------------------------------------------------------
// BleContext
// ---------------------------------------------------------------------------

/// The context passed to every BLE state handler.
pub struct BleContext {
    pub(super) registry: Arc<DeviceRegistry>,
    pub(super) config: BleConfig,
    power: Option<Box<dyn PowerSwitch + Send>>,
    link: Arc<BleLink>,
    /// Sink given to the real UART socket; feeds lines back to the machine.
    rx_sink: Notifier,
    pub(super) card_type: Option<u32>,
    callback: CommCallback,
}

impl BleContext {
    pub(super) fn new(
        registry: Arc<DeviceRegistry>,
        config: BleConfig,
        power: Option<Box<dyn PowerSwitch + Send>>,
        link: Arc<BleLink>,
        rx_sink: Notifier,
        callback: CommCallback,
    ) -> Self {
        Self {
            registry,
            config,
            power,
            link,
            rx_sink,
            card_type: None,
            callback,
        }
    }

    /// Card type from the last identity reply or mode change.
    pub fn card_type(&self) -> Option<u32> {
        self.card_type
    }

    pub fn config(&self) -> &BleConfig {
        &self.config
    }

    pub fn link(&self) -> &Arc<BleLink> {
        &self.link
    }

    // ── Real UART ─────────────────────────────────────────────

    pub(super) fn open_uart(&mut self) -> bool {
        self.close_uart();
        match self
            .registry
            .open(&self.config.uart_device, self.rx_sink.clone())
        {
            Some(socket) => {
                self.link.attach(socket);
                true
            }
            None => false,
        }
    }

    pub(super) fn close_uart(&mut self) {
        if let Some(socket) = self.link.detach() {
            self.registry.close(socket);
        }
    }

    pub(super) fn uart_write(&self, data: &[u8]) {
        let registry = &self.registry;
        if let Err(e) = self.link.with_uart(|uart| registry.write(uart, data)) {
            warn!("BLE: write to {} failed: {}", self.config.uart_device, e);
        }
    }

    pub(super) fn uart_ioctl(&self, cmd: Ioctl) -> Option<u32> {
        let registry = &self.registry;
        match self.link.with_uart(|uart| registry.ioctl(uart, cmd)) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!("BLE: {:?} on {} failed: {}", cmd, self.config.uart_device, e);
                None
            }
        }
    }

    // ── Power, status, pass-through ───────────────────────────

    pub(super) fn power(&mut self, on: bool) {
        match self.power.as_mut() {
            Some(switch) => {
                debug!("BLE: power {}", if on { "ON" } else { "OFF" });
                switch.set_powered(on);
            }
            None => debug!("BLE: no power switch, always on"),
        }
    }

    pub(super) fn set_running(&self, running: bool) {
        self.link.set_running(running);
    }

    pub(super) fn report(&mut self, status: CommStatus) {
        (self.callback)(status);
    }

    /// Whether any consumer still holds a socket on the virtual device.
    pub(super) fn has_consumers(&self) -> bool {
        self.registry.count_open(&self.config.device_name) > 0
    }

    /// Hand a received line to every socket open on the virtual device.
    pub(super) fn forward(&self, line: &[u8]) {
        self.registry.notify(&self.config.device_name, line);
    }
}
