//! Named device table plus a fixed socket pool.
//!
//! Both tables live behind one critical-section mutex. Every public
//! operation takes the lock only long enough to read or update a table
//! entry; device callbacks and line sinks always run with the lock
//! released.

use core::cell::RefCell;
use std::sync::Arc;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use log::{debug, warn};

use super::{Device, Ioctl, Notifier, Socket, SocketId};
use crate::config::{MAX_DEVICE_NAME, MAX_DEVICES, MAX_SOCKETS};
use crate::error::DeviceError;

type DeviceName = heapless::String<MAX_DEVICE_NAME>;

struct DeviceEntry {
    name: DeviceName,
    device: Arc<dyn Device>,
}

/// An in-use pool slot. Free slots are `None`.
struct SocketSlot {
    device: usize,
    notifier: Notifier,
}

struct Tables {
    devices: heapless::Vec<DeviceEntry, MAX_DEVICES>,
    sockets: [Option<SocketSlot>; MAX_SOCKETS],
}

impl Tables {
    fn find(&self, name: &str) -> Option<usize> {
        self.devices.iter().position(|d| d.name.as_str() == name)
    }

    fn bound(&self, socket: SocketId) -> Option<&SocketSlot> {
        self.sockets.get(socket.index()).and_then(Option::as_ref)
    }

    fn sockets_on(&self, device: usize) -> impl Iterator<Item = (SocketId, &SocketSlot)> {
        self.sockets.iter().enumerate().filter_map(move |(i, s)| match s {
            Some(slot) if slot.device == device => Some((SocketId::new(i), slot)),
            _ => None,
        })
    }
}

enum OpenFailure {
    UnknownDevice,
    PoolExhausted,
}

enum RegisterFailure {
    Duplicate,
    TableFull,
}

/// Device registry and socket pool.
pub struct DeviceRegistry {
    tables: Mutex<CriticalSectionRawMutex, RefCell<Tables>>,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(RefCell::new(Tables {
                devices: heapless::Vec::new(),
                sockets: core::array::from_fn(|_| None),
            })),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut Tables) -> R) -> R {
        self.tables.lock(|t| f(&mut t.borrow_mut()))
    }

    // ── Registration ──────────────────────────────────────────

    /// Register `device` under `name`.
    ///
    /// # Panics
    ///
    /// On an empty or over-long name, a name that is already taken, or a
    /// full device table. These are build-time configuration mistakes.
    pub fn register(&self, name: &str, device: Arc<dyn Device>) {
        let mut key = DeviceName::new();
        assert!(!name.is_empty(), "device registry: empty device name");
        assert!(
            key.push_str(name).is_ok(),
            "device registry: name '{name}' exceeds {MAX_DEVICE_NAME} bytes"
        );

        let outcome = self.with(|t| {
            if t.find(name).is_some() {
                return Err(RegisterFailure::Duplicate);
            }
            t.devices
                .push(DeviceEntry { name: key, device })
                .map_err(|_| RegisterFailure::TableFull)
        });

        match outcome {
            Ok(()) => debug!("device registry: registered '{}'", name),
            Err(RegisterFailure::Duplicate) => {
                panic!("device registry: '{name}' is already registered")
            }
            Err(RegisterFailure::TableFull) => {
                panic!("device registry: table full ({MAX_DEVICES} devices), cannot add '{name}'")
            }
        }
    }

    /// Whether a device called `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.with(|t| t.find(name).is_some())
    }

    // ── Socket lifecycle ──────────────────────────────────────

    /// Open a socket on device `name`, delivering received lines to
    /// `notifier`.
    ///
    /// Returns `None` for an unknown device, an exhausted pool, or when
    /// the device rejects the open. No slot stays allocated on failure.
    pub fn open(&self, name: &str, notifier: Notifier) -> Option<Socket> {
        let claimed = self.with(|t| {
            let device = t.find(name).ok_or(OpenFailure::UnknownDevice)?;
            let index = t
                .sockets
                .iter()
                .position(Option::is_none)
                .ok_or(OpenFailure::PoolExhausted)?;
            t.sockets[index] = Some(SocketSlot { device, notifier });
            Ok((SocketId::new(index), t.devices[device].device.clone()))
        });

        let (id, device) = match claimed {
            Ok(c) => c,
            Err(OpenFailure::UnknownDevice) => {
                warn!("device registry: open of unknown device '{}'", name);
                return None;
            }
            Err(OpenFailure::PoolExhausted) => {
                warn!(
                    "device registry: socket pool exhausted ({} in use), open of '{}' refused",
                    MAX_SOCKETS, name
                );
                return None;
            }
        };

        if let Err(e) = device.open(self, id) {
            warn!("device registry: '{}' rejected open: {}", name, e);
            self.release(id);
            return None;
        }

        debug!("device registry: socket {} open on '{}'", id.index(), name);
        Some(Socket::new(id))
    }

    pub fn ioctl(&self, socket: &Socket, cmd: Ioctl) -> Result<u32, DeviceError> {
        let device = self.device_of(socket.id()).ok_or(DeviceError::NoDevice)?;
        device.ioctl(self, socket.id(), cmd)
    }

    pub fn write(&self, socket: &Socket, data: &[u8]) -> Result<usize, DeviceError> {
        let device = self.device_of(socket.id()).ok_or(DeviceError::NoDevice)?;
        device.write(self, socket.id(), data)
    }

    /// Close `socket`. The device sees the close while the socket still
    /// counts as open; the slot is released afterwards in every case.
    pub fn close(&self, socket: Socket) {
        let id = socket.id();
        if let Some(device) = self.device_of(id) {
            device.close(self, id);
        }
        self.release(id);
        debug!("device registry: socket {} closed", id.index());
    }

    fn device_of(&self, socket: SocketId) -> Option<Arc<dyn Device>> {
        self.with(|t| {
            let slot = t.bound(socket)?;
            Some(t.devices[slot.device].device.clone())
        })
    }

    fn release(&self, socket: SocketId) {
        self.with(|t| {
            if let Some(slot) = t.sockets.get_mut(socket.index()) {
                *slot = None;
            }
        });
    }

    // ── Queries ───────────────────────────────────────────────

    /// Number of open sockets bound to `name` (0 for unknown devices).
    pub fn count_open(&self, name: &str) -> usize {
        self.with(|t| t.find(name).map_or(0, |d| t.sockets_on(d).count()))
    }

    /// Fill `out` with the ids of sockets open on `name`, in pool order.
    /// Stops when `out` is full. Returns the number written.
    pub fn open_sockets(&self, name: &str, out: &mut [SocketId]) -> usize {
        self.with(|t| {
            let Some(device) = t.find(name) else {
                return 0;
            };
            let mut written = 0;
            for ((id, _), dst) in t.sockets_on(device).zip(out.iter_mut()) {
                *dst = id;
                written += 1;
            }
            written
        })
    }

    /// Number of free pool slots.
    pub fn free_sockets(&self) -> usize {
        self.with(|t| t.sockets.iter().filter(|s| s.is_none()).count())
    }

    // ── Delivery ──────────────────────────────────────────────

    /// Hand `line` to the sink of every socket open on `name`.
    /// Returns how many sinks were called.
    pub fn notify(&self, name: &str, line: &[u8]) -> usize {
        let sinks = self.with(|t| {
            let mut sinks: heapless::Vec<(SocketId, Notifier), MAX_SOCKETS> = heapless::Vec::new();
            if let Some(device) = t.find(name) {
                for (id, slot) in t.sockets_on(device) {
                    // Cannot overflow: at most MAX_SOCKETS slots exist.
                    let _ = sinks.push((id, slot.notifier.clone()));
                }
            }
            sinks
        });

        for (id, sink) in &sinks {
            sink.on_line(*id, line);
        }
        sinks.len()
    }

    /// Hand `line` to a single socket's sink. Returns `false` if the
    /// socket is not open.
    pub fn notify_socket(&self, socket: SocketId, line: &[u8]) -> bool {
        let sink = self.with(|t| t.bound(socket).map(|s| s.notifier.clone()));
        match sink {
            Some(sink) => {
                sink.on_line(socket, line);
                true
            }
            None => false,
        }
    }
}
