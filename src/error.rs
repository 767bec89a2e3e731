//! Unified error types for the sensor node runtime.
//!
//! A single `Error` enum that every subsystem converts into. All variants
//! are `Copy` so they can travel through device trampolines and FSM
//! handlers without allocation.
//!
//! Configuration mistakes that are fixed at build time (duplicate device
//! names, a device table sized too small) are not represented here: they
//! panic at registration, before any task is started.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the runtime funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A socket or device operation failed.
    Device(DeviceError),
    /// Configuration is invalid.
    Config(ConfigError),
    /// Peripheral initialisation failed.
    Init(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device(e) => write!(f, "device: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Device / socket errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError {
    /// No device is bound to the socket, or the backing link is gone.
    NoDevice,
    /// The device exists but is not in a state that accepts the request.
    NotReady,
    /// The device does not implement this control command.
    Unsupported,
    /// The device refused the request because a resource is in use or full.
    Busy,
    /// The underlying peripheral reported an I/O failure.
    Io,
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoDevice => write!(f, "no device"),
            Self::NotReady => write!(f, "device not ready"),
            Self::Unsupported => write!(f, "unsupported request"),
            Self::Busy => write!(f, "device busy"),
            Self::Io => write!(f, "I/O failure"),
        }
    }
}

impl From<DeviceError> for Error {
    fn from(e: DeviceError) -> Self {
        Self::Device(e)
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// A device name is empty.
    EmptyName,
    /// A device name does not fit the registry's fixed name buffer.
    NameTooLong,
    /// Two roles were given the same device name.
    NameClash,
    /// Baud rate of zero.
    ZeroBaud,
    /// A protocol timeout of zero milliseconds.
    ZeroTiming,
    /// A device with this name is already registered.
    AlreadyRegistered,
    /// A stored or pushed configuration could not be decoded.
    Corrupted,
    /// A pin the board does not wire to that function.
    UnwiredPin,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyName => write!(f, "empty device name"),
            Self::NameTooLong => write!(f, "device name too long"),
            Self::NameClash => write!(f, "device names must differ"),
            Self::ZeroBaud => write!(f, "baud rate must be non-zero"),
            Self::ZeroTiming => write!(f, "timeouts must be non-zero"),
            Self::AlreadyRegistered => write!(f, "device already registered"),
            Self::Corrupted => write!(f, "configuration could not be decoded"),
            Self::UnwiredPin => write!(f, "pin is not wired to that function on this board"),
        }
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Runtime-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
