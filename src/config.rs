//! System configuration parameters
//!
//! Compile-time capacities for the fixed tables, plus the tunable
//! parameters of the BLE UART link. Tunables can be overridden from a
//! stored JSON or postcard blob.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::pins;

// ---------------------------------------------------------------------------
// Capacities
// ---------------------------------------------------------------------------

/// Maximum number of devices in the registry.
pub const MAX_DEVICES: usize = 8;
/// Socket pool size, shared by all devices.
pub const MAX_SOCKETS: usize = 8;
/// Longest device name accepted by the registry (bytes).
pub const MAX_DEVICE_NAME: usize = 16;
/// Line assembly buffer (bytes, excluding the EOL byte).
pub const LINE_BUF_SIZE: usize = 128;
/// Pending transmit buffer of a UART device (bytes).
pub const TX_BUF_SIZE: usize = 256;
/// Per-instance FSM event queue depth.
pub const EVENT_QUEUE_DEPTH: usize = 8;

// ---------------------------------------------------------------------------
// BLE UART link
// ---------------------------------------------------------------------------

/// BLE module sequencing parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BleConfig {
    /// Name of the virtual device the controller registers.
    pub device_name: String,
    /// Name of the real UART device the module is wired to.
    pub uart_device: String,
    /// Baud rate applied to the UART once the module is powered.
    pub baud_rate: u32,
    /// GPIO driving the module's active-low power switch, or `None` for a
    /// module that is always powered. Only [`pins::BLE_POWER_GPIO`] is wired.
    pub power_gpio: Option<i32>,
    /// UART multiplexer input to select, if the board has one.
    pub uart_select: Option<u8>,
    /// Line terminator used by the module.
    pub eol: u8,
    /// Card type reported by a module already in serial mode.
    pub serial_card_type: u32,

    // --- Timing ---
    /// Settle time after power-on before the UART is configured (ms).
    pub power_on_ms: u32,
    /// Time allowed for the identity reply (ms).
    pub identity_timeout_ms: u32,
    /// Time allowed for the mode-set acknowledgement (ms).
    pub type_set_ms: u32,
    /// Drain period before the link is torn down (ms).
    pub drain_ms: u32,
}

impl Default for BleConfig {
    fn default() -> Self {
        Self {
            device_name: "bleuart".into(),
            uart_device: "uart1".into(),
            baud_rate: 115_200,
            power_gpio: Some(pins::BLE_POWER_GPIO),
            uart_select: Some(pins::BLE_UART_SELECT),
            eol: b'\n',
            serial_card_type: 1,

            power_on_ms: 500,
            identity_timeout_ms: 1000,
            type_set_ms: 500,
            drain_ms: 500,
        }
    }
}

impl BleConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_name(&self.device_name)?;
        validate_name(&self.uart_device)?;
        if self.device_name == self.uart_device {
            return Err(ConfigError::NameClash);
        }
        if self.baud_rate == 0 {
            return Err(ConfigError::ZeroBaud);
        }
        if self.power_gpio.is_some_and(|gpio| gpio != pins::BLE_POWER_GPIO) {
            return Err(ConfigError::UnwiredPin);
        }
        if [
            self.power_on_ms,
            self.identity_timeout_ms,
            self.type_set_ms,
            self.drain_ms,
        ]
        .contains(&0)
        {
            return Err(ConfigError::ZeroTiming);
        }
        Ok(())
    }
}

/// Check a device name against the registry's naming rules.
pub fn validate_name(name: &str) -> Result<(), ConfigError> {
    if name.is_empty() {
        return Err(ConfigError::EmptyName);
    }
    if name.len() > MAX_DEVICE_NAME {
        return Err(ConfigError::NameTooLong);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Node configuration
// ---------------------------------------------------------------------------

/// Core node configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub ble: BleConfig,
    /// How often the UART receive path is polled (ms).
    pub uart_poll_ms: u32,
}

impl NodeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.uart_poll_ms == 0 {
            return Err(ConfigError::ZeroTiming);
        }
        self.ble.validate()
    }

    /// Default configuration with the stock poll interval.
    pub fn stock() -> Self {
        Self {
            ble: BleConfig::default(),
            uart_poll_ms: 10,
        }
    }

    /// Decode and validate a stored postcard blob.
    pub fn from_blob(bytes: &[u8]) -> Result<Self, ConfigError> {
        let config: Self = postcard::from_bytes(bytes).map_err(|_| ConfigError::Corrupted)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_blob(&self) -> Result<Vec<u8>, ConfigError> {
        postcard::to_allocvec(self).map_err(|_| ConfigError::Corrupted)
    }

    /// Parse and validate a JSON override. Missing fields are an error.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text).map_err(|_| ConfigError::Corrupted)?;
        config.validate()?;
        Ok(config)
    }
}
