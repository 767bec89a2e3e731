//! Port traits: the boundary between runtime logic and the hardware.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ drivers / FSMs (pure logic)
//! ```
//!
//! Concrete adapters (ESP-IDF UART, GPIO, esp_timer) implement these
//! traits. Drivers and state machines consume them via generics or trait
//! objects, so the same logic runs against mocks on the host.

use core::fmt;

// ───────────────────────────────────────────────────────────────
// Clock port
// ───────────────────────────────────────────────────────────────

/// Monotonic millisecond time source used for FSM timers.
pub trait Clock {
    /// Milliseconds since an arbitrary fixed origin. Never decreases.
    fn now_ms(&self) -> u64;
}

// ───────────────────────────────────────────────────────────────
// Serial port (byte-oriented peripheral under a UART device)
// ───────────────────────────────────────────────────────────────

/// Byte-oriented serial peripheral.
pub trait SerialPort {
    /// Error type for this port.
    type Error: fmt::Debug;

    /// Read up to `buf.len()` bytes into `buf`.
    /// Returns 0 if no data is available (non-blocking).
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// Write as much of `data` as the hardware FIFO accepts.
    /// Returns the number of bytes actually taken.
    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error>;

    /// Change the line rate.
    fn set_baud(&mut self, baud: u32) -> Result<(), Self::Error>;

    /// Drop anything sitting in the hardware RX and TX FIFOs.
    fn discard(&mut self) -> Result<(), Self::Error>;

    /// Route the port to input `index` of a board multiplexer.
    /// Ports without a multiplexer accept any index.
    fn select(&mut self, index: u8) -> Result<(), Self::Error> {
        let _ = index;
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// Power switch port
// ───────────────────────────────────────────────────────────────

/// On/off power control for a peripheral module.
pub trait PowerSwitch {
    fn set_powered(&mut self, on: bool);
}
