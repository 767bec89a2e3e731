//! GPIO / peripheral pin assignments for the sensor node main board.
//!
//! The default configuration and its validation refer to these numbers.
//! UART1 itself sits on GPIO17 (TX) / GPIO18 (RX) with the multiplexer
//! select on GPIO16; those are fixed by `main` when the drivers are built.

// ---------------------------------------------------------------------------
// BLE module (serial-mode radio on UART1)
// ---------------------------------------------------------------------------

/// Digital output: module power switch (active LOW, LOW = powered).
pub const BLE_POWER_GPIO: i32 = 21;
/// Input of the UART multiplexer wired to the BLE module.
pub const BLE_UART_SELECT: u8 = 1;
