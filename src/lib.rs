//! Sensor node runtime library.
//!
//! Device registry with a shared socket pool, a table-driven FSM executor,
//! and the BLE UART controller built on both. Everything except the
//! ESP-IDF adapters compiles and runs on the host, so the logic is
//! exercised by the integration tests against mock ports.
//!
//! ESP-IDF-specific code is guarded by `#[cfg(target_os = "espidf")]`
//! inside each module.

#![deny(unused_must_use)]

pub mod adapters;
pub mod ble;
pub mod config;
pub mod device;
pub mod drivers;
pub mod error;
pub mod fsm;
pub mod managers;
pub mod pins;
pub mod ports;
