//! Sensor node firmware main entry point.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  EspUartPort     ActiveLowPin    MonotonicClock   LogLineSink  │
//! │  (SerialPort)    (PowerSwitch)   (Clock)          (LineSink)   │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │  DeviceRegistry: "uart1" (UartDevice)                  │    │
//! │  │                  "bleuart" (BleUartDevice)             │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  FSM runner thread (BLE control) · UART poll loop (main)       │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use esp_idf_hal::gpio::{AnyIOPin, OutputPin, PinDriver};
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_hal::uart::{UartDriver, config::Config as UartConfig};
use esp_idf_hal::units::Hertz;
use log::{info, warn};

use sensornode::adapters::hardware::ActiveLowPin;
use sensornode::adapters::log_sink::LogLineSink;
use sensornode::adapters::time::MonotonicClock;
use sensornode::adapters::uart::EspUartPort;
use sensornode::ble::{self, CommStatus};
use sensornode::config::NodeConfig;
use sensornode::device::DeviceRegistry;
use sensornode::drivers::task_pin::Core;
use sensornode::drivers::uart::UartDevice;
use sensornode::error::Error;
use sensornode::fsm::runner::{self, Machine};
use sensornode::ports::PowerSwitch;

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  SensorNode v{}                      ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    let config = NodeConfig::stock();
    config.validate().map_err(Error::from)?;

    // ── 2. Peripherals ────────────────────────────────────────
    // UART1 TX gpio17 / RX gpio18, mux select gpio16.
    let peripherals = Peripherals::take()?;
    let uart_config = UartConfig::default().baudrate(Hertz(config.ble.baud_rate));
    let uart = UartDriver::new(
        peripherals.uart1,
        peripherals.pins.gpio17,
        peripherals.pins.gpio18,
        Option::<AnyIOPin>::None,
        Option::<AnyIOPin>::None,
        &uart_config,
    )
    .context("UART1 init")?;
    let mux = PinDriver::output(peripherals.pins.gpio16.downgrade_output())
        .context("UART mux select pin")?;
    // `validate` only lets the wired power pin through.
    let ble_power: Option<Box<dyn PowerSwitch + Send>> = match config.ble.power_gpio {
        Some(gpio) => {
            info!("BLE power switch on GPIO{}", gpio);
            let pin = PinDriver::output(peripherals.pins.gpio21).context("BLE power pin")?;
            Some(Box::new(ActiveLowPin::new(pin)))
        }
        None => {
            info!("BLE module has no power switch");
            None
        }
    };

    // ── 3. Devices ────────────────────────────────────────────
    let registry = Arc::new(DeviceRegistry::new());
    let uart1 = Arc::new(UartDevice::new(
        config.ble.uart_device.clone(),
        EspUartPort::new(uart, Some(mux)),
        config.ble.baud_rate,
    ));
    registry.register(&config.ble.uart_device, uart1.clone());

    // ── 4. BLE control ────────────────────────────────────────
    let ble = ble::create(
        &registry,
        config.ble.clone(),
        ble_power,
        Box::new(|status| match status {
            CommStatus::Ok { card_type } => info!("BLE link up (card type {})", card_type),
            CommStatus::Fail => warn!("BLE link failed"),
        }),
        MonotonicClock::new(),
    )?;
    let machines: Vec<Box<dyn Machine>> = vec![Box::new(ble)];
    let _fsm = runner::spawn("fsm\0", Core::App, machines)?;

    // Diagnostic consumer: keeps the link up and logs what the peer sends.
    let _console = registry
        .open(&config.ble.device_name, Arc::new(LogLineSink::new("ble")))
        .with_context(|| format!("open {}", config.ble.device_name))?;

    info!("System ready. Entering UART poll loop.");

    // ── 5. Receive loop ───────────────────────────────────────
    let period = Duration::from_millis(u64::from(config.uart_poll_ms));
    loop {
        uart1.poll(&registry);
        std::thread::sleep(period);
    }
}
