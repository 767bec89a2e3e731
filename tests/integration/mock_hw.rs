//! Mock hardware for integration tests.
//!
//! Records every port call so tests can assert on the full history
//! without a real UART, GPIO or BLE module attached. All mocks are
//! cheap clones over shared state: hand one to the code under test and
//! keep another to inspect it.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};

use sensornode::adapters::time::ManualClock;
use sensornode::ble::{self, BleMachine, CommCallback, CommStatus};
use sensornode::config::BleConfig;
use sensornode::device::{DeviceRegistry, LineSink, Notifier, SocketId};
use sensornode::drivers::uart::UartDevice;
use sensornode::ports::{PowerSwitch, SerialPort};

// ── Serial port ───────────────────────────────────────────────

#[derive(Default)]
struct SerialLog {
    rx: VecDeque<u8>,
    tx: Vec<u8>,
    bauds: Vec<u32>,
    selects: Vec<u8>,
    discards: usize,
    /// Bytes the TX FIFO still accepts; `None` means unlimited.
    tx_room: Option<usize>,
}

/// Serial port with scripted RX and captured TX.
#[derive(Clone, Default)]
pub struct MockSerial {
    log: Arc<Mutex<SerialLog>>,
}

#[allow(dead_code)]
impl MockSerial {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes for the device to read.
    pub fn inject(&self, bytes: &[u8]) {
        self.log.lock().unwrap().rx.extend(bytes.iter().copied());
    }

    pub fn tx(&self) -> Vec<u8> {
        self.log.lock().unwrap().tx.clone()
    }

    pub fn tx_text(&self) -> String {
        String::from_utf8_lossy(&self.tx()).into_owned()
    }

    pub fn clear_tx(&self) {
        self.log.lock().unwrap().tx.clear();
    }

    pub fn bauds(&self) -> Vec<u32> {
        self.log.lock().unwrap().bauds.clone()
    }

    pub fn selects(&self) -> Vec<u8> {
        self.log.lock().unwrap().selects.clone()
    }

    pub fn discards(&self) -> usize {
        self.log.lock().unwrap().discards
    }

    pub fn rx_pending(&self) -> usize {
        self.log.lock().unwrap().rx.len()
    }

    /// Limit how many more bytes the TX FIFO takes (`None` = unlimited).
    pub fn set_tx_room(&self, room: Option<usize>) {
        self.log.lock().unwrap().tx_room = room;
    }
}

impl SerialPort for MockSerial {
    type Error = Infallible;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Infallible> {
        let mut log = self.log.lock().unwrap();
        let n = buf.len().min(log.rx.len());
        for (dst, src) in buf.iter_mut().zip(log.rx.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, Infallible> {
        let mut log = self.log.lock().unwrap();
        let n = log.tx_room.map_or(data.len(), |room| room.min(data.len()));
        if let Some(room) = log.tx_room.as_mut() {
            *room -= n;
        }
        log.tx.extend_from_slice(&data[..n]);
        Ok(n)
    }

    fn set_baud(&mut self, baud: u32) -> Result<(), Infallible> {
        self.log.lock().unwrap().bauds.push(baud);
        Ok(())
    }

    fn discard(&mut self) -> Result<(), Infallible> {
        let mut log = self.log.lock().unwrap();
        log.rx.clear();
        log.discards += 1;
        Ok(())
    }

    fn select(&mut self, index: u8) -> Result<(), Infallible> {
        self.log.lock().unwrap().selects.push(index);
        Ok(())
    }
}

// ── Power switch ──────────────────────────────────────────────

/// Power switch that records every level it is driven to.
#[derive(Clone, Default)]
pub struct RecordingPower {
    levels: Arc<Mutex<Vec<bool>>>,
}

#[allow(dead_code)]
impl RecordingPower {
    pub fn levels(&self) -> Vec<bool> {
        self.levels.lock().unwrap().clone()
    }

    pub fn is_on(&self) -> bool {
        self.levels().last().copied().unwrap_or(false)
    }

    pub fn ever_on(&self) -> bool {
        self.levels().contains(&true)
    }
}

impl PowerSwitch for RecordingPower {
    fn set_powered(&mut self, on: bool) {
        self.levels.lock().unwrap().push(on);
    }
}

// ── Line sink ─────────────────────────────────────────────────

/// Sink that keeps every line it is handed.
#[derive(Clone, Default)]
pub struct CollectSink {
    lines: Arc<Mutex<Vec<(SocketId, Vec<u8>)>>>,
}

#[allow(dead_code)]
impl CollectSink {
    pub fn notifier(&self) -> Notifier {
        Arc::new(self.clone())
    }

    pub fn lines(&self) -> Vec<Vec<u8>> {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .map(|(_, l)| l.clone())
            .collect()
    }

    pub fn sockets(&self) -> Vec<SocketId> {
        self.lines.lock().unwrap().iter().map(|(s, _)| *s).collect()
    }
}

impl LineSink for CollectSink {
    fn on_line(&self, socket: SocketId, line: &[u8]) {
        self.lines.lock().unwrap().push((socket, line.to_vec()));
    }
}

// ── Comm status log ───────────────────────────────────────────

/// Collects the statuses reported by a BLE controller.
#[derive(Clone, Default)]
pub struct CommLog {
    seen: Arc<Mutex<Vec<CommStatus>>>,
}

impl CommLog {
    pub fn callback(&self) -> CommCallback {
        let seen = self.seen.clone();
        Box::new(move |status| seen.lock().unwrap().push(status))
    }

    pub fn seen(&self) -> Vec<CommStatus> {
        self.seen.lock().unwrap().clone()
    }
}

// ── BLE bench ─────────────────────────────────────────────────

/// A BLE controller wired to a mock module on a mock UART.
///
/// `pump` plays the part of the polling loop and the FSM task: it keeps
/// polling the UART and running the machine until both are idle.
pub struct BleBench {
    pub registry: Arc<DeviceRegistry>,
    pub uart: Option<Arc<UartDevice<MockSerial>>>,
    pub serial: MockSerial,
    pub power: RecordingPower,
    pub comm: CommLog,
    pub clock: ManualClock,
    pub ble: BleMachine<ManualClock>,
}

#[allow(dead_code)]
impl BleBench {
    pub fn new() -> Self {
        Self::build(BleConfig::default(), true)
    }

    /// Bench whose UART device is never registered.
    pub fn without_uart() -> Self {
        Self::build(BleConfig::default(), false)
    }

    pub fn build(config: BleConfig, with_uart: bool) -> Self {
        let registry = Arc::new(DeviceRegistry::new());
        let serial = MockSerial::new();
        let uart = with_uart.then(|| {
            let uart = Arc::new(UartDevice::new(
                config.uart_device.clone(),
                serial.clone(),
                9600,
            ));
            registry.register(&config.uart_device, uart.clone());
            uart
        });
        let power = RecordingPower::default();
        let comm = CommLog::default();
        let clock = ManualClock::new();
        let ble = ble::create(
            &registry,
            config,
            Some(Box::new(power.clone())),
            comm.callback(),
            clock.clone(),
        )
        .expect("create BLE controller");

        Self {
            registry,
            uart,
            serial,
            power,
            comm,
            clock,
            ble,
        }
    }

    /// Poll the UART and run the machine until neither has work left.
    pub fn pump(&mut self) {
        loop {
            let lines = self
                .uart
                .as_ref()
                .map_or(0, |uart| uart.poll(&self.registry));
            let handled = self.ble.run_pending();
            if lines == 0 && handled == 0 {
                break;
            }
        }
    }

    pub fn advance(&mut self, ms: u64) {
        self.clock.advance(ms);
        self.pump();
    }

    /// The module sends `bytes`.
    pub fn module_says(&mut self, bytes: &[u8]) {
        self.serial.inject(bytes);
        self.pump();
    }

    /// Sockets currently open on the real UART.
    pub fn uart_sockets(&self) -> usize {
        self.registry.count_open(&self.ble.context().config().uart_device)
    }
}
