//! UART device behind the registry: line delivery, TX buffering and the
//! ioctl set, driven through sockets the way consumers use it.

use std::sync::Arc;

use sensornode::config::{LINE_BUF_SIZE, TX_BUF_SIZE};
use sensornode::device::{DeviceRegistry, Ioctl, NullSink};
use sensornode::drivers::uart::UartDevice;
use sensornode::error::DeviceError;
use sensornode::managers::MinLengthFilter;

use crate::mock_hw::{CollectSink, MockSerial};

fn bench() -> (DeviceRegistry, Arc<UartDevice<MockSerial>>, MockSerial) {
    let registry = DeviceRegistry::new();
    let serial = MockSerial::new();
    let uart = Arc::new(UartDevice::new("uart2", serial.clone(), 9600));
    registry.register("uart2", uart.clone());
    (registry, uart, serial)
}

#[test]
fn lines_fan_out_to_every_socket() {
    let (registry, uart, serial) = bench();
    let a = CollectSink::default();
    let b = CollectSink::default();
    let sa = registry.open("uart2", a.notifier()).unwrap();
    let sb = registry.open("uart2", b.notifier()).unwrap();

    serial.inject(b"$GPGGA,1\n$GPRMC,2\npart");
    assert_eq!(uart.poll(&registry), 2);
    assert_eq!(a.lines(), vec![b"$GPGGA,1".to_vec(), b"$GPRMC,2".to_vec()]);
    assert_eq!(b.lines(), a.lines());
    assert_eq!(a.sockets(), vec![sa.id(), sa.id()]);
    assert_eq!(b.sockets(), vec![sb.id(), sb.id()]);

    serial.inject(b"ial\n");
    assert_eq!(uart.poll(&registry), 1);
    assert_eq!(a.lines().last().unwrap(), b"partial");
}

#[test]
fn closed_socket_stops_receiving() {
    let (registry, uart, serial) = bench();
    let a = CollectSink::default();
    let b = CollectSink::default();
    let sa = registry.open("uart2", a.notifier()).unwrap();
    let _sb = registry.open("uart2", b.notifier()).unwrap();

    registry.close(sa);
    serial.inject(b"late\n");
    uart.poll(&registry);
    assert!(a.lines().is_empty());
    assert_eq!(b.lines(), vec![b"late".to_vec()]);
}

#[test]
fn lines_without_listeners_are_consumed() {
    let (registry, uart, serial) = bench();
    serial.inject(b"nobody\nhome\n");
    assert_eq!(uart.poll(&registry), 2);
    assert_eq!(serial.rx_pending(), 0);
}

#[test]
fn overlong_line_does_not_reach_sinks() {
    let (registry, uart, serial) = bench();
    let sink = CollectSink::default();
    let _s = registry.open("uart2", sink.notifier()).unwrap();

    let mut input = vec![b'z'; LINE_BUF_SIZE + 1];
    input.extend_from_slice(b"\nok\n");
    serial.inject(&input);
    uart.poll(&registry);
    assert_eq!(sink.lines(), vec![b"ok".to_vec()]);
}

#[test]
fn nmea_filter_drops_fragments() {
    let (registry, uart, serial) = bench();
    let sink = CollectSink::default();
    let _s = registry
        .open("uart2", Arc::new(MinLengthFilter::nmea(sink.clone())))
        .unwrap();

    serial.inject(b"$GP\n$GPGGA,123519,4807.038,N\n");
    uart.poll(&registry);
    assert_eq!(sink.lines(), vec![b"$GPGGA,123519,4807.038,N".to_vec()]);
}

#[test]
fn writes_buffer_when_fifo_is_full() {
    let (registry, uart, serial) = bench();
    let s = registry.open("uart2", Arc::new(NullSink)).unwrap();

    serial.set_tx_room(Some(4));
    assert_eq!(registry.write(&s, b"AT+WHO\r\n"), Ok(8));
    assert_eq!(serial.tx(), b"AT+W");
    assert_eq!(uart.pending_tx(), 4);
    assert_eq!(registry.ioctl(&s, Ioctl::CheckTx), Ok(4));

    serial.set_tx_room(None);
    uart.poll(&registry);
    assert_eq!(serial.tx_text(), "AT+WHO\r\n");
    assert_eq!(registry.ioctl(&s, Ioctl::CheckTx), Ok(0));
}

#[test]
fn full_tx_buffer_pushes_back() {
    let (registry, _uart, serial) = bench();
    let s = registry.open("uart2", Arc::new(NullSink)).unwrap();
    serial.set_tx_room(Some(0));

    let big = vec![b'a'; TX_BUF_SIZE + 10];
    assert_eq!(registry.write(&s, &big), Ok(TX_BUF_SIZE));
    assert_eq!(registry.write(&s, b"more"), Err(DeviceError::Busy));
    assert_eq!(registry.write(&s, b""), Ok(0));
}

#[test]
fn ioctls_reach_the_port() {
    let (registry, uart, serial) = bench();
    let s = registry.open("uart2", Arc::new(NullSink)).unwrap();

    assert_eq!(registry.ioctl(&s, Ioctl::SetBaud(115_200)), Ok(0));
    assert_eq!(uart.baud(), 115_200);
    assert_eq!(serial.bauds(), vec![115_200]);

    assert_eq!(registry.ioctl(&s, Ioctl::SelectUart(1)), Ok(0));
    assert_eq!(uart.selected(), Some(1));
    assert_eq!(serial.selects(), vec![1]);
}

#[test]
fn eol_and_ascii_filter_apply_to_reception() {
    let (registry, uart, serial) = bench();
    let sink = CollectSink::default();
    let s = registry.open("uart2", sink.notifier()).unwrap();

    registry.ioctl(&s, Ioctl::SetEol(b'\r')).unwrap();
    registry.ioctl(&s, Ioctl::FilterAscii(true)).unwrap();
    serial.inject(b"\x01one\r\ntwo\r");
    uart.poll(&registry);
    assert_eq!(sink.lines(), vec![b"one".to_vec(), b"two".to_vec()]);
}

#[test]
fn flush_drops_pending_tx_and_partial_rx() {
    let (registry, uart, serial) = bench();
    let sink = CollectSink::default();
    let s = registry.open("uart2", sink.notifier()).unwrap();

    serial.inject(b"half a li");
    uart.poll(&registry);
    serial.set_tx_room(Some(0));
    registry.write(&s, b"queued").unwrap();

    assert_eq!(registry.ioctl(&s, Ioctl::FlushTxRx), Ok(0));
    assert_eq!(uart.pending_tx(), 0);
    assert_eq!(serial.discards(), 1);

    serial.inject(b"fresh\n");
    uart.poll(&registry);
    assert_eq!(sink.lines(), vec![b"fresh".to_vec()]);
}
