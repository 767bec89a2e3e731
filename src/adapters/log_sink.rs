//! Log-based line sink adapter.
//!
//! Implements [`LineSink`] by writing every received line to the logger
//! (UART / USB-CDC console in production). Handy as the sink of a
//! diagnostic socket.

use log::info;

use crate::device::{LineSink, SocketId};

/// Adapter that logs every delivered line under a fixed tag.
pub struct LogLineSink {
    tag: &'static str,
}

impl LogLineSink {
    pub fn new(tag: &'static str) -> Self {
        Self { tag }
    }
}

impl LineSink for LogLineSink {
    fn on_line(&self, socket: SocketId, line: &[u8]) {
        info!(
            "RX | {} | skt={} | {}",
            self.tag,
            socket.index(),
            String::from_utf8_lossy(line)
        );
    }
}
