//! GPIO adapters bridging `embedded-hal` pins to the power port.
//!
//! Works with any `OutputPin`: `esp_idf_hal::gpio::PinDriver` on the
//! board, a recording mock in tests.

use embedded_hal::digital::OutputPin;
use log::warn;

use crate::ports::PowerSwitch;

/// Power switch whose enable line is active LOW (LOW = powered).
pub struct ActiveLowPin<P> {
    pin: P,
}

impl<P: OutputPin> ActiveLowPin<P> {
    /// Wrap `pin` and drive it to the OFF level straight away.
    pub fn new(mut pin: P) -> Self {
        if let Err(e) = pin.set_high() {
            warn!("power pin: initial OFF failed: {:?}", e);
        }
        Self { pin }
    }

    pub fn into_inner(self) -> P {
        self.pin
    }
}

impl<P: OutputPin> PowerSwitch for ActiveLowPin<P> {
    fn set_powered(&mut self, on: bool) {
        let result = if on {
            self.pin.set_low()
        } else {
            self.pin.set_high()
        };
        if let Err(e) = result {
            warn!("power pin: drive {} failed: {:?}", if on { "ON" } else { "OFF" }, e);
        }
    }
}
