//! Building blocks for the peripheral managers (GPS, movement, sensors).
//!
//! The managers themselves live outside this crate; these are the parts
//! they share with the device layer:
//!
//! - [`SampleCell`]: latest-sample snapshot, written by the receive path
//!   and read from any task.
//! - [`CallbackSet`]: bounded, ordered set of subscriber callbacks.
//! - [`MinLengthFilter`]: line sink wrapper that drops lines too short
//!   to be a valid sentence.

use core::cell::Cell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

use crate::device::{LineSink, SocketId};

/// Shortest line that can hold an NMEA sentence worth parsing.
pub const NMEA_MIN_LINE: usize = 10;

// ───────────────────────────────────────────────────────────────
// Sample snapshot
// ───────────────────────────────────────────────────────────────

/// A sample with the time it was taken.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stamped<T> {
    pub value: T,
    pub at_ms: u64,
}

/// Latest-value cell. Empty until the first sample.
pub struct SampleCell<T: Copy> {
    slot: Mutex<CriticalSectionRawMutex, Cell<Option<Stamped<T>>>>,
}

impl<T: Copy> Default for SampleCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy> SampleCell<T> {
    pub const fn new() -> Self {
        Self {
            slot: Mutex::new(Cell::new(None)),
        }
    }

    pub fn store(&self, value: T, at_ms: u64) {
        self.slot
            .lock(|s| s.set(Some(Stamped { value, at_ms })));
    }

    /// Store `value` only if the cell is empty or `changed(old, new)`
    /// says it differs enough. Returns whether it was stored.
    pub fn store_if(&self, value: T, at_ms: u64, changed: impl FnOnce(&T, &T) -> bool) -> bool {
        self.slot.lock(|s| {
            let keep = s.get().is_some_and(|old| !changed(&old.value, &value));
            if !keep {
                s.set(Some(Stamped { value, at_ms }));
            }
            !keep
        })
    }

    pub fn latest(&self) -> Option<Stamped<T>> {
        self.slot.lock(Cell::get)
    }

    /// Age of the latest sample at `now_ms`, `None` if there is none.
    pub fn age_ms(&self, now_ms: u64) -> Option<u64> {
        self.latest().map(|s| now_ms.saturating_sub(s.at_ms))
    }

    pub fn clear(&self) {
        self.slot.lock(|s| s.set(None));
    }
}

// ───────────────────────────────────────────────────────────────
// Callback set
// ───────────────────────────────────────────────────────────────

/// Ticket returned by [`CallbackSet::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u16);

/// Up to `N` callbacks, notified in registration order.
pub struct CallbackSet<F, const N: usize> {
    entries: heapless::Vec<(CallbackId, F), N>,
    next_id: u16,
}

impl<F, const N: usize> Default for CallbackSet<F, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F, const N: usize> CallbackSet<F, N> {
    pub const fn new() -> Self {
        Self {
            entries: heapless::Vec::new(),
            next_id: 0,
        }
    }

    /// Add `callback`. Hands it back if the set is full.
    pub fn register(&mut self, callback: F) -> Result<CallbackId, F> {
        let id = CallbackId(self.next_id);
        self.entries
            .push((id, callback))
            .map_err(|(_, callback)| callback)?;
        self.next_id = self.next_id.wrapping_add(1);
        Ok(id)
    }

    /// Remove the callback registered as `id`. Order of the others is
    /// kept. Returns `false` if `id` is not registered.
    pub fn unregister(&mut self, id: CallbackId) -> bool {
        match self.entries.iter().position(|(i, _)| *i == id) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Call `f` on every callback, oldest first.
    pub fn notify(&mut self, mut f: impl FnMut(&mut F)) {
        for (_, callback) in &mut self.entries {
            f(callback);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ───────────────────────────────────────────────────────────────
// Line filter
// ───────────────────────────────────────────────────────────────

/// Passes on only lines of at least `min` bytes.
pub struct MinLengthFilter<S> {
    min: usize,
    inner: S,
}

impl<S: LineSink> MinLengthFilter<S> {
    pub fn new(min: usize, inner: S) -> Self {
        Self { min, inner }
    }

    /// Filter tuned for NMEA receivers.
    pub fn nmea(inner: S) -> Self {
        Self::new(NMEA_MIN_LINE, inner)
    }
}

impl<S: LineSink> LineSink for MinLengthFilter<S> {
    fn on_line(&self, socket: SocketId, line: &[u8]) {
        if line.len() >= self.min {
            self.inner.on_line(socket, line);
        }
    }
}
