//! Function-pointer finite state machine executor.
//!
//! Classic embedded FSM pattern, generic over the state set, the event
//! type and the context each machine owns:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  StateTable (&'static [StateDescriptor])                     │
//! │  ┌─────────────┬────────────────┬──────────────────────────┐ │
//! │  │ StateId     │ name           │ handler                  │ │
//! │  ├─────────────┼────────────────┼──────────────────────────┤ │
//! │  │ S::Off      │ "Off"          │ fn(ctx, actions, event)  │ │
//! │  │ S::Running  │ "Running"      │   -> Next<S>             │ │
//! │  └─────────────┴────────────────┴──────────────────────────┘ │
//! └──────────────────────────────────────────────────────────────┘
//!        ▲ Enter / Exit(cause) / Timeout / User(&E)
//!        │
//!   event queue (FIFO, never blocks) + one single-shot timer
//! ```
//!
//! One handler per state receives every event, including three pseudo
//! events generated by the executor:
//!
//! - `Enter` when the state becomes current (and on [`StateMachine::start`]),
//! - `Exit(cause)` when it stops being current, carrying the event that
//!   caused the transition,
//! - `Timeout` when the timer armed with [`Actions::timer_start`] expires.
//!
//! A handler answers `Next::Current` to stay or `Next::To(id)` to move.
//! A transition runs `Exit(old)`, updates the current pointer, disarms
//! the timer, then runs `Enter(new)`. What `Enter` and `Exit` return is
//! ignored. Staying fires neither.
//!
//! Events for one machine are processed one at a time, in the order they
//! were posted. Different machines are independent.

pub mod runner;

use core::fmt::Debug;
use core::sync::atomic::{AtomicU8, Ordering};
use core::time::Duration;
use std::sync::Arc;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::{debug, error, info, warn};

use crate::config::EVENT_QUEUE_DEPTH;
use crate::ports::Clock;

// ---------------------------------------------------------------------------
// Events and handler results
// ---------------------------------------------------------------------------

/// What a state handler is being told.
#[derive(Debug)]
pub enum Event<'a, E> {
    Enter,
    Exit(Cause<'a, E>),
    Timeout,
    User(&'a E),
}

impl<E> Clone for Event<'_, E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for Event<'_, E> {}

/// The event that triggered a transition, passed along with `Exit`.
#[derive(Debug)]
pub enum Cause<'a, E> {
    Timeout,
    User(&'a E),
}

impl<E> Clone for Cause<'_, E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for Cause<'_, E> {}

/// Handler verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Next<S> {
    /// Stay in the current state; no `Exit`/`Enter`.
    Current,
    /// Move to the given state. Naming the current state is the same as
    /// `Current`.
    To(S),
}

// ---------------------------------------------------------------------------
// State table
// ---------------------------------------------------------------------------

/// Signature shared by every state handler.
pub type StateHandler<S, E, C> = fn(&mut C, &mut Actions<'_, E>, Event<'_, E>) -> Next<S>;

/// One row of a state table.
pub struct StateDescriptor<S, E, C> {
    pub id: S,
    pub name: &'static str,
    pub handler: StateHandler<S, E, C>,
}

// ---------------------------------------------------------------------------
// Handle (id + queue)
// ---------------------------------------------------------------------------

/// Per-instance event queue.
pub type EventQueue<E> = Channel<CriticalSectionRawMutex, E, EVENT_QUEUE_DEPTH>;

static NEXT_ID: AtomicU8 = AtomicU8::new(0);

/// Process-unique machine number, used in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FsmId(u8);

/// Cloneable sender side of a machine. Safe to use from any task or
/// from device callbacks.
pub struct FsmHandle<E> {
    id: FsmId,
    name: &'static str,
    queue: Arc<EventQueue<E>>,
}

impl<E> Clone for FsmHandle<E> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            name: self.name,
            queue: self.queue.clone(),
        }
    }
}

impl<E: Debug> FsmHandle<E> {
    /// Create the queue for a machine that is about to be built. The
    /// handle can be given to collaborators before the machine exists.
    pub fn new(name: &'static str) -> Self {
        Self {
            id: FsmId(NEXT_ID.fetch_add(1, Ordering::Relaxed)),
            name,
            queue: Arc::new(Channel::new()),
        }
    }

    pub fn id(&self) -> FsmId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    #[cfg(test)]
    pub(crate) fn queue(&self) -> &EventQueue<E> {
        &self.queue
    }

    /// Post `event` to the machine. Never blocks: if the queue is full the
    /// event is dropped, logged, and `false` is returned.
    pub fn send_event(&self, event: E) -> bool {
        match self.queue.try_send(event) {
            Ok(()) => true,
            Err(embassy_sync::channel::TrySendError::Full(ev)) => {
                warn!("{}: event queue full, dropping {:?}", self.name, ev);
                false
            }
        }
    }

    /// Post a low-priority event only if at least `headroom` slots stay
    /// free after it, so bulk traffic cannot crowd out control events.
    /// Returns `false`, without logging, when the event was refused.
    pub fn offer_event(&self, event: E, headroom: usize) -> bool {
        if self.queue.free_capacity() <= headroom {
            return false;
        }
        self.queue.try_send(event).is_ok()
    }

    /// Number of events waiting to be handled.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

// ---------------------------------------------------------------------------
// Actions available to handlers
// ---------------------------------------------------------------------------

/// Side effects a handler may request from the executor.
pub struct Actions<'a, E> {
    now_ms: u64,
    deadline: &'a mut Option<u64>,
    handle: &'a FsmHandle<E>,
    state: &'static str,
}

impl<E: Debug> Actions<'_, E> {
    /// Arm the single-shot timer. Replaces any earlier arming, so only
    /// one `Timeout` is delivered.
    pub fn timer_start(&mut self, ms: u32) {
        *self.deadline = Some(self.now_ms + u64::from(ms));
    }

    pub fn timer_stop(&mut self) {
        *self.deadline = None;
    }

    /// Post an event to this same machine. It is handled after the
    /// current one, behind anything already queued.
    pub fn send_event(&self, event: E) -> bool {
        self.handle.send_event(event)
    }

    pub fn handle(&self) -> &FsmHandle<E> {
        self.handle
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    /// Default treatment of an event a state does not care about: log it
    /// and stay.
    pub fn unhandled<S>(&self, event: &Event<'_, E>) -> Next<S> {
        debug!(
            "{}: unhandled {:?} in {}",
            self.handle.name, event, self.state
        );
        Next::Current
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

enum Wake<E> {
    Event(E),
    Timer,
}

/// A state machine instance: table, current state, owned context, timer.
pub struct StateMachine<S: 'static, E: 'static, C: 'static, K> {
    handle: FsmHandle<E>,
    table: &'static [StateDescriptor<S, E, C>],
    current: usize,
    context: C,
    clock: K,
    deadline: Option<u64>,
    started: bool,
}

impl<S, E, C, K> StateMachine<S, E, C, K>
where
    S: Copy + PartialEq + Debug,
    E: Debug,
    K: Clock,
{
    /// Build a machine around `handle`'s queue, positioned on `initial`.
    /// Nothing runs until [`start`](Self::start).
    ///
    /// # Panics
    ///
    /// If `initial` is not in `table`.
    pub fn new(
        handle: FsmHandle<E>,
        table: &'static [StateDescriptor<S, E, C>],
        initial: S,
        context: C,
        clock: K,
    ) -> Self {
        let current = table
            .iter()
            .position(|d| d.id == initial)
            .unwrap_or_else(|| panic!("{}: initial state {:?} not in table", handle.name, initial));
        Self {
            handle,
            table,
            current,
            context,
            clock,
            deadline: None,
            started: false,
        }
    }

    /// Deliver `Enter` to the initial state. Later calls do nothing.
    pub fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        info!(
            "{}: starting in {}",
            self.handle.name, self.table[self.current].name
        );
        self.call_ignoring(self.current, Event::Enter);
    }

    /// Process everything that is ready: queued events in FIFO order, then
    /// an expired timer, until neither is left. Starts the machine if
    /// needed. Returns the number of events handled.
    pub fn run_pending(&mut self) -> usize {
        self.start();
        let mut handled = 0;
        loop {
            if let Ok(event) = self.handle.queue.try_receive() {
                self.dispatch(Event::User(&event));
            } else if self.timer_expired() {
                self.deadline = None;
                self.dispatch(Event::Timeout);
            } else {
                break;
            }
            handled += 1;
        }
        handled
    }

    /// Run forever: wait on the queue, raced against the armed timer.
    pub async fn run(mut self) {
        let queue = self.handle.queue.clone();
        loop {
            self.run_pending();
            let wake = match self.timer_remaining_ms() {
                Some(ms) => {
                    futures_lite::future::or(
                        async { Wake::Event(queue.receive().await) },
                        async {
                            async_io_mini::Timer::after(Duration::from_millis(ms)).await;
                            Wake::Timer
                        },
                    )
                    .await
                }
                None => Wake::Event(queue.receive().await),
            };
            // Timer expiry is picked up by the next `run_pending`.
            if let Wake::Event(event) = wake {
                self.dispatch(Event::User(&event));
            }
        }
    }

    // ── Accessors ─────────────────────────────────────────────

    pub fn state(&self) -> S {
        self.table[self.current].id
    }

    pub fn state_name(&self) -> &'static str {
        self.table[self.current].name
    }

    pub fn handle(&self) -> &FsmHandle<E> {
        &self.handle
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut C {
        &mut self.context
    }

    pub fn timer_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Milliseconds until the armed timer expires, `Some(0)` if overdue.
    pub fn timer_remaining_ms(&self) -> Option<u64> {
        self.deadline
            .map(|d| d.saturating_sub(self.clock.now_ms()))
    }

    // ── Internal ──────────────────────────────────────────────

    fn timer_expired(&self) -> bool {
        self.deadline.is_some_and(|d| self.clock.now_ms() >= d)
    }

    fn call(&mut self, index: usize, event: Event<'_, E>) -> Next<S> {
        let table = self.table;
        let descriptor = &table[index];
        let mut actions = Actions {
            now_ms: self.clock.now_ms(),
            deadline: &mut self.deadline,
            handle: &self.handle,
            state: descriptor.name,
        };
        (descriptor.handler)(&mut self.context, &mut actions, event)
    }

    fn call_ignoring(&mut self, index: usize, event: Event<'_, E>) {
        let label = match event {
            Event::Enter => "Enter",
            _ => "Exit",
        };
        if let Next::To(target) = self.call(index, event) {
            warn!(
                "{}: {} of {} asked for {:?}, ignored",
                self.handle.name, label, self.table[index].name, target
            );
        }
    }

    fn dispatch(&mut self, event: Event<'_, E>) {
        let cause = match event {
            Event::User(e) => Cause::User(e),
            _ => Cause::Timeout,
        };
        if let Next::To(target) = self.call(self.current, event) {
            self.transition(target, cause);
        }
    }

    fn transition(&mut self, target: S, cause: Cause<'_, E>) {
        let Some(next) = self.table.iter().position(|d| d.id == target) else {
            error!(
                "{}: no state {:?} in table, staying in {}",
                self.handle.name, target, self.table[self.current].name
            );
            return;
        };
        if next == self.current {
            return;
        }

        info!(
            "{}: {} -> {}",
            self.handle.name, self.table[self.current].name, self.table[next].name
        );

        self.call_ignoring(self.current, Event::Exit(cause));
        self.current = next;
        self.deadline = None;
        self.call_ignoring(next, Event::Enter);
    }
}
