//! Machines driven by the cooperative runner on a real thread, with the
//! monotonic clock and reactor timers.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use sensornode::adapters::time::MonotonicClock;
use sensornode::drivers::task_pin::Core;
use sensornode::fsm::runner::{self, Machine};
use sensornode::fsm::{Actions, Event, FsmHandle, Next, StateDescriptor, StateMachine};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lamp {
    Dark,
    Lit,
}

#[derive(Debug)]
enum Press {
    Toggle,
}

/// Counters shared with the test thread.
#[derive(Default)]
struct Counts {
    toggles: AtomicU32,
    timeouts: AtomicU32,
}

struct LampCtx {
    counts: Arc<Counts>,
    on_ms: u32,
}

fn dark(ctx: &mut LampCtx, act: &mut Actions<'_, Press>, event: Event<'_, Press>) -> Next<Lamp> {
    match event {
        Event::User(Press::Toggle) => {
            ctx.counts.toggles.fetch_add(1, Ordering::SeqCst);
            Next::To(Lamp::Lit)
        }
        _ => act.unhandled(&event),
    }
}

fn lit(ctx: &mut LampCtx, act: &mut Actions<'_, Press>, event: Event<'_, Press>) -> Next<Lamp> {
    match event {
        Event::Enter => {
            act.timer_start(ctx.on_ms);
            Next::Current
        }
        Event::Timeout => {
            ctx.counts.timeouts.fetch_add(1, Ordering::SeqCst);
            Next::To(Lamp::Dark)
        }
        Event::User(Press::Toggle) => {
            ctx.counts.toggles.fetch_add(1, Ordering::SeqCst);
            Next::To(Lamp::Dark)
        }
        Event::Exit(_) => Next::Current,
    }
}

static LAMP_TABLE: [StateDescriptor<Lamp, Press, LampCtx>; 2] = [
    StateDescriptor {
        id: Lamp::Dark,
        name: "Dark",
        handler: dark,
    },
    StateDescriptor {
        id: Lamp::Lit,
        name: "Lit",
        handler: lit,
    },
];

fn lamp(name: &'static str, on_ms: u32) -> (FsmHandle<Press>, Arc<Counts>, Box<dyn Machine>) {
    let handle = FsmHandle::new(name);
    let counts = Arc::new(Counts::default());
    let machine = StateMachine::new(
        handle.clone(),
        &LAMP_TABLE,
        Lamp::Dark,
        LampCtx {
            counts: counts.clone(),
            on_ms,
        },
        MonotonicClock::new(),
    );
    (handle, counts, Box::new(machine))
}

fn wait_for(what: &str, cond: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn runner_delivers_events_and_timeouts() {
    let (handle, counts, machine) = lamp("lamp-a", 30);
    let _thread = runner::spawn("fsm-test\0", Core::App, vec![machine]).unwrap();

    assert!(handle.send_event(Press::Toggle));
    wait_for("toggle", || counts.toggles.load(Ordering::SeqCst) == 1);
    wait_for("timeout", || counts.timeouts.load(Ordering::SeqCst) == 1);

    // Back in Dark, nothing is armed: no further timeouts.
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(counts.timeouts.load(Ordering::SeqCst), 1);
}

#[test]
fn machines_on_one_runner_are_independent() {
    let (slow, slow_counts, slow_machine) = lamp("lamp-slow", 10_000);
    let (fast, fast_counts, fast_machine) = lamp("lamp-fast", 20);
    let _thread = runner::spawn("fsm-pair\0", Core::App, vec![slow_machine, fast_machine]).unwrap();

    slow.send_event(Press::Toggle);
    fast.send_event(Press::Toggle);
    wait_for("fast timeout", || fast_counts.timeouts.load(Ordering::SeqCst) == 1);
    assert_eq!(slow_counts.toggles.load(Ordering::SeqCst), 1);
    assert_eq!(slow_counts.timeouts.load(Ordering::SeqCst), 0);

    // Toggling the slow lamp off beats its long timer.
    slow.send_event(Press::Toggle);
    wait_for("slow toggle", || slow_counts.toggles.load(Ordering::SeqCst) == 2);
    assert_eq!(slow_counts.timeouts.load(Ordering::SeqCst), 0);
}
