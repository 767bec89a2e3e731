//! BLE control state handlers and table.
//!
//! ```text
//!   OFF ──[turn-on]──▶ WAIT_POWER_ON ──[500ms: configure uart]──▶ STARTING
//!    ▲                   │  [open failed: comm_fail]                │
//!    ├───────────────────┘                          [int == serial] │ [int != serial]
//!    │                                                 comm_ok      ▼        │
//!    │                    SERIAL_RUNNING ◀──────────────────────────┘        │
//!    │                      │      ▲  ▲                                      │
//!    │             [turn-off]      │  └──[500ms or OK]── WAIT_TYPE_SERIAL ◀──┘
//!    │                      ▼      │ [turn-on: comm_ok]
//!    └──[500ms / turn-off]─ STOPPING_COMM
//!
//!  STARTING ──[1000ms: comm_fail]──▶ OFF;  any waiting state ──[turn-off]──▶ OFF
//! ```

use log::{debug, info};

use super::context::{BleContext, CommStatus};
use super::{BleEvent, BleState, CMD_TYPE_SERIAL, CMD_WHO, Reply};
use crate::device::Ioctl;
use crate::fsm::{Actions, Event, Next, StateDescriptor};

type Act<'a> = Actions<'a, BleEvent>;
type Ev<'a> = Event<'a, BleEvent>;

// ═══════════════════════════════════════════════════════════════════════════
//  Table
// ═══════════════════════════════════════════════════════════════════════════

pub static STATE_TABLE: [StateDescriptor<BleState, BleEvent, BleContext>; 6] = [
    StateDescriptor {
        id: BleState::Off,
        name: "BleOff",
        handler: off,
    },
    StateDescriptor {
        id: BleState::WaitPowerOn,
        name: "BleWaitPower",
        handler: wait_power_on,
    },
    StateDescriptor {
        id: BleState::Starting,
        name: "BleStarting",
        handler: starting,
    },
    StateDescriptor {
        id: BleState::WaitTypeSerial,
        name: "BleWaitTypeSerial",
        handler: wait_type_serial,
    },
    StateDescriptor {
        id: BleState::SerialRunning,
        name: "BleSerialRunning",
        handler: serial_running,
    },
    StateDescriptor {
        id: BleState::StoppingComm,
        name: "BleStoppingComm",
        handler: stopping_comm,
    },
];

/// Classified reply carried by a `Line` event, if any.
fn reply<'a>(event: Ev<'a>) -> Option<Reply<'a>> {
    match event {
        Event::User(BleEvent::Line(line)) => Reply::classify(line),
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  OFF
// ═══════════════════════════════════════════════════════════════════════════

fn off(ctx: &mut BleContext, act: &mut Act<'_>, event: Ev<'_>) -> Next<BleState> {
    match event {
        Event::Enter => {
            ctx.close_uart();
            ctx.power(false);
            Next::Current
        }
        Event::User(BleEvent::TurnOn) if ctx.has_consumers() => Next::To(BleState::WaitPowerOn),
        Event::User(BleEvent::TurnOn) => {
            debug!("BLE: turn-on with no consumer left, ignored");
            Next::Current
        }
        Event::Exit(_) | Event::Timeout => Next::Current,
        _ => act.unhandled(&event),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  WAIT_POWER_ON: open the UART, power up, let the module settle
// ═══════════════════════════════════════════════════════════════════════════

fn wait_power_on(ctx: &mut BleContext, act: &mut Act<'_>, event: Ev<'_>) -> Next<BleState> {
    match event {
        Event::Enter => {
            if !ctx.open_uart() {
                info!("BLE: failed to open {}", ctx.config.uart_device);
                act.send_event(BleEvent::UartFailed);
                return Next::Current;
            }
            ctx.power(true);
            act.timer_start(ctx.config.power_on_ms);
            Next::Current
        }
        Event::Timeout => {
            // Settle time doubles as the wait for other users' TX to drain.
            if ctx.uart_ioctl(Ioctl::CheckTx).unwrap_or(0) != 0 {
                info!("BLE: flushing old tx");
                ctx.uart_ioctl(Ioctl::FlushTxRx);
            }
            ctx.uart_ioctl(Ioctl::SetBaud(ctx.config.baud_rate));
            ctx.uart_ioctl(Ioctl::SetEol(ctx.config.eol));
            ctx.uart_ioctl(Ioctl::FilterAscii(true));
            if let Some(input) = ctx.config.uart_select {
                ctx.uart_ioctl(Ioctl::SelectUart(input));
            }
            Next::To(BleState::Starting)
        }
        // Only meaningful while this bring-up still has no UART.
        Event::User(BleEvent::UartFailed) if !ctx.link().has_uart() => {
            ctx.report(CommStatus::Fail);
            Next::To(BleState::Off)
        }
        Event::User(BleEvent::UartFailed) => {
            debug!("BLE: stale uart failure ignored");
            Next::Current
        }
        Event::User(BleEvent::TurnOff) => Next::To(BleState::Off),
        Event::Exit(_) => Next::Current,
        _ if reply(event) == Some(Reply::Ok) => Next::Current,
        _ => act.unhandled(&event),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  STARTING: ask the module who it is
// ═══════════════════════════════════════════════════════════════════════════

fn starting(ctx: &mut BleContext, act: &mut Act<'_>, event: Ev<'_>) -> Next<BleState> {
    match event {
        Event::Enter => {
            ctx.uart_write(CMD_WHO);
            act.timer_start(ctx.config.identity_timeout_ms);
            Next::Current
        }
        Event::Timeout => {
            info!("BLE: no identity reply");
            ctx.report(CommStatus::Fail);
            Next::To(BleState::Off)
        }
        Event::User(BleEvent::TurnOff) => Next::To(BleState::Off),
        Event::Exit(_) => Next::Current,
        _ => match reply(event) {
            // Bare OK/READY is the boot banner, not the answer. Ask again.
            Some(Reply::Ok) => {
                ctx.uart_write(CMD_WHO);
                Next::Current
            }
            Some(Reply::Int(card_type)) => {
                ctx.card_type = Some(card_type);
                if card_type == ctx.config.serial_card_type {
                    ctx.report(CommStatus::Ok { card_type });
                    Next::To(BleState::SerialRunning)
                } else {
                    info!("BLE: card type {}, switching to serial", card_type);
                    Next::To(BleState::WaitTypeSerial)
                }
            }
            _ => act.unhandled(&event),
        },
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  WAIT_TYPE_SERIAL: put the module into serial mode
// ═══════════════════════════════════════════════════════════════════════════

fn wait_type_serial(ctx: &mut BleContext, act: &mut Act<'_>, event: Ev<'_>) -> Next<BleState> {
    match event {
        Event::Enter => {
            act.timer_start(ctx.config.type_set_ms);
            ctx.uart_write(CMD_TYPE_SERIAL);
            Next::Current
        }
        // No acknowledgement is not an error: assume the change took.
        Event::Timeout => {
            ctx.card_type = Some(ctx.config.serial_card_type);
            Next::To(BleState::SerialRunning)
        }
        Event::User(BleEvent::TurnOff) => Next::To(BleState::Off),
        Event::Exit(_) => Next::Current,
        _ if reply(event) == Some(Reply::Ok) => {
            ctx.card_type = Some(ctx.config.serial_card_type);
            Next::To(BleState::SerialRunning)
        }
        _ => act.unhandled(&event),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  SERIAL_RUNNING: pass-through
// ═══════════════════════════════════════════════════════════════════════════

fn serial_running(ctx: &mut BleContext, act: &mut Act<'_>, event: Ev<'_>) -> Next<BleState> {
    match event {
        Event::Enter => {
            info!("BLE: serial link up");
            ctx.set_running(true);
            // The last consumer may have left while the turn-off was lost.
            if !ctx.has_consumers() {
                act.send_event(BleEvent::TurnOff);
            }
            Next::Current
        }
        Event::Exit(_) => {
            info!("BLE: serial link down");
            ctx.set_running(false);
            Next::Current
        }
        Event::Timeout => Next::Current,
        Event::User(BleEvent::TurnOff) => Next::To(BleState::StoppingComm),
        Event::User(BleEvent::TurnOn) if ctx.has_consumers() => Next::Current,
        Event::User(BleEvent::TurnOn) => Next::To(BleState::StoppingComm),
        Event::User(BleEvent::Line(line)) => {
            match Reply::classify(line) {
                // Module status chatter is not peer data.
                Some(Reply::Ok | Reply::Error) | None => {}
                Some(Reply::Int(_) | Reply::Data(_)) => ctx.forward(line),
            }
            Next::Current
        }
        _ => act.unhandled(&event),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  STOPPING_COMM: drain before teardown, reopen is instant
// ═══════════════════════════════════════════════════════════════════════════

fn stopping_comm(ctx: &mut BleContext, act: &mut Act<'_>, event: Ev<'_>) -> Next<BleState> {
    match event {
        Event::Enter => {
            act.timer_start(ctx.config.drain_ms);
            Next::Current
        }
        Event::Timeout | Event::User(BleEvent::TurnOff) => {
            ctx.close_uart();
            Next::To(BleState::Off)
        }
        Event::User(BleEvent::TurnOn) if ctx.has_consumers() => {
            let card_type = ctx.card_type.unwrap_or(ctx.config.serial_card_type);
            ctx.report(CommStatus::Ok { card_type });
            Next::To(BleState::SerialRunning)
        }
        Event::Exit(_) => Next::Current,
        _ => act.unhandled(&event),
    }
}
