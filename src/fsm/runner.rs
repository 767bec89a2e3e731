//! Cooperative runner: drives several state machines on one thread.
//!
//! Each machine becomes one task on an `edge-executor` local executor;
//! `async-io-mini` supplies the reactor timers that wake a machine when
//! its armed timeout is due. A machine only suspends while waiting for
//! its next event, so handlers never block each other for long.
//!
//! ```text
//!  ┌────────────────────────────────────────────────────────┐
//!  │  FSM thread (spawn_on_core)                            │
//!  │  ┌──────────────────────────────────────────────────┐  │
//!  │  │  edge_executor::LocalExecutor                    │  │
//!  │  │  ┌──────────────┐ ┌──────────────┐               │  │
//!  │  │  │ machine A    │ │ machine B    │   ...         │  │
//!  │  │  │ queue | ⏱    │ │ queue | ⏱    │               │  │
//!  │  │  └──────────────┘ └──────────────┘               │  │
//!  │  └──────────────────────────────────────────────────┘  │
//!  └────────────────────────────────────────────────────────┘
//! ```

use core::fmt::Debug;
use core::future::Future;
use core::pin::Pin;

use log::info;

use super::StateMachine;
use crate::drivers::task_pin::{Core, TaskSpec, spawn_on_core};
use crate::error::Result;
use crate::ports::Clock;

/// Upper bound on machines driven by one runner thread.
pub const MAX_MACHINES: usize = 8;

const FSM_TASK_PRIORITY: u8 = 5;
const FSM_TASK_STACK_KB: usize = 8;

/// A machine that can be moved onto the runner thread.
pub trait Machine: Send {
    fn name(&self) -> &'static str;

    /// Turn the machine into its never-ending run loop.
    fn into_task(self: Box<Self>) -> Pin<Box<dyn Future<Output = ()>>>;
}

impl<S, E, C, K> Machine for StateMachine<S, E, C, K>
where
    S: Copy + PartialEq + Debug + Send + Sync + 'static,
    E: Debug + Send + 'static,
    C: Send + 'static,
    K: Clock + Send + 'static,
{
    fn name(&self) -> &'static str {
        self.handle().name()
    }

    fn into_task(self: Box<Self>) -> Pin<Box<dyn Future<Output = ()>>> {
        Box::pin((*self).run())
    }
}

/// Spawn a thread that runs every machine in `machines` until the
/// process ends. `name` must be NUL-terminated, e.g. `"fsm\0"`.
///
/// # Panics
///
/// If more than [`MAX_MACHINES`] machines are given.
pub fn spawn(
    name: &'static str,
    core: Core,
    machines: Vec<Box<dyn Machine>>,
) -> Result<std::thread::JoinHandle<()>> {
    assert!(
        machines.len() <= MAX_MACHINES,
        "fsm runner: {} machines exceed capacity {}",
        machines.len(),
        MAX_MACHINES
    );

    let spec = TaskSpec {
        name,
        core,
        priority: FSM_TASK_PRIORITY,
        stack_kb: FSM_TASK_STACK_KB,
    };
    spawn_on_core(spec, move || {
        let executor: edge_executor::LocalExecutor<'_, MAX_MACHINES> =
            edge_executor::LocalExecutor::new();

        for machine in machines {
            info!("fsm runner: scheduling {}", machine.name());
            executor.spawn(machine.into_task()).detach();
        }

        futures_lite::future::block_on(executor.run(core::future::pending::<()>()));
    })
}
