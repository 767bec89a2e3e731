//! Core-pinned threads for long-lived tasks such as the FSM runner.
//!
//! On ESP-IDF a `std::thread` is a pthread over a FreeRTOS task, and
//! `esp_pthread_set_cfg()` configures the *next* `pthread_create()` issued
//! by the calling thread. [`spawn_on_core`] applies the config and spawns
//! in one step; no other thread may be created from the same thread in
//! between. Host builds ignore core and priority.

use std::thread::JoinHandle;

use log::{info, warn};

use crate::error::{Error, Result};

/// CPU core identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Core {
    /// Core 0 (PRO_CPU), shared with the radio stack.
    Pro = 0,
    /// Core 1 (APP_CPU).
    App = 1,
}

/// Placement and sizing of a pinned task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskSpec {
    /// NUL-terminated task name, e.g. `"fsm\0"`.
    pub name: &'static str,
    pub core: Core,
    pub priority: u8,
    pub stack_kb: usize,
}

impl TaskSpec {
    fn display_name(&self) -> &'static str {
        self.name.trim_end_matches('\0')
    }
}

/// Spawn `f` as a task placed according to `spec`.
pub fn spawn_on_core(spec: TaskSpec, f: impl FnOnce() + Send + 'static) -> Result<JoinHandle<()>> {
    if !spec.name.ends_with('\0') {
        return Err(Error::Init("task name must be NUL-terminated"));
    }
    configure(&spec)?;

    info!(
        "task {}: {:?}, priority {}, {} KB stack",
        spec.display_name(),
        spec.core,
        spec.priority,
        spec.stack_kb
    );

    builder(&spec).spawn(f).map_err(|e| {
        warn!("task {}: spawn failed: {}", spec.display_name(), e);
        Error::Init("thread spawn failed")
    })
}

#[cfg(target_os = "espidf")]
fn configure(spec: &TaskSpec) -> Result<()> {
    // SAFETY: `cfg` is fully initialised by the IDF default constructor and
    // `name` is a NUL-terminated 'static string, so the pointer outlives
    // the task it names.
    let ret = unsafe {
        let mut cfg = esp_idf_sys::esp_create_default_pthread_config();
        cfg.pin_to_core = spec.core as i32;
        cfg.prio = i32::from(spec.priority);
        cfg.stack_size = (spec.stack_kb * 1024) as i32;
        cfg.thread_name = spec.name.as_ptr().cast();
        esp_idf_sys::esp_pthread_set_cfg(&cfg)
    };
    if ret == esp_idf_sys::ESP_OK as i32 {
        Ok(())
    } else {
        warn!("task {}: esp_pthread_set_cfg returned {}", spec.display_name(), ret);
        Err(Error::Init("esp_pthread_set_cfg failed"))
    }
}

#[cfg(not(target_os = "espidf"))]
fn configure(_spec: &TaskSpec) -> Result<()> {
    Ok(())
}

/// The pthread config already carries the stack size on ESP-IDF.
#[cfg(target_os = "espidf")]
fn builder(spec: &TaskSpec) -> std::thread::Builder {
    std::thread::Builder::new().name(spec.display_name().into())
}

/// Host stacks get a floor: debug builds need far more than the MCU does.
#[cfg(not(target_os = "espidf"))]
fn builder(spec: &TaskSpec) -> std::thread::Builder {
    std::thread::Builder::new()
        .name(spec.display_name().into())
        .stack_size(spec.stack_kb.max(64) * 1024)
}
