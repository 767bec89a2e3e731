//! Device drivers and thread helpers.

pub mod task_pin;
pub mod uart;
