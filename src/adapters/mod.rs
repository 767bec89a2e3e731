//! Adapters: concrete implementations of the port traits.
//!
//! | Adapter    | Implements    | Connects to                 |
//! |------------|---------------|-----------------------------|
//! | `hardware` | PowerSwitch   | any `embedded-hal` OutputPin|
//! | `log_sink` | LineSink      | Serial log output           |
//! | `time`     | Clock         | esp_timer / std Instant     |
//! | `uart`     | SerialPort    | ESP-IDF UART driver + mux   |

pub mod hardware;
pub mod log_sink;
pub mod time;
#[cfg(target_os = "espidf")]
pub mod uart;
