//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter       | Implements          | Connects to               |
//! |---------------|---------------------|---------------------------|
//! | `console_log` | `log::Log`          | stderr (host builds)      |
//! | `log_sink`    | EventSink           | Serial log output         |
//! | `nvs`         | ConfigPort          | NVS / in-memory store     |
//! |               | StoragePort         |                           |
//! | `sim`         | every `NodeHw` port | Virtual clock, mock stack |
//! | `time`        | n/a                 | ESP32 system timer        |

#[cfg(not(target_os = "espidf"))]
pub mod console_log;
pub mod log_sink;
pub mod nvs;
pub mod sim;
pub mod time;
