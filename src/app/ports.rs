//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ AppService (domain)
//! ```
//!
//! Driven adapters (mesh stack, LED driver, LCD, GPIO, I²C, flash) implement
//! these traits.  The [`AppService`](super::service::AppService) consumes
//! them via generics, so the domain core never touches hardware directly.
//!
//! Every hardware-facing port is folded into [`NodeHw`] so handlers take a
//! single `&mut impl NodeHw` and avoid juggling several mutable borrows.

use crate::config::NodeConfig;
use crate::error::{I2cError, MeshError, StorageError};
use crate::mesh::models::{ModelId, OnOff, ServerStatus, StateKind};
use crate::power::EnergyMode;
use crate::store::PsKey;

// ───────────────────────────────────────────────────────────────
// Mesh stack port (driven adapter: domain ↔ mesh library)
// ───────────────────────────────────────────────────────────────

/// How the node restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ResetMode {
    /// Ordinary reboot.
    Normal = 0,
    /// Reboot into the OTA DFU bootloader.
    Dfu = 2,
}

/// Black-box mesh stack: node lifecycle, server models, GATT connection.
pub trait MeshPort {
    /// Public Bluetooth address, least-significant byte first.
    fn bt_address(&self) -> [u8; 6];

    /// Write the GATT device-name characteristic.
    fn set_device_name(&mut self, name: &str) -> Result<(), MeshError>;

    /// Initialise the mesh node.  Completion arrives as
    /// `MeshEvent::NodeInitialized`.
    fn node_init(&mut self) -> Result<(), MeshError>;

    /// Start unprovisioned beaconing on the given bearer mask.
    fn start_unprov_beaconing(&mut self, bearers: u8) -> Result<(), MeshError>;

    /// Initialise the generic server models.
    fn generic_server_init(&mut self) -> Result<(), MeshError>;

    /// Initialise the model library with room for `max_models` handlers.
    fn lib_init(&mut self, max_models: u8) -> Result<(), MeshError>;

    /// Enable the Friend role.
    fn friend_init(&mut self) -> Result<(), MeshError>;

    /// Register interest in requests for a (model, element) pair.
    fn register_model(&mut self, model: ModelId, element: u16) -> Result<(), MeshError>;

    /// Send a status response to a client.
    fn server_respond(
        &mut self,
        client: u16,
        appkey: u16,
        status: &ServerStatus,
        flags: u8,
    ) -> Result<(), MeshError>;

    /// Inform the mesh library of a server state change.
    fn server_update(&mut self, status: &ServerStatus) -> Result<(), MeshError>;

    /// Publish a server state to the configured publish address.
    fn server_publish(&mut self, model: ModelId, element: u16, kind: StateKind)
    -> Result<(), MeshError>;

    /// Initialise the scene server and scene setup server.
    fn scene_server_init(&mut self, element: u16) -> Result<(), MeshError>;

    /// Close the GATT connection with the given handle.
    fn close_connection(&mut self, handle: u8) -> Result<(), MeshError>;

    /// Acknowledge a write to the OTA control characteristic.
    fn ota_write_response(&mut self, handle: u8) -> Result<(), MeshError>;

    /// Reset the system.  Does not return on hardware.
    fn system_reset(&mut self, mode: ResetMode);
}

// ───────────────────────────────────────────────────────────────
// Light Controller server port (driven adapter: domain ↔ LC model)
// ───────────────────────────────────────────────────────────────

/// The LC server and LC setup server living in the mesh library.
pub trait LcServerPort {
    fn lc_server_init(&mut self, element: u16) -> Result<(), MeshError>;
    fn lc_set_regulator_interval(&mut self, element: u16, interval_ms: u16)
    -> Result<(), MeshError>;
    fn lc_update_mode(&mut self, element: u16, mode: u8) -> Result<(), MeshError>;
    fn lc_update_om(&mut self, element: u16, om: u8) -> Result<(), MeshError>;
    fn lc_update_light_onoff(
        &mut self,
        element: u16,
        value: OnOff,
        remaining_ms: u32,
    ) -> Result<(), MeshError>;
    /// Load one property value into the LC setup server.
    fn lc_update_property(&mut self, element: u16, id: u16, data: &[u8])
    -> Result<(), MeshError>;
}

// ───────────────────────────────────────────────────────────────
// LED driver port (driven adapter: domain → PWM LED)
// ───────────────────────────────────────────────────────────────

/// Whole-LED on/off state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedState {
    Off,
    On,
}

/// Dimmable, tunable-white LED.  The driver holds one setpoint at a time;
/// a new command replaces any ramp in progress.
pub trait LedPort {
    /// Ramp lightness to `level` over `transition_ms` (0 = immediate).
    fn set_level(&mut self, level: u16, transition_ms: u32);

    /// Ramp colour temperature over `transition_ms` (0 = immediate).
    fn set_temperature(&mut self, temperature: u16, deltauv: i16, transition_ms: u32);

    fn set_state(&mut self, state: LedState);

    /// Lightness the LED is producing right now (sampled mid-ramp).
    fn level(&self) -> u16;

    /// Colour temperature the LED is producing right now.
    fn temperature(&self) -> u16;
}

// ───────────────────────────────────────────────────────────────
// Indicator port (driven adapter: domain → status / alert LEDs)
// ───────────────────────────────────────────────────────────────

pub trait IndicatorPort {
    /// Light the red alert LED.
    fn red_alert(&mut self);
    /// Clear the alert LED.
    fn clear_alert(&mut self);
    /// Toggle the status LED (provisioning blink).
    fn toggle_status(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Display port (driven adapter: domain → LCD)
// ───────────────────────────────────────────────────────────────

/// Logical LCD rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LcdRow {
    Name,
    BtAddr,
    Action,
    TempValue,
    Temperature,
    Accelerometer,
    Ultrasonic,
    Alert,
    Authority,
    Connection,
    BtAddr2,
}

pub trait DisplayPort {
    /// Replace the contents of one row.  An empty string clears it.
    fn write_row(&mut self, row: LcdRow, text: &str);
}

// ───────────────────────────────────────────────────────────────
// GPIO port (driven adapter: domain ↔ pins)
// ───────────────────────────────────────────────────────────────

/// Interrupt edge selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Rising,
    Falling,
    Both,
}

pub trait GpioPort {
    /// Logic level of an input pin (`true` = high).
    fn pin_read(&self, gpio: i32) -> bool;

    /// Configure and enable the external interrupt of an input pin.
    fn configure_edge(&mut self, gpio: i32, edge: Edge);
}

// ───────────────────────────────────────────────────────────────
// I²C port (driven adapter: domain ↔ sensor bus)
// ───────────────────────────────────────────────────────────────

/// Interrupt-driven I²C controller.  `start_*` returns as soon as the
/// transfer is queued; completion is signalled through the external
/// signal word and collected with `finish_*`.
pub trait I2cPort {
    /// Switch the sensor load-power rails.
    fn set_rails(&mut self, on: bool);

    fn start_write(&mut self, addr: u8, data: &[u8]) -> Result<(), I2cError>;

    fn finish_write(&mut self) -> Result<(), I2cError>;

    fn start_read(&mut self, addr: u8) -> Result<(), I2cError>;

    /// Collect the two data bytes of a completed read.
    fn finish_read(&mut self) -> Result<[u8; 2], I2cError>;
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ flash PS store)
// ───────────────────────────────────────────────────────────────

/// Write-through flash keyed by 16-bit PS keys.
pub trait StoragePort {
    /// Read a record.  Copies at most `buf.len()` bytes and returns the
    /// **stored** length, so callers can detect layout mismatches.
    fn load(&self, key: PsKey, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write a record atomically.
    fn save(&mut self, key: PsKey, data: &[u8]) -> Result<(), StorageError>;

    /// Erase every record (factory reset).
    fn erase_all(&mut self) -> Result<(), StorageError>;
}

// ───────────────────────────────────────────────────────────────
// Clock & sleep port (driven adapter: domain ↔ LF clock / EMU)
// ───────────────────────────────────────────────────────────────

pub trait ClockPort {
    /// Free-running 32 768 Hz counter.
    fn now_ticks(&self) -> u64;

    /// Enter `mode` until an interrupt or the counter reaches `wake_at`.
    fn sleep(&mut self, mode: EnergyMode, wake_at: Option<u64>);
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists node configuration.
///
/// Implementations MUST validate config values before persisting.
/// Invalid ranges are rejected with [`ConfigError::ValidationFailed`],
/// not silently clamped.
pub trait ConfigPort {
    /// Returns [`NodeConfig::default()`] if no stored config exists.
    fn load_config(&self) -> Result<NodeConfig, ConfigError>;

    fn save_config(&mut self, config: &NodeConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Combined hardware port
// ───────────────────────────────────────────────────────────────

/// Everything the event loop drives.
pub trait NodeHw:
    MeshPort + LcServerPort + LedPort + IndicatorPort + DisplayPort + GpioPort + I2cPort
    + StoragePort + ClockPort
{
}

impl<T> NodeHw for T where
    T: MeshPort
        + LcServerPort
        + LedPort
        + IndicatorPort
        + DisplayPort
        + GpioPort
        + I2cPort
        + StoragePort
        + ClockPort
{
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug)]
pub enum ConfigError {
    /// Stored config failed deserialization.
    Corrupted,
    /// A config field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
    /// Generic I/O error from the storage backend.
    IoError,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl core::error::Error for ConfigError {}
