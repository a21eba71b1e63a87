//! Node configuration parameters
//!
//! All tunable parameters for the room-monitoring node.
//! Values can be overridden via NVS (non-volatile storage).

use serde::{Deserialize, Serialize};

/// Core node configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    // --- LPN client addresses ---
    /// Unicast address of the LPN whose on/off toggles authorization and
    /// whose level carries ultrasonic distance.
    pub authority_client_addr: u16,
    /// Unicast address of the LPN whose on/off selects the level stream
    /// (temperature vs accelerometer).
    pub stream_client_addr: u16,

    // --- Rule thresholds ---
    /// Temperature alert threshold in hundredths of a degree Celsius.
    pub high_temp_centi_c: i16,
    /// Accelerometer magnitude above which a fall is reported.
    pub fall_threshold: i16,

    // --- Timing ---
    /// Delay between a reset request and the actual system reset (ms).
    pub restart_delay_ms: u32,
    /// Provisioning LED blink period (ms).
    pub provisioning_blink_ms: u32,
    /// Write-coalescing window for every persisted record (ms).
    pub save_debounce_ms: u32,
    /// Sensor acquisition period (ms).
    pub acquisition_period_ms: u32,
    /// Sensor conversion wait between write and read (ms).
    pub conversion_wait_ms: u32,
    /// Rail stabilisation time after power-up; 0 = proceed immediately (ms).
    pub rail_settle_ms: u32,
    /// Light Controller PI regulator interval (ms).
    pub lc_regulator_interval_ms: u16,

    // --- Features ---
    /// Register the lighting model handlers at boot.
    pub lighting_enabled: bool,
    /// Maximum number of models handed to the mesh library.
    pub max_models: u8,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            // LPN clients
            authority_client_addr: 3,
            stream_client_addr: 2,

            // Rules
            high_temp_centi_c: 3400, // 34.00 °C
            fall_threshold: 2900,

            // Timing
            restart_delay_ms: 62,
            provisioning_blink_ms: 250,
            save_debounce_ms: 5000,
            acquisition_period_ms: 3000,
            conversion_wait_ms: 10,
            rail_settle_ms: 0,
            lc_regulator_interval_ms: 100,

            // Features
            lighting_enabled: true,
            max_models: 11,
        }
    }
}
