//! GPIO / peripheral pin assignments for the room-node board.
//!
//! Single source of truth: every driver references this module rather than
//! hard-coding pin numbers.

// ---------------------------------------------------------------------------
// Push-buttons (active-low with pull-up)
// ---------------------------------------------------------------------------

/// PB0: reset-request at boot, local on/off button afterwards.
pub const PB0_GPIO: i32 = 6;
/// PB1: second reset-request button, sampled only at boot.
pub const PB1_GPIO: i32 = 7;

// ---------------------------------------------------------------------------
// Motion sensor (PIR)
// ---------------------------------------------------------------------------

/// PIR output.  Edge polarity follows the authorization mode.
pub const MOTION_GPIO: i32 = 11;

// ---------------------------------------------------------------------------
// Indicator LEDs
// ---------------------------------------------------------------------------

/// Provisioning / status LED.
pub const LED0_GPIO: i32 = 4;
/// Red alert LED.
pub const LED1_GPIO: i32 = 5;

// ---------------------------------------------------------------------------
// I²C bus (Si7021 humidity / temperature sensor)
// ---------------------------------------------------------------------------

pub const I2C_SDA_GPIO: i32 = 12;
pub const I2C_SCL_GPIO: i32 = 10;
/// Sensor load-power enable.  The rails are cut in POWER_OFF.
pub const SENSOR_ENABLE_GPIO: i32 = 15;
/// Si7021 7-bit bus address.
pub const SI7021_ADDR: u8 = 0x40;
/// Standard-mode bus clock.
pub const I2C_FREQ_HZ: u32 = 100_000;
