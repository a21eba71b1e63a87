//! Unified error types for the room-node firmware.
//!
//! A single `Error` enum that every subsystem converts into, keeping the
//! event loop's error handling uniform.  All variants are `Copy` so they
//! can be passed through handlers and the acquisition FSM without
//! allocation.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Persistent store access failed.
    Storage(StorageError),
    /// An I²C transfer failed.
    I2c(I2cError),
    /// The mesh stack rejected a command.
    Mesh(MeshError),
    /// A soft timer could not be armed.
    Timer(TimerError),
    /// Peripheral initialisation failed.
    Init(&'static str),
    /// Configuration is invalid or could not be loaded.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::I2c(e) => write!(f, "i2c: {e}"),
            Self::Mesh(e) => write!(f, "mesh: {e}"),
            Self::Timer(e) => write!(f, "timer: {e}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl core::error::Error for Error {}

// ---------------------------------------------------------------------------
// Storage errors
// ---------------------------------------------------------------------------

/// Errors from [`StoragePort`](crate::app::ports::StoragePort) operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Flash controller busy with a previous write.
    Busy,
    /// Storage partition is full.
    Full,
    /// Generic I/O error.
    IoError,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Busy => write!(f, "flash busy"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

// ---------------------------------------------------------------------------
// I²C errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum I2cError {
    /// The peripheral did not acknowledge its address or data.
    Nack,
    /// Arbitration lost or bus fault.
    Bus,
    /// Transfer did not complete in time.
    Timeout,
    /// A transfer was requested while another was still in flight.
    Busy,
}

impl fmt::Display for I2cError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nack => write!(f, "NACK"),
            Self::Bus => write!(f, "bus error"),
            Self::Timeout => write!(f, "timeout"),
            Self::Busy => write!(f, "transfer in flight"),
        }
    }
}

impl From<I2cError> for Error {
    fn from(e: I2cError) -> Self {
        Self::I2c(e)
    }
}

// ---------------------------------------------------------------------------
// Mesh stack errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshError {
    /// The stack returned a non-zero result code.
    Stack(u16),
    /// No handler is registered for the (model, element) pair.
    NoHandler,
    /// The handler table has no free slot.
    TableFull,
    /// The node is not provisioned yet.
    NotProvisioned,
}

impl MeshError {
    /// Raw result code as shown on the LCD.
    pub const fn code(self) -> u16 {
        match self {
            Self::Stack(code) => code,
            Self::TableFull => 0x0501,
            Self::NoHandler => 0x0502,
            Self::NotProvisioned => 0x0503,
        }
    }
}

impl fmt::Display for MeshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stack(code) => write!(f, "stack result 0x{code:04x}"),
            Self::NoHandler => write!(f, "no handler registered"),
            Self::TableFull => write!(f, "handler table full"),
            Self::NotProvisioned => write!(f, "node not provisioned"),
        }
    }
}

impl From<MeshError> for Error {
    fn from(e: MeshError) -> Self {
        Self::Mesh(e)
    }
}

// ---------------------------------------------------------------------------
// Timer errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerError {
    /// The handle is in terminal teardown and cannot be re-armed.
    Retired(u8),
}

impl fmt::Display for TimerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Retired(handle) => write!(f, "timer handle {handle} retired"),
        }
    }
}

impl From<TimerError> for Error {
    fn from(e: TimerError) -> Self {
        Self::Timer(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
