//! Persistent-store records.
//!
//! Every persisted record is a packed little-endian blob under a 16-bit
//! PS key.  Versioning is by length only: a stored blob whose length
//! differs from the record's current layout is ignored and the record's
//! defaults are installed instead.  The next mutation writes the new
//! layout back.
//!
//! Writes are coalesced per record: each record owns a debounce soft
//! timer, and every mutation re-arms it.  The save runs when the timer
//! expires, so a burst of mutations produces a single flash write.

use log::{info, warn};

use crate::app::ports::StoragePort;
use crate::error::StorageError;
use crate::timer::{TimerId, TimerService};

/// Largest record layout, sizes every encode/decode buffer.
pub const MAX_RECORD_LEN: usize = 64;

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// 16-bit persistent-storage key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PsKey(pub u16);

impl PsKey {
    /// Lightbulb state.
    pub const LIGHTBULB_STATE: Self = Self(0x4004);
    /// Light Controller state.
    pub const LC_STATE: Self = Self(0x4005);
    /// Light Controller property table.
    pub const LC_PROPERTY_STATE: Self = Self(0x4006);
    /// Highest temperature seen from the stream LPN (×100 °C).
    pub const MAX_TEMPERATURE: Self = Self(0xA000);
    /// Authorized-personnel flag.
    pub const AUTHORIZED: Self = Self(0xB000);
    /// Local button press counter.
    pub const BUTTON_COUNT: Self = Self(0xC000);
}

impl core::fmt::Display for PsKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "0x{:04x}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Packed little-endian codec
// ---------------------------------------------------------------------------

/// Fixed-buffer little-endian writer.
pub struct ByteWriter {
    buf: [u8; MAX_RECORD_LEN],
    len: usize,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self {
            buf: [0; MAX_RECORD_LEN],
            len: 0,
        }
    }

    fn put(&mut self, bytes: &[u8]) {
        let end = (self.len + bytes.len()).min(MAX_RECORD_LEN);
        let n = end - self.len;
        self.buf[self.len..end].copy_from_slice(&bytes[..n]);
        self.len = end;
    }

    pub fn u8(&mut self, v: u8) {
        self.put(&[v]);
    }

    pub fn u16(&mut self, v: u16) {
        self.put(&v.to_le_bytes());
    }

    pub fn i16(&mut self, v: i16) {
        self.put(&v.to_le_bytes());
    }

    /// 24-bit field as used by mesh device properties.
    pub fn u24(&mut self, v: u32) {
        self.put(&v.to_le_bytes()[..3]);
    }

    pub fn f32(&mut self, v: f32) {
        self.put(&v.to_le_bytes());
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

impl Default for ByteWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Little-endian reader.  Reads past the end yield zeroes; callers check
/// the length before decoding.
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        let end = (self.pos + N).min(self.data.len());
        if self.pos < end {
            out[..end - self.pos].copy_from_slice(&self.data[self.pos..end]);
        }
        self.pos += N;
        out
    }

    pub fn u8(&mut self) -> u8 {
        self.take::<1>()[0]
    }

    pub fn u16(&mut self) -> u16 {
        u16::from_le_bytes(self.take())
    }

    pub fn i16(&mut self) -> i16 {
        i16::from_le_bytes(self.take())
    }

    pub fn u24(&mut self) -> u32 {
        let [a, b, c] = self.take::<3>();
        u32::from_le_bytes([a, b, c, 0])
    }

    pub fn f32(&mut self) -> f32 {
        f32::from_le_bytes(self.take())
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A fixed-layout record mirrored to a PS key.
pub trait PsRecord: Sized {
    /// Storage key.
    const KEY: PsKey;
    /// Exact encoded length of the current layout.
    const LEN: usize;
    /// Debounce timer owned by this record.
    const SAVE_TIMER: TimerId;

    fn encode(&self, w: &mut ByteWriter);
    fn decode(r: &mut ByteReader<'_>) -> Self;
    fn defaults() -> Self;
}

/// Load a record, installing defaults when the key is missing, unreadable
/// or stored with a different length.
pub fn load_record<R: PsRecord>(storage: &impl StoragePort) -> R {
    let mut buf = [0u8; MAX_RECORD_LEN];
    match storage.load(R::KEY, &mut buf) {
        Ok(len) if len == R::LEN => {
            info!("STORE | loaded {} ({} bytes)", R::KEY, len);
            R::decode(&mut ByteReader::new(&buf[..len]))
        }
        Ok(len) => {
            warn!(
                "STORE | {} length {} != expected {}, restoring defaults",
                R::KEY,
                len,
                R::LEN
            );
            R::defaults()
        }
        Err(StorageError::NotFound) => {
            info!("STORE | {} not found, using defaults", R::KEY);
            R::defaults()
        }
        Err(e) => {
            warn!("STORE | {} load failed ({}), using defaults", R::KEY, e);
            R::defaults()
        }
    }
}

/// Write a record through to flash.
pub fn save_record<R: PsRecord>(
    record: &R,
    storage: &mut impl StoragePort,
) -> Result<(), StorageError> {
    let mut w = ByteWriter::new();
    record.encode(&mut w);
    storage.save(R::KEY, w.as_bytes())?;
    info!("STORE | saved {} ({} bytes)", R::KEY, w.as_bytes().len());
    Ok(())
}

/// Arm (or re-arm) the debounce timer of a mutated record.
pub fn mark_dirty<R: PsRecord>(timers: &mut TimerService, debounce_ms: u32) {
    if let Err(e) = timers.set(R::SAVE_TIMER, debounce_ms, false) {
        warn!("STORE | cannot schedule save of {}: {}", R::KEY, e);
    }
}

// ---------------------------------------------------------------------------
// Single-value application records
// ---------------------------------------------------------------------------

/// Highest temperature reported by the stream LPN, ×100 °C.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MaxTemperature(pub u16);

impl PsRecord for MaxTemperature {
    const KEY: PsKey = PsKey::MAX_TEMPERATURE;
    const LEN: usize = 2;
    const SAVE_TIMER: TimerId = TimerId::SaveMaxTemp;

    fn encode(&self, w: &mut ByteWriter) {
        w.u16(self.0);
    }

    fn decode(r: &mut ByteReader<'_>) -> Self {
        Self(r.u16())
    }

    fn defaults() -> Self {
        Self(0)
    }
}

/// Whether authorized personnel are present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Authorized(pub bool);

impl PsRecord for Authorized {
    const KEY: PsKey = PsKey::AUTHORIZED;
    const LEN: usize = 1;
    const SAVE_TIMER: TimerId = TimerId::SaveAuthorized;

    fn encode(&self, w: &mut ByteWriter) {
        w.u8(u8::from(self.0));
    }

    fn decode(r: &mut ByteReader<'_>) -> Self {
        Self(r.u8() != 0)
    }

    fn defaults() -> Self {
        Self(false)
    }
}

/// Local button press counter (wraps at 255).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ButtonCount(pub u8);

impl PsRecord for ButtonCount {
    const KEY: PsKey = PsKey::BUTTON_COUNT;
    const LEN: usize = 1;
    const SAVE_TIMER: TimerId = TimerId::SaveButtonCount;

    fn encode(&self, w: &mut ByteWriter) {
        w.u8(self.0);
    }

    fn decode(r: &mut ByteReader<'_>) -> Self {
        Self(r.u8())
    }

    fn defaults() -> Self {
        Self(0)
    }
}
