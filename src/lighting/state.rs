//! Persisted lightbulb state (PS key 0x4004).

use crate::mesh::models::{OnOff, OnPowerUp};
use crate::store::{ByteReader, ByteWriter, PsKey, PsRecord};
use crate::timer::TimerId;

pub const DEFAULT_TEMPERATURE: u16 = 6_500;
pub const MIN_TEMPERATURE: u16 = 800;
pub const MAX_TEMPERATURE: u16 = 20_000;
pub const DEFAULT_DELTAUV: i16 = 0;

/// Every lighting server state of the node.
///
/// `*_target` is the commanded value, `*_current` follows the physical
/// output.  The field order is the on-flash layout: 40 packed
/// little-endian bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightbulbState {
    pub onoff_current: OnOff,
    pub onoff_target: OnOff,
    /// Default transition time, mesh-encoded.
    pub transtime: u8,
    pub onpowerup: OnPowerUp,

    pub lightness_current: u16,
    pub lightness_target: u16,
    /// Last non-zero lightness, restored when switched on.
    pub lightness_last: u16,
    pub lightness_default: u16,
    pub lightness_min: u16,
    pub lightness_max: u16,

    pub pri_level_current: i16,
    pub pri_level_target: i16,

    pub temperature_current: u16,
    pub temperature_target: u16,
    pub temperature_default: u16,
    pub temperature_min: u16,
    pub temperature_max: u16,

    pub deltauv_current: i16,
    pub deltauv_target: i16,
    pub deltauv_default: i16,

    pub sec_level_current: i16,
    pub sec_level_target: i16,
}

impl LightbulbState {
    /// Clamp a non-zero lightness into `[lightness_min, lightness_max]`.
    pub fn clamp_lightness(&self, lightness: u16) -> u16 {
        if lightness == 0 || self.lightness_min > self.lightness_max {
            lightness
        } else {
            lightness.clamp(self.lightness_min, self.lightness_max)
        }
    }

    pub fn clamp_temperature(&self, temperature: u16) -> u16 {
        if self.temperature_min > self.temperature_max {
            temperature
        } else {
            temperature.clamp(self.temperature_min, self.temperature_max)
        }
    }

    /// Pull every current and target value back inside the configured ranges.
    pub fn enforce_ranges(&mut self) {
        self.lightness_current = self.clamp_lightness(self.lightness_current);
        self.lightness_target = self.clamp_lightness(self.lightness_target);
        self.temperature_current = self.clamp_temperature(self.temperature_current);
        self.temperature_target = self.clamp_temperature(self.temperature_target);
    }
}

impl PsRecord for LightbulbState {
    const KEY: PsKey = PsKey::LIGHTBULB_STATE;
    const LEN: usize = 40;
    const SAVE_TIMER: TimerId = TimerId::SaveLightbulb;

    fn encode(&self, w: &mut ByteWriter) {
        w.u8(self.onoff_current.raw());
        w.u8(self.onoff_target.raw());
        w.u8(self.transtime);
        w.u8(self.onpowerup.raw());
        w.u16(self.lightness_current);
        w.u16(self.lightness_target);
        w.u16(self.lightness_last);
        w.u16(self.lightness_default);
        w.u16(self.lightness_min);
        w.u16(self.lightness_max);
        w.i16(self.pri_level_current);
        w.i16(self.pri_level_target);
        w.u16(self.temperature_current);
        w.u16(self.temperature_target);
        w.u16(self.temperature_default);
        w.u16(self.temperature_min);
        w.u16(self.temperature_max);
        w.i16(self.deltauv_current);
        w.i16(self.deltauv_target);
        w.i16(self.deltauv_default);
        w.i16(self.sec_level_current);
        w.i16(self.sec_level_target);
    }

    fn decode(r: &mut ByteReader<'_>) -> Self {
        Self {
            onoff_current: OnOff::from_raw(r.u8()),
            onoff_target: OnOff::from_raw(r.u8()),
            transtime: r.u8(),
            onpowerup: OnPowerUp::from_raw(r.u8()),
            lightness_current: r.u16(),
            lightness_target: r.u16(),
            lightness_last: r.u16(),
            lightness_default: r.u16(),
            lightness_min: r.u16(),
            lightness_max: r.u16(),
            pri_level_current: r.i16(),
            pri_level_target: r.i16(),
            temperature_current: r.u16(),
            temperature_target: r.u16(),
            temperature_default: r.u16(),
            temperature_min: r.u16(),
            temperature_max: r.u16(),
            deltauv_current: r.i16(),
            deltauv_target: r.i16(),
            deltauv_default: r.i16(),
            sec_level_current: r.i16(),
            sec_level_target: r.i16(),
        }
    }

    fn defaults() -> Self {
        Self {
            onoff_current: OnOff::Off,
            onoff_target: OnOff::Off,
            transtime: 0,
            onpowerup: OnPowerUp::Off,
            lightness_current: 0,
            lightness_target: 0,
            lightness_last: 0xFFFF,
            lightness_default: 0,
            lightness_min: 0x0001,
            lightness_max: 0xFFFF,
            pri_level_current: 0,
            pri_level_target: 0,
            temperature_current: 0,
            temperature_target: 0,
            temperature_default: DEFAULT_TEMPERATURE,
            temperature_min: MIN_TEMPERATURE,
            temperature_max: MAX_TEMPERATURE,
            deltauv_current: 0,
            deltauv_target: 0,
            deltauv_default: DEFAULT_DELTAUV,
            sec_level_current: 0,
            sec_level_target: 0,
        }
    }
}

impl Default for LightbulbState {
    fn default() -> Self {
        Self::defaults()
    }
}
