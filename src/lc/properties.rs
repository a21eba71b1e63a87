//! Light Controller property table (PS key 0x4006).
//!
//! Eighteen mesh device properties configure the controller's phase
//! timings, lightness and ambient lux levels per phase, and the PI
//! regulator.  Each travels on the wire as a little-endian value whose
//! width depends on its characteristic type.

use core::fmt;

use heapless::Vec;

use crate::mesh::MAX_PROPERTY_LEN;
use crate::store::{ByteReader, ByteWriter, PsKey, PsRecord};
use crate::timer::TimerId;

/// Regulator accuracy value meaning "not known".
pub const ACCURACY_UNKNOWN: u8 = 0xFF;

// ---------------------------------------------------------------------------
// Property identities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LcProperty {
    TimeOccupancyDelay,
    TimeFadeOn,
    TimeRunOn,
    TimeFade,
    TimeProlong,
    TimeFadeStandbyAuto,
    TimeFadeStandbyManual,
    LightnessOn,
    LightnessProlong,
    LightnessStandby,
    AmbientLuxLevelOn,
    AmbientLuxLevelProlong,
    AmbientLuxLevelStandby,
    RegulatorKiu,
    RegulatorKid,
    RegulatorKpu,
    RegulatorKpd,
    RegulatorAccuracy,
}

impl LcProperty {
    /// Every property, in the order they are loaded into the LC setup server.
    pub const ALL: [Self; 18] = [
        Self::TimeOccupancyDelay,
        Self::TimeFadeOn,
        Self::TimeRunOn,
        Self::TimeFade,
        Self::TimeProlong,
        Self::TimeFadeStandbyAuto,
        Self::TimeFadeStandbyManual,
        Self::LightnessOn,
        Self::LightnessProlong,
        Self::LightnessStandby,
        Self::AmbientLuxLevelOn,
        Self::AmbientLuxLevelProlong,
        Self::AmbientLuxLevelStandby,
        Self::RegulatorKiu,
        Self::RegulatorKid,
        Self::RegulatorKpu,
        Self::RegulatorKpd,
        Self::RegulatorAccuracy,
    ];

    /// Mesh device property ID.
    pub const fn id(self) -> u16 {
        match self {
            Self::AmbientLuxLevelOn => 0x002B,
            Self::AmbientLuxLevelProlong => 0x002C,
            Self::AmbientLuxLevelStandby => 0x002D,
            Self::LightnessOn => 0x002E,
            Self::LightnessProlong => 0x002F,
            Self::LightnessStandby => 0x0030,
            Self::RegulatorAccuracy => 0x0031,
            Self::RegulatorKid => 0x0032,
            Self::RegulatorKiu => 0x0033,
            Self::RegulatorKpd => 0x0034,
            Self::RegulatorKpu => 0x0035,
            Self::TimeFade => 0x0036,
            Self::TimeFadeOn => 0x0037,
            Self::TimeFadeStandbyAuto => 0x0038,
            Self::TimeFadeStandbyManual => 0x0039,
            Self::TimeOccupancyDelay => 0x003A,
            Self::TimeProlong => 0x003B,
            Self::TimeRunOn => 0x003C,
        }
    }

    pub fn from_id(id: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.id() == id)
    }

    /// Encoded value width in bytes.
    pub const fn value_len(self) -> usize {
        match self {
            Self::TimeOccupancyDelay
            | Self::TimeFadeOn
            | Self::TimeRunOn
            | Self::TimeFade
            | Self::TimeProlong
            | Self::TimeFadeStandbyAuto
            | Self::TimeFadeStandbyManual
            | Self::AmbientLuxLevelOn
            | Self::AmbientLuxLevelProlong
            | Self::AmbientLuxLevelStandby => 3,
            Self::LightnessOn | Self::LightnessProlong | Self::LightnessStandby => 2,
            Self::RegulatorKiu | Self::RegulatorKid | Self::RegulatorKpu | Self::RegulatorKpd => 4,
            Self::RegulatorAccuracy => 1,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::TimeOccupancyDelay => "Light Control Time Occupancy Delay",
            Self::TimeFadeOn => "Light Control Time Fade On",
            Self::TimeRunOn => "Light Control Time Run On",
            Self::TimeFade => "Light Control Time Fade",
            Self::TimeProlong => "Light Control Time Prolong",
            Self::TimeFadeStandbyAuto => "Light Control Time Fade Standby Auto",
            Self::TimeFadeStandbyManual => "Light Control Time Fade Standby Manual",
            Self::LightnessOn => "Light Control Lightness On",
            Self::LightnessProlong => "Light Control Lightness Prolong",
            Self::LightnessStandby => "Light Control Lightness Standby",
            Self::AmbientLuxLevelOn => "Light Control Ambient LuxLevel On",
            Self::AmbientLuxLevelProlong => "Light Control Ambient LuxLevel Prolong",
            Self::AmbientLuxLevelStandby => "Light Control Ambient LuxLevel Standby",
            Self::RegulatorKiu => "Light Control Regulator Kiu",
            Self::RegulatorKid => "Light Control Regulator Kid",
            Self::RegulatorKpu => "Light Control Regulator Kpu",
            Self::RegulatorKpd => "Light Control Regulator Kpd",
            Self::RegulatorAccuracy => "Light Control Regulator Accuracy",
        }
    }
}

// ---------------------------------------------------------------------------
// Property values
// ---------------------------------------------------------------------------

/// A typed property value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PropertyValue {
    /// Milliseconds, 24-bit.
    TimeMs(u32),
    Lightness(u16),
    /// Hundredths of a lux, 24-bit.
    Illuminance(u32),
    Coefficient(f32),
    /// Half-percent steps; 0xFF = not known.
    Percentage(u8),
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::TimeMs(ms) => write!(f, "{}.{:03}s", ms / 1000, ms % 1000),
            Self::Lightness(v) => write!(f, "{v}"),
            Self::Illuminance(v) => write!(f, "{}.{:02}lux", v / 100, v % 100),
            Self::Coefficient(k) => write!(f, "{k:.3}"),
            Self::Percentage(ACCURACY_UNKNOWN) => write!(f, "Value is not known"),
            Self::Percentage(p) => write!(f, "{}.{}%", p / 2, (p % 2) * 5),
        }
    }
}

/// Failure to decode a property write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyError {
    UnknownId(u16),
    BadLength { id: u16, len: usize },
}

impl fmt::Display for PropertyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownId(id) => write!(f, "unknown property 0x{id:04x}"),
            Self::BadLength { id, len } => {
                write!(f, "property 0x{id:04x} has invalid length {len}")
            }
        }
    }
}

impl LcProperty {
    /// Decode a wire value of this property.
    pub fn decode(self, data: &[u8]) -> Result<PropertyValue, PropertyError> {
        if data.len() != self.value_len() {
            return Err(PropertyError::BadLength {
                id: self.id(),
                len: data.len(),
            });
        }
        let mut r = ByteReader::new(data);
        Ok(match self {
            Self::LightnessOn | Self::LightnessProlong | Self::LightnessStandby => {
                PropertyValue::Lightness(r.u16())
            }
            Self::AmbientLuxLevelOn | Self::AmbientLuxLevelProlong | Self::AmbientLuxLevelStandby => {
                PropertyValue::Illuminance(r.u24())
            }
            Self::RegulatorKiu | Self::RegulatorKid | Self::RegulatorKpu | Self::RegulatorKpd => {
                PropertyValue::Coefficient(r.f32())
            }
            Self::RegulatorAccuracy => PropertyValue::Percentage(r.u8()),
            _ => PropertyValue::TimeMs(r.u24()),
        })
    }
}

/// Encode a value at its wire width.
pub fn encode_value(value: PropertyValue) -> Vec<u8, MAX_PROPERTY_LEN> {
    let mut w = ByteWriter::new();
    match value {
        PropertyValue::TimeMs(v) | PropertyValue::Illuminance(v) => w.u24(v),
        PropertyValue::Lightness(v) => w.u16(v),
        PropertyValue::Coefficient(k) => w.f32(k),
        PropertyValue::Percentage(p) => w.u8(p),
    }
    // at most four bytes were written
    Vec::from_slice(w.as_bytes()).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Persisted table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LcPropertyState {
    pub time_occupancy_delay: u32,
    pub time_fade_on: u32,
    pub time_run_on: u32,
    pub time_fade: u32,
    pub time_prolong: u32,
    pub time_fade_standby_auto: u32,
    pub time_fade_standby_manual: u32,
    pub lightness_on: u16,
    pub lightness_prolong: u16,
    pub lightness_standby: u16,
    pub ambient_luxlevel_on: u32,
    pub ambient_luxlevel_prolong: u32,
    pub ambient_luxlevel_standby: u32,
    pub regulator_kiu: f32,
    pub regulator_kid: f32,
    pub regulator_kpu: f32,
    pub regulator_kpd: f32,
    pub regulator_accuracy: u8,
}

impl LcPropertyState {
    pub fn get(&self, property: LcProperty) -> PropertyValue {
        use LcProperty as P;
        use PropertyValue as V;
        match property {
            P::TimeOccupancyDelay => V::TimeMs(self.time_occupancy_delay),
            P::TimeFadeOn => V::TimeMs(self.time_fade_on),
            P::TimeRunOn => V::TimeMs(self.time_run_on),
            P::TimeFade => V::TimeMs(self.time_fade),
            P::TimeProlong => V::TimeMs(self.time_prolong),
            P::TimeFadeStandbyAuto => V::TimeMs(self.time_fade_standby_auto),
            P::TimeFadeStandbyManual => V::TimeMs(self.time_fade_standby_manual),
            P::LightnessOn => V::Lightness(self.lightness_on),
            P::LightnessProlong => V::Lightness(self.lightness_prolong),
            P::LightnessStandby => V::Lightness(self.lightness_standby),
            P::AmbientLuxLevelOn => V::Illuminance(self.ambient_luxlevel_on),
            P::AmbientLuxLevelProlong => V::Illuminance(self.ambient_luxlevel_prolong),
            P::AmbientLuxLevelStandby => V::Illuminance(self.ambient_luxlevel_standby),
            P::RegulatorKiu => V::Coefficient(self.regulator_kiu),
            P::RegulatorKid => V::Coefficient(self.regulator_kid),
            P::RegulatorKpu => V::Coefficient(self.regulator_kpu),
            P::RegulatorKpd => V::Coefficient(self.regulator_kpd),
            P::RegulatorAccuracy => V::Percentage(self.regulator_accuracy),
        }
    }

    /// Store a decoded value.  Values of the wrong type for the property
    /// are ignored and `false` is returned.
    pub fn set(&mut self, property: LcProperty, value: PropertyValue) -> bool {
        use LcProperty as P;
        use PropertyValue as V;
        let slot_u24 = match property {
            P::TimeOccupancyDelay => Some(&mut self.time_occupancy_delay),
            P::TimeFadeOn => Some(&mut self.time_fade_on),
            P::TimeRunOn => Some(&mut self.time_run_on),
            P::TimeFade => Some(&mut self.time_fade),
            P::TimeProlong => Some(&mut self.time_prolong),
            P::TimeFadeStandbyAuto => Some(&mut self.time_fade_standby_auto),
            P::TimeFadeStandbyManual => Some(&mut self.time_fade_standby_manual),
            P::AmbientLuxLevelOn => Some(&mut self.ambient_luxlevel_on),
            P::AmbientLuxLevelProlong => Some(&mut self.ambient_luxlevel_prolong),
            P::AmbientLuxLevelStandby => Some(&mut self.ambient_luxlevel_standby),
            _ => None,
        };
        match (slot_u24, value) {
            (Some(slot), V::TimeMs(v) | V::Illuminance(v)) => {
                *slot = v & 0x00FF_FFFF;
                return true;
            }
            (Some(_), _) => return false,
            (None, _) => {}
        }
        match (property, value) {
            (P::LightnessOn, V::Lightness(v)) => self.lightness_on = v,
            (P::LightnessProlong, V::Lightness(v)) => self.lightness_prolong = v,
            (P::LightnessStandby, V::Lightness(v)) => self.lightness_standby = v,
            (P::RegulatorKiu, V::Coefficient(k)) => self.regulator_kiu = k,
            (P::RegulatorKid, V::Coefficient(k)) => self.regulator_kid = k,
            (P::RegulatorKpu, V::Coefficient(k)) => self.regulator_kpu = k,
            (P::RegulatorKpd, V::Coefficient(k)) => self.regulator_kpd = k,
            (P::RegulatorAccuracy, V::Percentage(p)) => self.regulator_accuracy = p,
            _ => return false,
        }
        true
    }
}

impl PsRecord for LcPropertyState {
    const KEY: PsKey = PsKey::LC_PROPERTY_STATE;
    const LEN: usize = 53;
    const SAVE_TIMER: TimerId = TimerId::SaveLcProperty;

    fn encode(&self, w: &mut ByteWriter) {
        w.u24(self.time_occupancy_delay);
        w.u24(self.time_fade_on);
        w.u24(self.time_run_on);
        w.u24(self.time_fade);
        w.u24(self.time_prolong);
        w.u24(self.time_fade_standby_auto);
        w.u24(self.time_fade_standby_manual);
        w.u16(self.lightness_on);
        w.u16(self.lightness_prolong);
        w.u16(self.lightness_standby);
        w.u24(self.ambient_luxlevel_on);
        w.u24(self.ambient_luxlevel_prolong);
        w.u24(self.ambient_luxlevel_standby);
        w.f32(self.regulator_kiu);
        w.f32(self.regulator_kid);
        w.f32(self.regulator_kpu);
        w.f32(self.regulator_kpd);
        w.u8(self.regulator_accuracy);
    }

    fn decode(r: &mut ByteReader<'_>) -> Self {
        Self {
            time_occupancy_delay: r.u24(),
            time_fade_on: r.u24(),
            time_run_on: r.u24(),
            time_fade: r.u24(),
            time_prolong: r.u24(),
            time_fade_standby_auto: r.u24(),
            time_fade_standby_manual: r.u24(),
            lightness_on: r.u16(),
            lightness_prolong: r.u16(),
            lightness_standby: r.u16(),
            ambient_luxlevel_on: r.u24(),
            ambient_luxlevel_prolong: r.u24(),
            ambient_luxlevel_standby: r.u24(),
            regulator_kiu: r.f32(),
            regulator_kid: r.f32(),
            regulator_kpu: r.f32(),
            regulator_kpd: r.f32(),
            regulator_accuracy: r.u8(),
        }
    }

    fn defaults() -> Self {
        Self {
            time_occupancy_delay: 0,
            time_fade_on: 0,
            time_run_on: 2000,
            time_fade: 0,
            time_prolong: 500,
            time_fade_standby_auto: 0,
            time_fade_standby_manual: 0,
            lightness_on: 65_535,
            lightness_prolong: 32_767,
            lightness_standby: 2000,
            ambient_luxlevel_on: 1000,
            ambient_luxlevel_prolong: 500,
            ambient_luxlevel_standby: 20,
            regulator_kiu: 0.05,
            regulator_kid: 0.0,
            regulator_kpu: 0.4,
            regulator_kpd: 0.3,
            regulator_accuracy: ACCURACY_UNKNOWN,
        }
    }
}

impl Default for LcPropertyState {
    fn default() -> Self {
        Self::defaults()
    }
}
