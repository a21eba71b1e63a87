//! Mesh model identities, states and request records.
//!
//! The mesh library is a black box: it hands the node decoded
//! [`ServerRequest`]s, [`StateChange`]s and [`StateRecall`]s, and accepts
//! [`ServerStatus`] records for responses and state updates.

// ---------------------------------------------------------------------------
// Model identities
// ---------------------------------------------------------------------------

/// SIG model identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelId(pub u16);

impl ModelId {
    pub const GENERIC_ON_OFF_SERVER: Self = Self(0x1000);
    pub const GENERIC_LEVEL_SERVER: Self = Self(0x1002);
    pub const GENERIC_DEFAULT_TRANSITION_TIME_SERVER: Self = Self(0x1004);
    pub const GENERIC_POWER_ON_OFF_SERVER: Self = Self(0x1006);
    pub const GENERIC_POWER_ON_OFF_SETUP_SERVER: Self = Self(0x1007);
    pub const SCENE_SERVER: Self = Self(0x1203);
    pub const SCENE_SETUP_SERVER: Self = Self(0x1204);
    pub const LIGHT_LIGHTNESS_SERVER: Self = Self(0x1300);
    pub const LIGHT_LIGHTNESS_SETUP_SERVER: Self = Self(0x1301);
    pub const LIGHT_CTL_SERVER: Self = Self(0x1303);
    pub const LIGHT_CTL_SETUP_SERVER: Self = Self(0x1304);
    pub const LIGHT_CTL_TEMPERATURE_SERVER: Self = Self(0x1306);
    pub const LIGHT_LC_SERVER: Self = Self(0x130F);
    pub const LIGHT_LC_SETUP_SERVER: Self = Self(0x1310);
}

impl core::fmt::Display for ModelId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "0x{:04x}", self.0)
    }
}

/// Element hosting the primary lighting models.
pub const PRIMARY_ELEMENT: u16 = 0;
/// Element hosting CTL temperature, the secondary level and the LC server.
pub const SECONDARY_ELEMENT: u16 = 1;

// ---------------------------------------------------------------------------
// Timing constants
// ---------------------------------------------------------------------------

/// Remaining time of a change that has already taken effect.
pub const IMMEDIATE: u32 = 0;
/// Remaining time reported while a move runs with no defined end.
pub const UNKNOWN_REMAINING_TIME: u32 = 40_000_000;
/// Request flag: the client expects a status response.
pub const RESPONSE_REQUIRED: u8 = 0x02;

/// Decode a mesh "default transition time" byte into milliseconds.
///
/// Bits 0..=5 hold the step count, bits 6..=7 the step resolution
/// (100 ms, 1 s, 10 s, 10 min).
pub const fn transition_time_ms(raw: u8) -> u32 {
    let steps = (raw & 0x3F) as u32;
    let resolution = match raw >> 6 {
        0 => 100,
        1 => 1_000,
        2 => 10_000,
        _ => 600_000,
    };
    steps * resolution
}

// ---------------------------------------------------------------------------
// State values
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum OnOff {
    #[default]
    Off = 0,
    On = 1,
}

impl OnOff {
    pub const fn from_raw(raw: u8) -> Self {
        if raw == 0 { Self::Off } else { Self::On }
    }

    pub const fn raw(self) -> u8 {
        self as u8
    }

    pub const fn is_on(self) -> bool {
        matches!(self, Self::On)
    }
}

/// Generic OnPowerUp policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum OnPowerUp {
    #[default]
    Off = 0,
    On = 1,
    Restore = 2,
}

impl OnPowerUp {
    /// Unknown values decode as `Off`.
    pub const fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::On,
            2 => Self::Restore,
            _ => Self::Off,
        }
    }

    pub const fn raw(self) -> u8 {
        self as u8
    }
}

/// Which lightness scale a request or publish refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LightnessKind {
    #[default]
    Actual,
    Linear,
}

/// State type selector for publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKind {
    OnOff,
    OnPowerUp,
    TransitionTime,
    LightnessActual,
    LightnessLinear,
    LightnessDefault,
    LightnessRange,
    Level,
    Ctl,
    CtlTemperature,
    CtlDefault,
    CtlTemperatureRange,
    LcOnOff,
}

/// A model state value as carried in status messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenericState {
    OnOff(OnOff),
    OnPowerUp(OnPowerUp),
    TransitionTime(u8),
    LightnessActual(u16),
    LightnessLinear(u16),
    LightnessDefault(u16),
    LightnessRange { min: u16, max: u16 },
    Level(i16),
    Ctl { lightness: u16, temperature: u16, deltauv: i16 },
    CtlTemperature { temperature: u16, deltauv: i16 },
    CtlDefault { lightness: u16, temperature: u16, deltauv: i16 },
    CtlTemperatureRange { min: u16, max: u16 },
    LcOnOff(OnOff),
}

impl GenericState {
    pub const fn kind(&self) -> StateKind {
        match self {
            Self::OnOff(_) => StateKind::OnOff,
            Self::OnPowerUp(_) => StateKind::OnPowerUp,
            Self::TransitionTime(_) => StateKind::TransitionTime,
            Self::LightnessActual(_) => StateKind::LightnessActual,
            Self::LightnessLinear(_) => StateKind::LightnessLinear,
            Self::LightnessDefault(_) => StateKind::LightnessDefault,
            Self::LightnessRange { .. } => StateKind::LightnessRange,
            Self::Level(_) => StateKind::Level,
            Self::Ctl { .. } => StateKind::Ctl,
            Self::CtlTemperature { .. } => StateKind::CtlTemperature,
            Self::CtlDefault { .. } => StateKind::CtlDefault,
            Self::CtlTemperatureRange { .. } => StateKind::CtlTemperatureRange,
            Self::LcOnOff(_) => StateKind::LcOnOff,
        }
    }
}

/// Decoded client request payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenericRequest {
    OnOff(OnOff),
    OnPowerUp(OnPowerUp),
    TransitionTime(u8),
    LightnessActual(u16),
    LightnessLinear(u16),
    LightnessDefault(u16),
    LightnessRange { min: u16, max: u16 },
    Level(i16),
    /// Continuous move; the level is the signed delta per transition.
    LevelMove(i16),
    LevelHalt,
    Ctl { lightness: u16, temperature: u16, deltauv: i16 },
    CtlTemperature { temperature: u16, deltauv: i16 },
    CtlDefault { lightness: u16, temperature: u16, deltauv: i16 },
    CtlTemperatureRange { min: u16, max: u16 },
}

// ---------------------------------------------------------------------------
// Inbound records
// ---------------------------------------------------------------------------

/// A client request addressed to one of the node's server models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerRequest {
    pub model: ModelId,
    pub element: u16,
    pub client: u16,
    pub server: u16,
    pub appkey: u16,
    pub request: GenericRequest,
    pub transition_ms: u32,
    pub delay_ms: u32,
    pub flags: u8,
}

impl ServerRequest {
    pub const fn response_required(&self) -> bool {
        self.flags & RESPONSE_REQUIRED != 0
    }
}

/// A state change the mesh library applied on its own (binding, scene).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    pub model: ModelId,
    pub element: u16,
    pub current: GenericState,
    pub target: GenericState,
    pub remaining_ms: u32,
}

/// A scene recall delivered to one model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateRecall {
    pub model: ModelId,
    pub element: u16,
    pub current: GenericState,
    pub target: GenericState,
    pub transition_ms: u32,
}

// ---------------------------------------------------------------------------
// Outbound record
// ---------------------------------------------------------------------------

/// Server state handed to the mesh library for a response or update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerStatus {
    pub model: ModelId,
    pub element: u16,
    pub current: GenericState,
    pub target: Option<GenericState>,
    pub remaining_ms: u32,
}
