//! Lighting transition engine.
//!
//! Every lighting command family (on/off, lightness, primary level, CTL,
//! CTL temperature, secondary level) follows the same shape:
//!
//! ```text
//!   request ─┬─ current == requested ───────────────▶ no-op
//!            ├─ delay == 0 && transition == 0 ──────▶ snap + drive LED now
//!            ├─ delay > 0 ──▶ DELAYED_X ─┬─ t == 0 ─▶ snap
//!            │                           └─ t > 0 ──┐
//!            └─ transition > 0 ─────────────────────┴▶ ramp LED, TRANSITION_X ─▶ complete
//! ```
//!
//! Levels additionally support continuous moves, advanced one step per
//! move-timer expiry, and halts that freeze at the sampled LED output.
//!
//! Bound states are kept consistent locally: primary level and on/off
//! follow lightness, the secondary level follows colour temperature.

pub mod convert;
mod ctl;
mod level;
mod lightness;
mod onoff;
mod state;

pub use level::LevelChannel;
pub use state::{
    DEFAULT_DELTAUV, DEFAULT_TEMPERATURE, LightbulbState, MAX_TEMPERATURE, MIN_TEMPERATURE,
};

use log::{info, warn};

use crate::app::ports::{LedPort, LedState, NodeHw, StoragePort};
use crate::error::StorageError;
use crate::mesh::models::{IMMEDIATE, LightnessKind, OnOff, OnPowerUp, transition_time_ms};
use crate::store::{self, PsRecord};
use crate::timer::{TimerId, TimerService};
use convert::level_from_lightness;
use convert::level_from_temperature;

// ---------------------------------------------------------------------------
// Move records
// ---------------------------------------------------------------------------

/// What a pending level operation does when its delay expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MoveKind {
    #[default]
    Level,
    Move,
    Halt,
}

/// Per-element level operation record.  A zero delta means no move runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MoveRequest {
    pub delta: i16,
    pub transition_ms: u32,
    pub kind: MoveKind,
}

impl MoveRequest {
    pub const IDLE: Self = Self {
        delta: 0,
        transition_ms: 0,
        kind: MoveKind::Level,
    };

    pub const fn is_moving(&self) -> bool {
        self.delta != 0
    }
}

/// Transition times remembered while a DELAYED_X timer runs.
#[derive(Debug, Clone, Copy, Default)]
struct DelayedTransitions {
    onoff: u32,
    lightness: u32,
    ctl: u32,
    ctl_temperature: u32,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct LightingEngine {
    pub state: LightbulbState,
    delayed: DelayedTransitions,
    /// Indexed by [`LevelChannel`].
    moves: [MoveRequest; 2],
    save_debounce_ms: u32,
}

impl LightingEngine {
    pub fn new(save_debounce_ms: u32) -> Self {
        Self {
            state: LightbulbState::defaults(),
            delayed: DelayedTransitions::default(),
            moves: [MoveRequest::IDLE; 2],
            save_debounce_ms,
        }
    }

    /// Load the persisted state, falling back to defaults.
    pub fn load(&mut self, storage: &impl StoragePort) {
        self.state = store::load_record(storage);
        self.state.enforce_ranges();
    }

    pub fn save(&self, storage: &mut impl StoragePort) -> Result<(), StorageError> {
        store::save_record(&self.state, storage)
    }

    /// The move record of one level channel.
    pub fn move_request(&self, channel: LevelChannel) -> MoveRequest {
        self.moves[channel.index()]
    }

    /// Default transition time in milliseconds.
    pub fn default_transition_ms(&self) -> u32 {
        transition_time_ms(self.state.transtime)
    }

    /// Schedule the debounced save of the lightbulb record.
    fn changed(&self, timers: &mut TimerService) {
        store::mark_dirty::<LightbulbState>(timers, self.save_debounce_ms);
    }

    fn arm(timers: &mut TimerService, id: TimerId, delay_ms: u32) {
        if let Err(e) = timers.set(id, delay_ms, false) {
            warn!("LIGHT | cannot arm {:?}: {}", id, e);
        }
    }

    // -- Bindings -----------------------------------------------------------

    fn remember_last(&mut self) {
        if self.state.lightness_current != 0 {
            self.state.lightness_last = self.state.lightness_current;
        }
    }

    /// Lightness used when the light is switched on.
    fn on_lightness(&self) -> u16 {
        let last = if self.state.lightness_last == 0 {
            self.state.lightness_max
        } else {
            self.state.lightness_last
        };
        self.state.clamp_lightness(last)
    }

    /// Re-derive primary level and on/off from lightness.
    fn sync_primary(&mut self) {
        let s = &mut self.state;
        s.pri_level_current = level_from_lightness(s.lightness_current);
        s.pri_level_target = level_from_lightness(s.lightness_target);
        s.onoff_current = OnOff::from_raw(u8::from(s.lightness_current != 0));
        s.onoff_target = OnOff::from_raw(u8::from(s.lightness_target != 0));
    }

    /// Bindings at the start of a lightness ramp: the light reads as on
    /// for the whole ramp towards a non-zero target.
    fn begin_primary_ramp(&mut self) {
        self.sync_primary();
        if self.state.lightness_target != 0 {
            self.state.onoff_current = OnOff::On;
        }
    }

    /// Re-derive the secondary level from colour temperature.
    fn sync_secondary(&mut self) {
        let s = &mut self.state;
        s.sec_level_current =
            level_from_temperature(s.temperature_current, s.temperature_min, s.temperature_max);
        s.sec_level_target =
            level_from_temperature(s.temperature_target, s.temperature_min, s.temperature_max);
    }

    // -- Power up -----------------------------------------------------------

    /// Apply the OnPowerUp policy to the loaded state and the LED.
    ///
    /// `lc_mode` is the persisted Light Controller mode; with RESTORE and
    /// the controller in auto mode, lightness is left to the regulator.
    pub fn power_up(&mut self, timers: &mut TimerService, hw: &mut impl LedPort, lc_mode: u8) {
        let transition_ms = self.default_transition_ms();
        match self.state.onpowerup {
            OnPowerUp::Off => {
                info!("LIGHT | power up: OFF");
                let s = &mut self.state;
                s.lightness_current = 0;
                s.lightness_target = 0;
                hw.set_state(LedState::Off);
                self.restore_default_temperature(hw);
                self.sync_primary();
            }
            OnPowerUp::On => {
                info!("LIGHT | power up: ON");
                let lightness = if self.state.lightness_default == 0 {
                    self.on_lightness()
                } else {
                    self.state.clamp_lightness(self.state.lightness_default)
                };
                self.state.lightness_target = lightness;
                self.ramp_up_from_dark(timers, hw, transition_ms);
                self.restore_default_temperature(hw);
            }
            OnPowerUp::Restore => {
                info!("LIGHT | power up: RESTORE");
                if lc_mode == 0 {
                    if transition_ms > 0 && self.state.lightness_target > 0 {
                        self.ramp_up_from_dark(timers, hw, transition_ms);
                    } else {
                        self.state.lightness_current = self.state.lightness_target;
                        hw.set_level(self.state.lightness_current, IMMEDIATE);
                        self.sync_primary();
                    }
                }

                let s = &mut self.state;
                let off_default = s.temperature_target != s.temperature_default
                    || s.deltauv_target != s.deltauv_default;
                if transition_ms > 0 && off_default {
                    s.temperature_current = s.temperature_default;
                    s.deltauv_current = s.deltauv_default;
                    hw.set_temperature(s.temperature_current, s.deltauv_current, IMMEDIATE);
                    hw.set_temperature(s.temperature_target, s.deltauv_target, transition_ms);
                    Self::arm(timers, TimerId::CtlTempTransition, transition_ms);
                } else {
                    s.temperature_current = s.temperature_target;
                    s.deltauv_current = s.deltauv_target;
                    hw.set_temperature(s.temperature_current, s.deltauv_current, IMMEDIATE);
                }
                self.sync_secondary();
            }
        }
        self.changed(timers);
    }

    /// Start dark and ramp to `lightness_target` over the default time.
    fn ramp_up_from_dark(&mut self, timers: &mut TimerService, hw: &mut impl LedPort, ms: u32) {
        if ms > 0 {
            self.state.lightness_current = 0;
            hw.set_level(0, IMMEDIATE);
            hw.set_level(self.state.lightness_target, ms);
            Self::arm(timers, TimerId::LightnessTransition, ms);
            self.begin_primary_ramp();
        } else {
            self.state.lightness_current = self.state.lightness_target;
            hw.set_level(self.state.lightness_target, IMMEDIATE);
            self.remember_last();
            self.sync_primary();
        }
    }

    fn restore_default_temperature(&mut self, hw: &mut impl LedPort) {
        let s = &mut self.state;
        s.temperature_current = s.clamp_temperature(s.temperature_default);
        s.temperature_target = s.temperature_current;
        s.deltauv_current = s.deltauv_default;
        s.deltauv_target = s.deltauv_default;
        hw.set_temperature(s.temperature_current, s.deltauv_current, IMMEDIATE);
        self.sync_secondary();
    }

    /// Publish the power-up state of every primary model.
    pub fn publish_power_up(&mut self, hw: &mut impl NodeHw) {
        self.onoff_update_and_publish(hw, IMMEDIATE);
        self.power_onoff_update_and_publish(hw);
        self.lightness_update_and_publish(hw, IMMEDIATE, LightnessKind::Actual);
        self.ctl_temperature_update_and_publish(hw, IMMEDIATE);
    }

    // -- Timers -------------------------------------------------------------

    /// Handle a lighting timer expiry.  Returns `false` for handles the
    /// engine does not own.
    pub fn handle_timer(
        &mut self,
        id: TimerId,
        timers: &mut TimerService,
        hw: &mut impl NodeHw,
    ) -> bool {
        match id {
            TimerId::SaveLightbulb => {
                if let Err(e) = self.save(hw) {
                    warn!("LIGHT | lightbulb state save failed: {}", e);
                }
            }
            TimerId::DelayedOnOff => self.delayed_onoff(timers, hw),
            TimerId::OnOffTransition => self.onoff_transition_complete(timers, hw),
            TimerId::DelayedLightness => self.delayed_lightness(timers, hw),
            TimerId::LightnessTransition => self.lightness_transition_complete(timers, hw),
            TimerId::DelayedPriLevel => self.delayed_level(LevelChannel::Primary, timers, hw),
            TimerId::PriLevelTransition => {
                self.level_transition_complete(LevelChannel::Primary, timers, hw);
            }
            TimerId::PriLevelMove => self.move_tick(LevelChannel::Primary, timers, hw),
            TimerId::DelayedSecLevel => self.delayed_level(LevelChannel::Secondary, timers, hw),
            TimerId::SecLevelTransition => {
                self.level_transition_complete(LevelChannel::Secondary, timers, hw);
            }
            TimerId::SecLevelMove => self.move_tick(LevelChannel::Secondary, timers, hw),
            TimerId::DelayedCtl => self.delayed_ctl(timers, hw),
            TimerId::CtlTransition => self.ctl_transition_complete(timers, hw),
            TimerId::DelayedCtlTemp => self.delayed_ctl_temperature(timers, hw),
            TimerId::CtlTempTransition => self.ctl_temperature_transition_complete(timers, hw),
            _ => return false,
        }
        true
    }
}

impl Default for LightingEngine {
    fn default() -> Self {
        Self::new(5_000)
    }
}
