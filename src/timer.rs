//! Soft-timer service.
//!
//! One low-frequency free-running counter (32 768 Hz) drives every
//! delayed operation in the node.  Timers are keyed by a small stable
//! handle ([`TimerId`]); there is at most one pending expiry per handle
//! and re-arming a handle replaces its pending expiry.
//!
//! The service never reads a clock itself.  The event loop feeds it the
//! current counter value with [`TimerService::set_now`] and then pulls
//! due expiries with [`TimerService::next_expired`].

use crate::error::TimerError;

/// Counter frequency of the low-frequency clock.
pub const TICKS_PER_SEC: u64 = 32_768;

/// Convert milliseconds to counter ticks, rounding up so an expiry is
/// never dispatched early.
pub const fn ms_to_ticks(ms: u32) -> u64 {
    (ms as u64 * TICKS_PER_SEC).div_ceil(1000)
}

/// Convert counter ticks back to whole milliseconds (truncating).
pub const fn ticks_to_ms(ticks: u64) -> u64 {
    ticks * 1000 / TICKS_PER_SEC
}

// ---------------------------------------------------------------------------
// Timer handles
// ---------------------------------------------------------------------------

/// Stable soft-timer handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TimerId {
    // ── Light Controller ──────────────────────────────────
    LcOnOffTransition = 20,
    DelayedLcOnOff = 21,

    // ── Lighting engine ───────────────────────────────────
    SecLevelMove = 29,
    PriLevelMove = 30,
    SecLevelTransition = 42,
    DelayedSecLevel = 43,
    CtlTempTransition = 44,
    DelayedCtlTemp = 45,
    CtlTransition = 46,
    DelayedCtl = 47,
    PriLevelTransition = 48,
    DelayedPriLevel = 49,
    DelayedLightness = 50,
    DelayedOnOff = 51,
    LightnessTransition = 52,
    OnOffTransition = 53,

    // ── Persistence debounce ──────────────────────────────
    SaveLightbulb = 60,
    SaveLc = 61,
    SaveLcProperty = 62,
    SaveMaxTemp = 63,
    SaveAuthorized = 64,
    SaveButtonCount = 65,

    // ── Lifecycle ─────────────────────────────────────────
    ProvisioningBlink = 66,

    // ── Acquisition ───────────────────────────────────────
    AcquisitionWake = 70,
    ConversionWait = 71,
    RailSettle = 72,

    // ── Reboot ────────────────────────────────────────────
    FactoryReset = 77,
    Restart = 78,
}

impl TimerId {
    /// Total number of handles; sizes the slot table.
    pub const COUNT: usize = 28;

    /// Every handle, in slot order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::LcOnOffTransition,
        Self::DelayedLcOnOff,
        Self::SecLevelMove,
        Self::PriLevelMove,
        Self::SecLevelTransition,
        Self::DelayedSecLevel,
        Self::CtlTempTransition,
        Self::DelayedCtlTemp,
        Self::CtlTransition,
        Self::DelayedCtl,
        Self::PriLevelTransition,
        Self::DelayedPriLevel,
        Self::DelayedLightness,
        Self::DelayedOnOff,
        Self::LightnessTransition,
        Self::OnOffTransition,
        Self::SaveLightbulb,
        Self::SaveLc,
        Self::SaveLcProperty,
        Self::SaveMaxTemp,
        Self::SaveAuthorized,
        Self::SaveButtonCount,
        Self::ProvisioningBlink,
        Self::AcquisitionWake,
        Self::ConversionWait,
        Self::RailSettle,
        Self::FactoryReset,
        Self::Restart,
    ];

    /// Raw handle number.
    pub const fn handle(self) -> u8 {
        self as u8
    }

    /// Map a raw handle number back to its identity.
    pub fn from_handle(raw: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|id| id.handle() == raw)
    }

    /// Slot index in the timer table.
    fn slot(self) -> usize {
        match self {
            Self::LcOnOffTransition => 0,
            Self::DelayedLcOnOff => 1,
            Self::SecLevelMove => 2,
            Self::PriLevelMove => 3,
            Self::SecLevelTransition => 4,
            Self::DelayedSecLevel => 5,
            Self::CtlTempTransition => 6,
            Self::DelayedCtlTemp => 7,
            Self::CtlTransition => 8,
            Self::DelayedCtl => 9,
            Self::PriLevelTransition => 10,
            Self::DelayedPriLevel => 11,
            Self::DelayedLightness => 12,
            Self::DelayedOnOff => 13,
            Self::LightnessTransition => 14,
            Self::OnOffTransition => 15,
            Self::SaveLightbulb => 16,
            Self::SaveLc => 17,
            Self::SaveLcProperty => 18,
            Self::SaveMaxTemp => 19,
            Self::SaveAuthorized => 20,
            Self::SaveButtonCount => 21,
            Self::ProvisioningBlink => 22,
            Self::AcquisitionWake => 23,
            Self::ConversionWait => 24,
            Self::RailSettle => 25,
            Self::FactoryReset => 26,
            Self::Restart => 27,
        }
    }
}

// ---------------------------------------------------------------------------
// Soft timer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SoftTimer {
    deadline: u64,
    /// Re-arm period in ticks; `None` for one-shot timers.
    period: Option<u64>,
    /// Arm order, breaks ties between equal deadlines.
    seq: u32,
}

/// Table of soft timers, one slot per handle.
pub struct TimerService {
    slots: [Option<SoftTimer>; TimerId::COUNT],
    retired: u32,
    now: u64,
    seq: u32,
}

impl TimerService {
    pub fn new() -> Self {
        Self {
            slots: [None; TimerId::COUNT],
            retired: 0,
            now: 0,
            seq: 0,
        }
    }

    /// Arm `id` to expire after `delay_ms`.  A delay of 0 cancels.
    ///
    /// Re-arming replaces any pending expiry for the handle.
    pub fn set(&mut self, id: TimerId, delay_ms: u32, periodic: bool) -> Result<(), TimerError> {
        if self.is_retired(id) {
            return Err(TimerError::Retired(id.handle()));
        }
        if delay_ms == 0 {
            self.cancel(id);
            return Ok(());
        }

        let ticks = ms_to_ticks(delay_ms);
        self.seq = self.seq.wrapping_add(1);
        self.slots[id.slot()] = Some(SoftTimer {
            deadline: self.now + ticks,
            period: periodic.then_some(ticks),
            seq: self.seq,
        });
        Ok(())
    }

    /// Drop any pending expiry for `id`.
    pub fn cancel(&mut self, id: TimerId) {
        self.slots[id.slot()] = None;
    }

    /// Put `id` into terminal teardown: it is cancelled and can never be
    /// armed again.
    pub fn retire(&mut self, id: TimerId) {
        self.cancel(id);
        self.retired |= 1 << id.slot();
    }

    pub fn is_retired(&self, id: TimerId) -> bool {
        self.retired & (1 << id.slot()) != 0
    }

    pub fn is_active(&self, id: TimerId) -> bool {
        self.slots[id.slot()].is_some()
    }

    /// Ticks left before `id` expires, if armed.
    pub fn remaining_ticks(&self, id: TimerId) -> Option<u64> {
        self.slots[id.slot()].map(|t| t.deadline.saturating_sub(self.now))
    }

    /// Feed the current counter value.  The counter is monotonic; an
    /// older value is ignored.
    pub fn set_now(&mut self, ticks: u64) {
        if ticks > self.now {
            self.now = ticks;
        }
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    /// Earliest pending deadline, for the sleep governor.
    pub fn next_deadline(&self) -> Option<u64> {
        self.slots.iter().flatten().map(|t| t.deadline).min()
    }

    /// Pop the earliest due expiry.  Periodic timers are re-armed from
    /// their previous deadline; one-shot timers are released.
    pub fn next_expired(&mut self) -> Option<TimerId> {
        let now = self.now;
        let (slot, timer) = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(i, t)| t.map(|t| (i, t)))
            .filter(|(_, t)| t.deadline <= now)
            .min_by_key(|(_, t)| (t.deadline, t.seq))?;

        self.slots[slot] = timer.period.map(|period| SoftTimer {
            deadline: timer.deadline + period,
            ..timer
        });
        Some(TimerId::ALL[slot])
    }
}

impl Default for TimerService {
    fn default() -> Self {
        Self::new()
    }
}
