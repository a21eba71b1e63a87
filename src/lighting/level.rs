//! Generic Level servers: primary level (element 0, bound to lightness)
//! and secondary level (element 1, bound to colour temperature).

use log::{info, warn};

use super::convert::{
    level_from_lightness, level_from_temperature, lightness_from_level, temperature_from_level,
};
use super::{LightingEngine, MoveKind, MoveRequest};
use crate::app::ports::NodeHw;
use crate::mesh;
use crate::mesh::models::{
    GenericRequest, GenericState, IMMEDIATE, LightnessKind, ModelId, PRIMARY_ELEMENT,
    SECONDARY_ELEMENT, ServerRequest, ServerStatus, StateChange, StateKind, StateRecall,
    UNKNOWN_REMAINING_TIME,
};
use crate::timer::{TimerId, TimerService};

/// One of the two Generic Level servers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LevelChannel {
    Primary,
    Secondary,
}

impl LevelChannel {
    pub const fn index(self) -> usize {
        match self {
            Self::Primary => 0,
            Self::Secondary => 1,
        }
    }

    pub const fn element(self) -> u16 {
        match self {
            Self::Primary => PRIMARY_ELEMENT,
            Self::Secondary => SECONDARY_ELEMENT,
        }
    }

    pub const fn move_timer(self) -> TimerId {
        match self {
            Self::Primary => TimerId::PriLevelMove,
            Self::Secondary => TimerId::SecLevelMove,
        }
    }

    pub const fn transition_timer(self) -> TimerId {
        match self {
            Self::Primary => TimerId::PriLevelTransition,
            Self::Secondary => TimerId::SecLevelTransition,
        }
    }

    pub const fn delayed_timer(self) -> TimerId {
        match self {
            Self::Primary => TimerId::DelayedPriLevel,
            Self::Secondary => TimerId::DelayedSecLevel,
        }
    }
}

impl LightingEngine {
    // -- Channel accessors --------------------------------------------------

    pub fn level_current(&self, ch: LevelChannel) -> i16 {
        match ch {
            LevelChannel::Primary => self.state.pri_level_current,
            LevelChannel::Secondary => self.state.sec_level_current,
        }
    }

    pub fn level_target(&self, ch: LevelChannel) -> i16 {
        match ch {
            LevelChannel::Primary => self.state.pri_level_target,
            LevelChannel::Secondary => self.state.sec_level_target,
        }
    }

    /// The level a request for `level` actually lands on once the bound
    /// state's range is applied.
    fn effective_level(&self, ch: LevelChannel, level: i16) -> i16 {
        match ch {
            LevelChannel::Primary => {
                level_from_lightness(self.state.clamp_lightness(lightness_from_level(level)))
            }
            LevelChannel::Secondary => level,
        }
    }

    fn set_level_target(&mut self, ch: LevelChannel, level: i16) {
        let s = &mut self.state;
        match ch {
            LevelChannel::Primary => {
                s.lightness_target = s.clamp_lightness(lightness_from_level(level));
                s.pri_level_target = level_from_lightness(s.lightness_target);
            }
            LevelChannel::Secondary => {
                s.sec_level_target = level;
                s.temperature_target =
                    temperature_from_level(level, s.temperature_min, s.temperature_max);
            }
        }
    }

    fn set_level_current(&mut self, ch: LevelChannel, level: i16) {
        match ch {
            LevelChannel::Primary => {
                self.state.lightness_current =
                    self.state.clamp_lightness(lightness_from_level(level));
                self.remember_last();
                self.begin_primary_ramp();
            }
            LevelChannel::Secondary => {
                let s = &mut self.state;
                s.sec_level_current = level;
                s.temperature_current =
                    temperature_from_level(level, s.temperature_min, s.temperature_max);
            }
        }
    }

    fn snap_level(&mut self, ch: LevelChannel) {
        match ch {
            LevelChannel::Primary => {
                self.state.lightness_current = self.state.lightness_target;
                self.remember_last();
                self.sync_primary();
            }
            LevelChannel::Secondary => {
                let s = &mut self.state;
                s.sec_level_current = s.sec_level_target;
                s.temperature_current = s.temperature_target;
            }
        }
    }

    fn drive_level_hw_to(&self, ch: LevelChannel, hw: &mut impl NodeHw, level: i16, ms: u32) {
        let s = &self.state;
        match ch {
            LevelChannel::Primary => {
                hw.set_level(s.clamp_lightness(lightness_from_level(level)), ms);
            }
            LevelChannel::Secondary => {
                let t = temperature_from_level(level, s.temperature_min, s.temperature_max);
                hw.set_temperature(t, s.deltauv_current, ms);
            }
        }
    }

    fn drive_level_hw(&self, ch: LevelChannel, hw: &mut impl NodeHw, ms: u32) {
        self.drive_level_hw_to(ch, hw, self.level_target(ch), ms);
    }

    /// Freeze current and target at whatever the LED is producing now.
    fn sample_level_hw(&mut self, ch: LevelChannel, hw: &mut impl NodeHw) {
        match ch {
            LevelChannel::Primary => {
                let l = self.state.clamp_lightness(hw.level());
                self.state.lightness_current = l;
                self.state.lightness_target = l;
                self.remember_last();
                self.sync_primary();
            }
            LevelChannel::Secondary => {
                let s = &mut self.state;
                let t = s.clamp_temperature(hw.temperature());
                s.temperature_current = t;
                s.temperature_target = t;
                let level = level_from_temperature(t, s.temperature_min, s.temperature_max);
                s.sec_level_current = level;
                s.sec_level_target = level;
            }
        }
    }

    /// Abandon a running move, leaving the output where it has got to.
    /// Any explicit set, change or halt on the element calls this first.
    pub(super) fn stop_move(&mut self, ch: LevelChannel, timers: &mut TimerService) {
        if !self.moves[ch.index()].is_moving() {
            return;
        }
        info!("LIGHT | {:?} level move stopped", ch);
        self.moves[ch.index()] = MoveRequest::IDLE;
        timers.cancel(ch.move_timer());
        timers.cancel(ch.delayed_timer());
        match ch {
            LevelChannel::Primary => {
                self.state.lightness_target = self.state.lightness_current;
                self.sync_primary();
            }
            LevelChannel::Secondary => {
                let s = &mut self.state;
                s.sec_level_target = s.sec_level_current;
                s.temperature_target = s.temperature_current;
            }
        }
    }

    // -- Status -------------------------------------------------------------

    pub(super) fn level_status(&self, ch: LevelChannel, remaining_ms: u32) -> ServerStatus {
        ServerStatus {
            model: ModelId::GENERIC_LEVEL_SERVER,
            element: ch.element(),
            current: GenericState::Level(self.level_current(ch)),
            target: Some(GenericState::Level(self.level_target(ch))),
            remaining_ms,
        }
    }

    pub(super) fn level_update_and_publish(
        &mut self,
        ch: LevelChannel,
        hw: &mut impl NodeHw,
        remaining_ms: u32,
    ) {
        mesh::update_and_publish(hw, &self.level_status(ch, remaining_ms), StateKind::Level);
    }

    fn publish_level_bound(&mut self, ch: LevelChannel, hw: &mut impl NodeHw, remaining_ms: u32) {
        match ch {
            LevelChannel::Primary => {
                self.lightness_update_and_publish(hw, remaining_ms, LightnessKind::Actual);
                self.onoff_update_and_publish(hw, remaining_ms);
                self.ctl_update_and_publish(hw, remaining_ms);
            }
            LevelChannel::Secondary => {
                self.ctl_temperature_update_and_publish(hw, remaining_ms);
            }
        }
    }

    // -- Requests -----------------------------------------------------------

    pub fn level_request(
        &mut self,
        ch: LevelChannel,
        timers: &mut TimerService,
        hw: &mut impl NodeHw,
        req: &ServerRequest,
    ) {
        let remaining_ms = match req.request {
            GenericRequest::Level(level) => self.level_set(ch, timers, hw, req, level),
            GenericRequest::LevelMove(delta) => self.level_move(ch, timers, hw, req, delta),
            GenericRequest::LevelHalt => self.level_halt(ch, timers, hw, req),
            _ => {
                warn!("LIGHT | level server cannot handle {:?}", req.request);
                return;
            }
        };
        mesh::respond(hw, req, &self.level_status(ch, remaining_ms));
        self.level_update_and_publish(ch, hw, remaining_ms);
        self.publish_level_bound(ch, hw, remaining_ms);
    }

    fn level_set(
        &mut self,
        ch: LevelChannel,
        timers: &mut TimerService,
        hw: &mut impl NodeHw,
        req: &ServerRequest,
        level: i16,
    ) -> u32 {
        info!(
            "LIGHT | {:?} level request: {}, transition={} delay={}",
            ch, level, req.transition_ms, req.delay_ms
        );
        self.stop_move(ch, timers);
        let requested = self.effective_level(ch, level);
        if self.level_current(ch) == requested && self.level_target(ch) == requested {
            info!("LIGHT | request for current state; no op");
            return IMMEDIATE;
        }

        timers.cancel(ch.delayed_timer());
        timers.cancel(ch.transition_timer());
        self.set_level_target(ch, requested);

        if req.transition_ms == 0 && req.delay_ms == 0 {
            self.snap_level(ch);
            self.drive_level_hw(ch, hw, IMMEDIATE);
        } else if req.delay_ms > 0 {
            self.moves[ch.index()] = MoveRequest {
                delta: 0,
                transition_ms: req.transition_ms,
                kind: MoveKind::Level,
            };
            Self::arm(timers, ch.delayed_timer(), req.delay_ms);
        } else {
            self.start_level_transition(ch, timers, hw, req.transition_ms);
        }
        self.changed(timers);
        req.delay_ms + req.transition_ms
    }

    fn start_level_transition(
        &mut self,
        ch: LevelChannel,
        timers: &mut TimerService,
        hw: &mut impl NodeHw,
        transition_ms: u32,
    ) {
        if ch == LevelChannel::Primary {
            self.begin_primary_ramp();
        }
        self.drive_level_hw(ch, hw, transition_ms);
        Self::arm(timers, ch.transition_timer(), transition_ms);
    }

    fn level_move(
        &mut self,
        ch: LevelChannel,
        timers: &mut TimerService,
        hw: &mut impl NodeHw,
        req: &ServerRequest,
        delta: i16,
    ) -> u32 {
        info!(
            "LIGHT | {:?} level move: delta={}, transition={} delay={}",
            ch, delta, req.transition_ms, req.delay_ms
        );
        if delta == 0 {
            info!("LIGHT | zero move delta; no op");
            return IMMEDIATE;
        }
        self.moves[ch.index()] = MoveRequest::IDLE;
        timers.cancel(ch.move_timer());
        timers.cancel(ch.delayed_timer());
        timers.cancel(ch.transition_timer());

        let extreme = if delta > 0 { i16::MAX } else { i16::MIN };
        self.set_level_target(ch, extreme);
        if self.level_current(ch) == self.level_target(ch) {
            info!("LIGHT | already at the end of the move");
            if ch == LevelChannel::Primary {
                self.sync_primary();
            }
            return IMMEDIATE;
        }

        let transition_ms = if req.transition_ms == 0 {
            self.default_transition_ms()
        } else {
            req.transition_ms
        };
        if transition_ms == 0 {
            // no step time: jump straight to the end of the move
            self.snap_level(ch);
            self.drive_level_hw(ch, hw, IMMEDIATE);
            self.changed(timers);
            return IMMEDIATE;
        }

        self.moves[ch.index()] = MoveRequest {
            delta,
            transition_ms,
            kind: MoveKind::Move,
        };
        if req.delay_ms > 0 {
            Self::arm(timers, ch.delayed_timer(), req.delay_ms);
        } else {
            if ch == LevelChannel::Primary {
                self.begin_primary_ramp();
            }
            self.schedule_next(ch, timers, hw);
        }
        self.changed(timers);
        UNKNOWN_REMAINING_TIME
    }

    /// Ramp the LED towards the next move step and arm the move timer.
    /// The final step is shortened in proportion to the distance left.
    fn schedule_next(&mut self, ch: LevelChannel, timers: &mut TimerService, hw: &mut impl NodeHw) {
        let m = self.moves[ch.index()];
        let current = i32::from(self.level_current(ch));
        let target = i32::from(self.level_target(ch));
        let remaining = (target - current).unsigned_abs();
        let step = i32::from(m.delta).unsigned_abs();

        if remaining < step {
            let ms = (u64::from(m.transition_ms) * u64::from(remaining) / u64::from(step)).max(1);
            let ms = u32::try_from(ms).unwrap_or(m.transition_ms);
            self.drive_level_hw_to(ch, hw, self.level_target(ch), ms);
            Self::arm(timers, ch.move_timer(), ms);
        } else {
            let next = (current + i32::from(m.delta)).clamp(i32::from(i16::MIN), i32::from(i16::MAX));
            self.drive_level_hw_to(ch, hw, next as i16, m.transition_ms);
            Self::arm(timers, ch.move_timer(), m.transition_ms);
        }
    }

    pub(super) fn move_tick(
        &mut self,
        ch: LevelChannel,
        timers: &mut TimerService,
        hw: &mut impl NodeHw,
    ) {
        let m = self.moves[ch.index()];
        if !m.is_moving() {
            return;
        }
        let current = i32::from(self.level_current(ch));
        let target = i32::from(self.level_target(ch));
        let step = i32::from(m.delta).unsigned_abs();

        if (target - current).unsigned_abs() <= step {
            self.snap_level(ch);
        } else {
            self.set_level_current(ch, (current + i32::from(m.delta)) as i16);
            if i32::from(self.level_current(ch)) == current {
                // clamped against the bound range: nothing left to move
                self.snap_level(ch);
            }
        }
        self.changed(timers);

        if self.level_current(ch) == self.level_target(ch) {
            info!("LIGHT | {:?} level move finished at {}", ch, self.level_current(ch));
            self.moves[ch.index()] = MoveRequest::IDLE;
            self.drive_level_hw(ch, hw, IMMEDIATE);
            self.level_update_and_publish(ch, hw, IMMEDIATE);
            self.publish_level_bound(ch, hw, IMMEDIATE);
        } else {
            self.level_update_and_publish(ch, hw, UNKNOWN_REMAINING_TIME);
            self.schedule_next(ch, timers, hw);
        }
    }

    fn level_halt(
        &mut self,
        ch: LevelChannel,
        timers: &mut TimerService,
        hw: &mut impl NodeHw,
        req: &ServerRequest,
    ) -> u32 {
        info!("LIGHT | {:?} level halt, delay={}", ch, req.delay_ms);
        if req.delay_ms > 0 {
            self.moves[ch.index()].kind = MoveKind::Halt;
            Self::arm(timers, ch.delayed_timer(), req.delay_ms);
            return req.delay_ms;
        }
        self.halt_now(ch, timers, hw);
        IMMEDIATE
    }

    fn halt_now(&mut self, ch: LevelChannel, timers: &mut TimerService, hw: &mut impl NodeHw) {
        timers.cancel(ch.move_timer());
        timers.cancel(ch.transition_timer());
        timers.cancel(ch.delayed_timer());
        self.moves[ch.index()] = MoveRequest::IDLE;
        self.sample_level_hw(ch, hw);
        self.drive_level_hw(ch, hw, IMMEDIATE);
        self.changed(timers);
    }

    // -- Timer expiries -----------------------------------------------------

    pub(super) fn delayed_level(
        &mut self,
        ch: LevelChannel,
        timers: &mut TimerService,
        hw: &mut impl NodeHw,
    ) {
        let m = self.moves[ch.index()];
        info!("LIGHT | delayed {:?} level {:?}", ch, m.kind);
        match m.kind {
            MoveKind::Level => {
                self.moves[ch.index()] = MoveRequest::IDLE;
                if m.transition_ms == 0 {
                    self.snap_level(ch);
                    self.drive_level_hw(ch, hw, IMMEDIATE);
                    self.changed(timers);
                    self.level_update_and_publish(ch, hw, IMMEDIATE);
                    self.publish_level_bound(ch, hw, IMMEDIATE);
                } else {
                    self.start_level_transition(ch, timers, hw, m.transition_ms);
                    self.changed(timers);
                    mesh::update(hw, &self.level_status(ch, m.transition_ms));
                }
            }
            MoveKind::Move => {
                if ch == LevelChannel::Primary {
                    self.begin_primary_ramp();
                }
                self.schedule_next(ch, timers, hw);
                self.level_update_and_publish(ch, hw, UNKNOWN_REMAINING_TIME);
            }
            MoveKind::Halt => {
                self.halt_now(ch, timers, hw);
                self.level_update_and_publish(ch, hw, IMMEDIATE);
                self.publish_level_bound(ch, hw, IMMEDIATE);
            }
        }
    }

    pub(super) fn level_transition_complete(
        &mut self,
        ch: LevelChannel,
        timers: &mut TimerService,
        hw: &mut impl NodeHw,
    ) {
        self.snap_level(ch);
        info!("LIGHT | {:?} level transition complete: {}", ch, self.level_current(ch));
        self.changed(timers);
        self.level_update_and_publish(ch, hw, IMMEDIATE);
        self.publish_level_bound(ch, hw, IMMEDIATE);
    }

    // -- Library-driven changes ---------------------------------------------

    pub fn level_change(&mut self, ch: LevelChannel, timers: &mut TimerService, change: &StateChange) {
        let GenericState::Level(level) = change.current else {
            return;
        };
        self.stop_move(ch, timers);
        if level == self.level_current(ch) {
            info!("LIGHT | {:?} level change: same state as before", ch);
            return;
        }
        info!("LIGHT | {:?} level changed {} -> {}", ch, self.level_current(ch), level);
        match ch {
            LevelChannel::Primary => {
                let l = self.state.clamp_lightness(lightness_from_level(level));
                self.state.lightness_current = l;
                self.remember_last();
                self.state.pri_level_current = level_from_lightness(l);
            }
            LevelChannel::Secondary => self.set_level_current(ch, level),
        }
        self.changed(timers);
    }

    pub fn level_recall(
        &mut self,
        ch: LevelChannel,
        timers: &mut TimerService,
        hw: &mut impl NodeHw,
        recall: &StateRecall,
    ) {
        let state = if recall.transition_ms == IMMEDIATE {
            recall.current
        } else {
            recall.target
        };
        let GenericState::Level(level) = state else {
            return;
        };
        let target = self.effective_level(ch, level);
        self.set_level_target(ch, target);

        if self.level_current(ch) == target {
            info!("LIGHT | {:?} level recall of current state; no op", ch);
        } else {
            info!("LIGHT | recall {:?} level {} over {} ms", ch, target, recall.transition_ms);
            if recall.transition_ms == IMMEDIATE {
                self.snap_level(ch);
                self.drive_level_hw(ch, hw, IMMEDIATE);
            } else {
                self.start_level_transition(ch, timers, hw, recall.transition_ms);
            }
            self.changed(timers);
        }
        self.level_update_and_publish(ch, hw, recall.transition_ms);
    }
}
