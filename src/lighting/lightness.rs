//! Light Lightness server and setup server (element 0).

use log::{info, warn};

use super::convert::{actual_to_linear, level_from_lightness, linear_to_actual};
use super::{LevelChannel, LightingEngine};
use crate::app::ports::NodeHw;
use crate::mesh;
use crate::mesh::models::{
    GenericRequest, GenericState, IMMEDIATE, LightnessKind, ModelId, PRIMARY_ELEMENT,
    ServerRequest, ServerStatus, StateChange, StateKind, StateRecall,
};
use crate::timer::{TimerId, TimerService};

impl LightingEngine {
    pub(super) fn lightness_status(&self, remaining_ms: u32, kind: LightnessKind) -> ServerStatus {
        let s = &self.state;
        let (current, target) = match kind {
            LightnessKind::Actual => (
                GenericState::LightnessActual(s.lightness_current),
                GenericState::LightnessActual(s.lightness_target),
            ),
            LightnessKind::Linear => (
                GenericState::LightnessLinear(actual_to_linear(s.lightness_current)),
                GenericState::LightnessLinear(actual_to_linear(s.lightness_target)),
            ),
        };
        ServerStatus {
            model: ModelId::LIGHT_LIGHTNESS_SERVER,
            element: PRIMARY_ELEMENT,
            current,
            target: Some(target),
            remaining_ms,
        }
    }

    pub(super) fn lightness_update_and_publish(
        &mut self,
        hw: &mut impl NodeHw,
        remaining_ms: u32,
        kind: LightnessKind,
    ) {
        let state_kind = match kind {
            LightnessKind::Actual => StateKind::LightnessActual,
            LightnessKind::Linear => StateKind::LightnessLinear,
        };
        mesh::update_and_publish(hw, &self.lightness_status(remaining_ms, kind), state_kind);
    }

    /// Publish every state bound to lightness.
    fn publish_lightness_bound(&mut self, hw: &mut impl NodeHw, remaining_ms: u32) {
        self.onoff_update_and_publish(hw, remaining_ms);
        self.level_update_and_publish(LevelChannel::Primary, hw, remaining_ms);
        self.ctl_update_and_publish(hw, remaining_ms);
    }

    pub fn lightness_request(
        &mut self,
        timers: &mut TimerService,
        hw: &mut impl NodeHw,
        req: &ServerRequest,
    ) {
        let (kind, requested) = match req.request {
            GenericRequest::LightnessActual(v) => (LightnessKind::Actual, v),
            GenericRequest::LightnessLinear(v) => (LightnessKind::Linear, linear_to_actual(v)),
            _ => {
                warn!("LIGHT | lightness server cannot handle {:?}", req.request);
                return;
            }
        };
        let requested = self.state.clamp_lightness(requested);
        info!(
            "LIGHT | lightness request: {} ({:?}), transition={} delay={}",
            requested, kind, req.transition_ms, req.delay_ms
        );
        self.stop_move(LevelChannel::Primary, timers);

        let remaining_ms = if self.state.lightness_current == requested
            && self.state.lightness_target == requested
        {
            info!("LIGHT | request for current state; no op");
            IMMEDIATE
        } else {
            timers.cancel(TimerId::DelayedLightness);
            timers.cancel(TimerId::LightnessTransition);
            self.state.lightness_target = requested;

            if req.transition_ms == 0 && req.delay_ms == 0 {
                self.snap_lightness(hw);
            } else if req.delay_ms > 0 {
                self.delayed.lightness = req.transition_ms;
                Self::arm(timers, TimerId::DelayedLightness, req.delay_ms);
            } else {
                self.start_lightness_transition(timers, hw, req.transition_ms);
            }
            self.changed(timers);
            req.delay_ms + req.transition_ms
        };

        mesh::respond(hw, req, &self.lightness_status(remaining_ms, kind));
        self.lightness_update_and_publish(hw, remaining_ms, kind);
        self.publish_lightness_bound(hw, remaining_ms);
    }

    fn snap_lightness(&mut self, hw: &mut impl NodeHw) {
        self.state.lightness_current = self.state.lightness_target;
        self.remember_last();
        hw.set_level(self.state.lightness_current, IMMEDIATE);
        self.sync_primary();
    }

    fn start_lightness_transition(
        &mut self,
        timers: &mut TimerService,
        hw: &mut impl NodeHw,
        transition_ms: u32,
    ) {
        self.begin_primary_ramp();
        hw.set_level(self.state.lightness_target, transition_ms);
        Self::arm(timers, TimerId::LightnessTransition, transition_ms);
    }

    pub(super) fn delayed_lightness(&mut self, timers: &mut TimerService, hw: &mut impl NodeHw) {
        let transition_ms = self.delayed.lightness;
        info!(
            "LIGHT | delayed lightness: {} -> {}, {} ms",
            self.state.lightness_current, self.state.lightness_target, transition_ms
        );
        if transition_ms == 0 {
            self.snap_lightness(hw);
            self.changed(timers);
            self.lightness_update_and_publish(hw, IMMEDIATE, LightnessKind::Actual);
            self.publish_lightness_bound(hw, IMMEDIATE);
        } else {
            self.start_lightness_transition(timers, hw, transition_ms);
            self.changed(timers);
            mesh::update(hw, &self.lightness_status(transition_ms, LightnessKind::Actual));
        }
    }

    pub(super) fn lightness_transition_complete(
        &mut self,
        timers: &mut TimerService,
        hw: &mut impl NodeHw,
    ) {
        self.state.lightness_current = self.state.lightness_target;
        self.remember_last();
        self.sync_primary();
        info!("LIGHT | lightness transition complete: {}", self.state.lightness_current);
        self.changed(timers);
        self.lightness_update_and_publish(hw, IMMEDIATE, LightnessKind::Actual);
        self.publish_lightness_bound(hw, IMMEDIATE);
    }

    pub fn lightness_change(&mut self, timers: &mut TimerService, change: &StateChange) {
        let current = match change.current {
            GenericState::LightnessActual(v) => v,
            GenericState::LightnessLinear(v) => linear_to_actual(v),
            _ => return,
        };
        let current = self.state.clamp_lightness(current);
        self.stop_move(LevelChannel::Primary, timers);
        if current == self.state.lightness_current {
            info!("LIGHT | lightness change: same state as before");
            return;
        }
        info!("LIGHT | lightness changed {} -> {}", self.state.lightness_current, current);
        self.state.lightness_current = current;
        self.remember_last();
        self.state.pri_level_current = level_from_lightness(current);
        self.changed(timers);
    }

    pub fn lightness_recall(
        &mut self,
        timers: &mut TimerService,
        hw: &mut impl NodeHw,
        recall: &StateRecall,
    ) {
        let state = if recall.transition_ms == IMMEDIATE {
            recall.current
        } else {
            recall.target
        };
        let GenericState::LightnessActual(target) = state else {
            return;
        };
        let target = self.state.clamp_lightness(target);
        self.state.lightness_target = target;

        if self.state.lightness_current == target {
            info!("LIGHT | lightness recall of current state; no op");
        } else {
            info!("LIGHT | recall lightness {} over {} ms", target, recall.transition_ms);
            if recall.transition_ms == IMMEDIATE {
                self.snap_lightness(hw);
            } else {
                self.start_lightness_transition(timers, hw, recall.transition_ms);
            }
            self.changed(timers);
        }
        self.lightness_update_and_publish(hw, recall.transition_ms, LightnessKind::Actual);
    }

    // -- Setup server -------------------------------------------------------

    fn lightness_setup_status(&self, kind: StateKind) -> ServerStatus {
        let s = &self.state;
        let current = match kind {
            StateKind::LightnessRange => GenericState::LightnessRange {
                min: s.lightness_min,
                max: s.lightness_max,
            },
            _ => GenericState::LightnessDefault(s.lightness_default),
        };
        ServerStatus {
            model: ModelId::LIGHT_LIGHTNESS_SETUP_SERVER,
            element: PRIMARY_ELEMENT,
            current,
            target: None,
            remaining_ms: IMMEDIATE,
        }
    }

    pub fn lightness_setup_request(
        &mut self,
        timers: &mut TimerService,
        hw: &mut impl NodeHw,
        req: &ServerRequest,
    ) {
        let kind = match req.request {
            GenericRequest::LightnessDefault(value) => {
                info!("LIGHT | lightness default request: {}", value);
                if value != self.state.lightness_default {
                    self.state.lightness_default = value;
                    self.changed(timers);
                }
                StateKind::LightnessDefault
            }
            GenericRequest::LightnessRange { min, max } => {
                info!("LIGHT | lightness range request: {}..={}", min, max);
                if min == 0 || min > max {
                    warn!("LIGHT | invalid lightness range {}..={}; ignored", min, max);
                    return;
                }
                if (min, max) != (self.state.lightness_min, self.state.lightness_max) {
                    self.state.lightness_min = min;
                    self.state.lightness_max = max;
                    self.apply_lightness_range(hw);
                    self.changed(timers);
                }
                StateKind::LightnessRange
            }
            _ => {
                warn!("LIGHT | lightness setup server cannot handle {:?}", req.request);
                return;
            }
        };
        let status = self.lightness_setup_status(kind);
        mesh::respond(hw, req, &status);
        mesh::update_and_publish(hw, &status, kind);
    }

    pub fn lightness_setup_change(&mut self, timers: &mut TimerService, change: &StateChange) {
        match change.current {
            GenericState::LightnessDefault(value) if value != self.state.lightness_default => {
                info!("LIGHT | lightness default changed to {}", value);
                self.state.lightness_default = value;
                self.changed(timers);
            }
            GenericState::LightnessRange { min, max }
                if min != 0
                    && min <= max
                    && (min, max) != (self.state.lightness_min, self.state.lightness_max) =>
            {
                info!("LIGHT | lightness range changed to {}..={}", min, max);
                self.state.lightness_min = min;
                self.state.lightness_max = max;
                let s = &mut self.state;
                s.lightness_current = s.clamp_lightness(s.lightness_current);
                s.lightness_target = s.clamp_lightness(s.lightness_target);
                self.sync_primary();
                self.changed(timers);
            }
            _ => {}
        }
    }

    /// Pull lightness into a new range and re-drive the LED if it moved.
    fn apply_lightness_range(&mut self, hw: &mut impl NodeHw) {
        let before = self.state.lightness_current;
        self.state.enforce_ranges();
        if self.state.lightness_current != before {
            hw.set_level(self.state.lightness_current, IMMEDIATE);
        }
        self.remember_last();
        self.sync_primary();
    }
}
