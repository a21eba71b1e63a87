//! Generic OnOff, Power OnOff and Default Transition Time servers
//! (element 0).

use log::{info, warn};

use super::{LevelChannel, LightingEngine};
use crate::app::ports::NodeHw;
use crate::mesh::models::{
    GenericRequest, GenericState, IMMEDIATE, LightnessKind, ModelId, PRIMARY_ELEMENT,
    ServerRequest, ServerStatus, StateChange, StateKind, StateRecall, transition_time_ms,
};
use crate::mesh;
use crate::timer::{TimerId, TimerService};

impl LightingEngine {
    pub(super) fn onoff_status(&self, remaining_ms: u32) -> ServerStatus {
        ServerStatus {
            model: ModelId::GENERIC_ON_OFF_SERVER,
            element: PRIMARY_ELEMENT,
            current: GenericState::OnOff(self.state.onoff_current),
            target: Some(GenericState::OnOff(self.state.onoff_target)),
            remaining_ms,
        }
    }

    pub(super) fn onoff_update_and_publish(&mut self, hw: &mut impl NodeHw, remaining_ms: u32) {
        mesh::update_and_publish(hw, &self.onoff_status(remaining_ms), StateKind::OnOff);
    }

    pub fn onoff_request(
        &mut self,
        timers: &mut TimerService,
        hw: &mut impl NodeHw,
        req: &ServerRequest,
    ) {
        let GenericRequest::OnOff(requested) = req.request else {
            warn!("LIGHT | on/off server cannot handle {:?}", req.request);
            return;
        };
        info!(
            "LIGHT | on/off request: {:?}, transition={} delay={}",
            requested, req.transition_ms, req.delay_ms
        );
        self.stop_move(LevelChannel::Primary, timers);

        let remaining_ms = if self.state.onoff_current == requested
            && self.state.onoff_target == requested
        {
            info!("LIGHT | request for current state; no op");
            IMMEDIATE
        } else {
            timers.cancel(TimerId::DelayedOnOff);
            timers.cancel(TimerId::OnOffTransition);
            self.state.onoff_target = requested;

            if req.transition_ms == 0 && req.delay_ms == 0 {
                self.snap_onoff(hw);
            } else if req.delay_ms > 0 {
                self.delayed.onoff = req.transition_ms;
                Self::arm(timers, TimerId::DelayedOnOff, req.delay_ms);
            } else {
                self.start_onoff_transition(timers, hw, req.transition_ms);
            }
            self.changed(timers);
            req.delay_ms + req.transition_ms
        };

        mesh::respond(hw, req, &self.onoff_status(remaining_ms));
        self.onoff_update_and_publish(hw, remaining_ms);
        self.lightness_update_and_publish(hw, remaining_ms, LightnessKind::Actual);
    }

    /// Drive lightness straight to the level implied by `onoff_target`.
    fn snap_onoff(&mut self, hw: &mut impl NodeHw) {
        let target = if self.state.onoff_target.is_on() {
            self.on_lightness()
        } else {
            0
        };
        self.state.lightness_target = target;
        self.state.lightness_current = target;
        hw.set_level(target, IMMEDIATE);
        self.sync_primary();
    }

    fn start_onoff_transition(
        &mut self,
        timers: &mut TimerService,
        hw: &mut impl NodeHw,
        transition_ms: u32,
    ) {
        self.state.lightness_target = if self.state.onoff_target.is_on() {
            self.on_lightness()
        } else {
            0
        };
        // the light reads as on until an off ramp completes
        self.begin_primary_ramp();
        mesh::update(hw, &self.onoff_status(transition_ms));
        hw.set_level(self.state.lightness_target, transition_ms);
        Self::arm(timers, TimerId::OnOffTransition, transition_ms);
    }

    pub(super) fn delayed_onoff(&mut self, timers: &mut TimerService, hw: &mut impl NodeHw) {
        let transition_ms = self.delayed.onoff;
        info!(
            "LIGHT | delayed on/off: {:?} -> {:?}, {} ms",
            self.state.onoff_current, self.state.onoff_target, transition_ms
        );
        if transition_ms == 0 {
            self.snap_onoff(hw);
            self.changed(timers);
            self.onoff_update_and_publish(hw, IMMEDIATE);
            self.lightness_update_and_publish(hw, IMMEDIATE, LightnessKind::Actual);
        } else {
            self.start_onoff_transition(timers, hw, transition_ms);
            self.changed(timers);
        }
    }

    pub(super) fn onoff_transition_complete(
        &mut self,
        timers: &mut TimerService,
        hw: &mut impl NodeHw,
    ) {
        self.state.lightness_current = self.state.lightness_target;
        self.remember_last();
        self.sync_primary();
        info!("LIGHT | on/off transition complete: {:?}", self.state.onoff_current);
        self.changed(timers);
        self.onoff_update_and_publish(hw, IMMEDIATE);
        self.lightness_update_and_publish(hw, IMMEDIATE, LightnessKind::Actual);
    }

    pub fn onoff_change(&mut self, timers: &mut TimerService, change: &StateChange) {
        let GenericState::OnOff(current) = change.current else {
            return;
        };
        self.stop_move(LevelChannel::Primary, timers);
        if current == self.state.onoff_current {
            info!("LIGHT | on/off change: same state as before");
        } else {
            info!("LIGHT | on/off changed {:?} -> {:?}", self.state.onoff_current, current);
            self.state.onoff_current = current;
            self.changed(timers);
        }
    }

    pub fn onoff_recall(
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
        let GenericState::OnOff(target) = state else {
            return;
        };

        if self.state.onoff_current == target && self.state.onoff_target == target {
            info!("LIGHT | on/off recall of current state; no op");
        } else {
            info!("LIGHT | recall on/off {:?} over {} ms", target, recall.transition_ms);
            self.stop_move(LevelChannel::Primary, timers);
            timers.cancel(TimerId::DelayedOnOff);
            timers.cancel(TimerId::OnOffTransition);
            self.state.onoff_target = target;
            if recall.transition_ms == IMMEDIATE {
                self.snap_onoff(hw);
            } else {
                self.start_onoff_transition(timers, hw, recall.transition_ms);
            }
            self.changed(timers);
        }
        self.onoff_update_and_publish(hw, recall.transition_ms);
        self.lightness_update_and_publish(hw, recall.transition_ms, LightnessKind::Actual);
    }

    // -- Power OnOff --------------------------------------------------------

    fn power_onoff_status(&self) -> ServerStatus {
        ServerStatus {
            model: ModelId::GENERIC_POWER_ON_OFF_SERVER,
            element: PRIMARY_ELEMENT,
            current: GenericState::OnPowerUp(self.state.onpowerup),
            target: None,
            remaining_ms: IMMEDIATE,
        }
    }

    pub(super) fn power_onoff_update_and_publish(&mut self, hw: &mut impl NodeHw) {
        mesh::update_and_publish(hw, &self.power_onoff_status(), StateKind::OnPowerUp);
    }

    pub fn power_onoff_request(
        &mut self,
        timers: &mut TimerService,
        hw: &mut impl NodeHw,
        req: &ServerRequest,
    ) {
        let GenericRequest::OnPowerUp(requested) = req.request else {
            warn!("LIGHT | power on/off server cannot handle {:?}", req.request);
            return;
        };
        info!("LIGHT | on power up request: {:?}", requested);
        if self.state.onpowerup == requested {
            info!("LIGHT | request for current state; no op");
        } else {
            self.state.onpowerup = requested;
            self.changed(timers);
        }
        mesh::respond(hw, req, &self.power_onoff_status());
        self.power_onoff_update_and_publish(hw);
    }

    pub fn power_onoff_change(&mut self, timers: &mut TimerService, change: &StateChange) {
        if let GenericState::OnPowerUp(value) = change.current {
            if value != self.state.onpowerup {
                info!("LIGHT | on power up changed {:?} -> {:?}", self.state.onpowerup, value);
                self.state.onpowerup = value;
                self.changed(timers);
            }
        }
    }

    // -- Default Transition Time --------------------------------------------

    fn transtime_status(&self) -> ServerStatus {
        ServerStatus {
            model: ModelId::GENERIC_DEFAULT_TRANSITION_TIME_SERVER,
            element: PRIMARY_ELEMENT,
            current: GenericState::TransitionTime(self.state.transtime),
            target: None,
            remaining_ms: IMMEDIATE,
        }
    }

    pub fn transtime_request(
        &mut self,
        timers: &mut TimerService,
        hw: &mut impl NodeHw,
        req: &ServerRequest,
    ) {
        let GenericRequest::TransitionTime(raw) = req.request else {
            warn!("LIGHT | transition time server cannot handle {:?}", req.request);
            return;
        };
        info!("LIGHT | default transition time request: {} ms", transition_time_ms(raw));
        if self.state.transtime == raw {
            info!("LIGHT | request for current state; no op");
        } else {
            self.state.transtime = raw;
            self.changed(timers);
        }
        mesh::respond(hw, req, &self.transtime_status());
        mesh::update_and_publish(hw, &self.transtime_status(), StateKind::TransitionTime);
    }

    pub fn transtime_change(&mut self, timers: &mut TimerService, change: &StateChange) {
        if let GenericState::TransitionTime(raw) = change.current {
            if raw != self.state.transtime {
                info!("LIGHT | default transition time changed to {} ms", transition_time_ms(raw));
                self.state.transtime = raw;
                self.changed(timers);
            }
        }
    }
}
