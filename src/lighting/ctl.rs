//! Light CTL server (element 0), CTL temperature server (element 1) and
//! CTL setup server.

use log::{info, warn};

use super::convert::level_from_lightness;
use super::state::{MAX_TEMPERATURE, MIN_TEMPERATURE};
use super::{LevelChannel, LightingEngine};
use crate::app::ports::NodeHw;
use crate::mesh;
use crate::mesh::models::{
    GenericRequest, GenericState, IMMEDIATE, LightnessKind, ModelId, PRIMARY_ELEMENT,
    SECONDARY_ELEMENT, ServerRequest, ServerStatus, StateChange, StateKind, StateRecall,
};
use crate::timer::{TimerId, TimerService};

impl LightingEngine {
    // -- Status -------------------------------------------------------------

    fn ctl_status(&self, remaining_ms: u32) -> ServerStatus {
        let s = &self.state;
        ServerStatus {
            model: ModelId::LIGHT_CTL_SERVER,
            element: PRIMARY_ELEMENT,
            current: GenericState::Ctl {
                lightness: s.lightness_current,
                temperature: s.temperature_current,
                deltauv: s.deltauv_current,
            },
            target: Some(GenericState::Ctl {
                lightness: s.lightness_target,
                temperature: s.temperature_target,
                deltauv: s.deltauv_target,
            }),
            remaining_ms,
        }
    }

    pub(super) fn ctl_update_and_publish(&mut self, hw: &mut impl NodeHw, remaining_ms: u32) {
        mesh::update_and_publish(hw, &self.ctl_status(remaining_ms), StateKind::Ctl);
    }

    fn ctl_temperature_status(&self, remaining_ms: u32) -> ServerStatus {
        let s = &self.state;
        ServerStatus {
            model: ModelId::LIGHT_CTL_TEMPERATURE_SERVER,
            element: SECONDARY_ELEMENT,
            current: GenericState::CtlTemperature {
                temperature: s.temperature_current,
                deltauv: s.deltauv_current,
            },
            target: Some(GenericState::CtlTemperature {
                temperature: s.temperature_target,
                deltauv: s.deltauv_target,
            }),
            remaining_ms,
        }
    }

    pub(super) fn ctl_temperature_update_and_publish(
        &mut self,
        hw: &mut impl NodeHw,
        remaining_ms: u32,
    ) {
        mesh::update_and_publish(
            hw,
            &self.ctl_temperature_status(remaining_ms),
            StateKind::CtlTemperature,
        );
    }

    fn publish_ctl_bound(&mut self, hw: &mut impl NodeHw, remaining_ms: u32) {
        self.lightness_update_and_publish(hw, remaining_ms, LightnessKind::Actual);
        self.ctl_temperature_update_and_publish(hw, remaining_ms);
    }

    fn publish_ctl_temperature_bound(&mut self, hw: &mut impl NodeHw, remaining_ms: u32) {
        self.level_update_and_publish(LevelChannel::Secondary, hw, remaining_ms);
        self.ctl_update_and_publish(hw, remaining_ms);
    }

    // -- CTL ----------------------------------------------------------------

    pub fn ctl_request(
        &mut self,
        timers: &mut TimerService,
        hw: &mut impl NodeHw,
        req: &ServerRequest,
    ) {
        let GenericRequest::Ctl {
            lightness,
            temperature,
            deltauv,
        } = req.request
        else {
            warn!("LIGHT | CTL server cannot handle {:?}", req.request);
            return;
        };
        let lightness = self.state.clamp_lightness(lightness);
        let temperature = self.state.clamp_temperature(temperature);
        info!(
            "LIGHT | CTL request: lightness={} temperature={} deltauv={}, transition={} delay={}",
            lightness, temperature, deltauv, req.transition_ms, req.delay_ms
        );
        self.stop_move(LevelChannel::Primary, timers);
        self.stop_move(LevelChannel::Secondary, timers);

        let s = &self.state;
        let unchanged = s.lightness_current == lightness
            && s.lightness_target == lightness
            && s.temperature_current == temperature
            && s.temperature_target == temperature
            && s.deltauv_current == deltauv
            && s.deltauv_target == deltauv;

        let remaining_ms = if unchanged {
            info!("LIGHT | request for current state; no op");
            IMMEDIATE
        } else {
            timers.cancel(TimerId::DelayedCtl);
            timers.cancel(TimerId::CtlTransition);
            let s = &mut self.state;
            s.lightness_target = lightness;
            s.temperature_target = temperature;
            s.deltauv_target = deltauv;

            if req.transition_ms == 0 && req.delay_ms == 0 {
                self.snap_ctl(hw);
            } else if req.delay_ms > 0 {
                self.delayed.ctl = req.transition_ms;
                Self::arm(timers, TimerId::DelayedCtl, req.delay_ms);
            } else {
                self.start_ctl_transition(timers, hw, req.transition_ms);
            }
            self.changed(timers);
            req.delay_ms + req.transition_ms
        };

        mesh::respond(hw, req, &self.ctl_status(remaining_ms));
        self.ctl_update_and_publish(hw, remaining_ms);
        self.publish_ctl_bound(hw, remaining_ms);
    }

    fn snap_ctl(&mut self, hw: &mut impl NodeHw) {
        let s = &mut self.state;
        s.lightness_current = s.lightness_target;
        s.temperature_current = s.temperature_target;
        s.deltauv_current = s.deltauv_target;
        hw.set_level(s.lightness_current, IMMEDIATE);
        hw.set_temperature(s.temperature_current, s.deltauv_current, IMMEDIATE);
        self.remember_last();
        self.sync_primary();
        self.sync_secondary();
    }

    fn start_ctl_transition(
        &mut self,
        timers: &mut TimerService,
        hw: &mut impl NodeHw,
        transition_ms: u32,
    ) {
        self.begin_primary_ramp();
        self.sync_secondary();
        let s = &self.state;
        hw.set_level(s.lightness_target, transition_ms);
        hw.set_temperature(s.temperature_target, s.deltauv_target, transition_ms);
        Self::arm(timers, TimerId::CtlTransition, transition_ms);
    }

    pub(super) fn delayed_ctl(&mut self, timers: &mut TimerService, hw: &mut impl NodeHw) {
        let transition_ms = self.delayed.ctl;
        info!("LIGHT | delayed CTL, {} ms", transition_ms);
        if transition_ms == 0 {
            self.snap_ctl(hw);
            self.changed(timers);
            self.ctl_update_and_publish(hw, IMMEDIATE);
            self.publish_ctl_bound(hw, IMMEDIATE);
        } else {
            self.start_ctl_transition(timers, hw, transition_ms);
            self.changed(timers);
            mesh::update(hw, &self.ctl_status(transition_ms));
        }
    }

    pub(super) fn ctl_transition_complete(
        &mut self,
        timers: &mut TimerService,
        hw: &mut impl NodeHw,
    ) {
        let s = &mut self.state;
        s.lightness_current = s.lightness_target;
        s.temperature_current = s.temperature_target;
        s.deltauv_current = s.deltauv_target;
        self.remember_last();
        self.sync_primary();
        self.sync_secondary();
        info!("LIGHT | CTL transition complete");
        self.changed(timers);
        self.ctl_update_and_publish(hw, IMMEDIATE);
        self.publish_ctl_bound(hw, IMMEDIATE);
    }

    pub fn ctl_change(&mut self, timers: &mut TimerService, change: &StateChange) {
        let GenericState::Ctl {
            lightness,
            temperature,
            deltauv,
        } = change.current
        else {
            return;
        };
        self.stop_move(LevelChannel::Primary, timers);
        self.stop_move(LevelChannel::Secondary, timers);
        let s = &mut self.state;
        let lightness = s.clamp_lightness(lightness);
        let temperature = s.clamp_temperature(temperature);
        if (s.lightness_current, s.temperature_current, s.deltauv_current)
            == (lightness, temperature, deltauv)
        {
            info!("LIGHT | CTL change: same state as before");
            return;
        }
        info!(
            "LIGHT | CTL changed to lightness={} temperature={} deltauv={}",
            lightness, temperature, deltauv
        );
        s.lightness_current = lightness;
        s.temperature_current = temperature;
        s.deltauv_current = deltauv;
        s.pri_level_current = level_from_lightness(lightness);
        self.remember_last();
        self.sync_secondary();
        self.changed(timers);
    }

    pub fn ctl_recall(
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
        let GenericState::Ctl {
            lightness,
            temperature,
            deltauv,
        } = state
        else {
            return;
        };
        let s = &mut self.state;
        s.lightness_target = s.clamp_lightness(lightness);
        s.temperature_target = s.clamp_temperature(temperature);
        s.deltauv_target = deltauv;

        let unchanged = s.lightness_current == s.lightness_target
            && s.temperature_current == s.temperature_target
            && s.deltauv_current == s.deltauv_target;
        if unchanged {
            info!("LIGHT | CTL recall of current state; no op");
        } else {
            info!("LIGHT | recall CTL over {} ms", recall.transition_ms);
            if recall.transition_ms == IMMEDIATE {
                self.snap_ctl(hw);
            } else {
                self.start_ctl_transition(timers, hw, recall.transition_ms);
            }
            self.changed(timers);
        }
        self.ctl_update_and_publish(hw, recall.transition_ms);
    }

    // -- CTL temperature ----------------------------------------------------

    pub fn ctl_temperature_request(
        &mut self,
        timers: &mut TimerService,
        hw: &mut impl NodeHw,
        req: &ServerRequest,
    ) {
        let GenericRequest::CtlTemperature {
            temperature,
            deltauv,
        } = req.request
        else {
            warn!("LIGHT | CTL temperature server cannot handle {:?}", req.request);
            return;
        };
        let temperature = self.state.clamp_temperature(temperature);
        info!(
            "LIGHT | CTL temperature request: {} K deltauv={}, transition={} delay={}",
            temperature, deltauv, req.transition_ms, req.delay_ms
        );
        self.stop_move(LevelChannel::Secondary, timers);

        let s = &self.state;
        let unchanged = s.temperature_current == temperature
            && s.temperature_target == temperature
            && s.deltauv_current == deltauv
            && s.deltauv_target == deltauv;

        let remaining_ms = if unchanged {
            info!("LIGHT | request for current state; no op");
            IMMEDIATE
        } else {
            timers.cancel(TimerId::DelayedCtlTemp);
            timers.cancel(TimerId::CtlTempTransition);
            self.state.temperature_target = temperature;
            self.state.deltauv_target = deltauv;

            if req.transition_ms == 0 && req.delay_ms == 0 {
                self.snap_temperature(hw);
            } else if req.delay_ms > 0 {
                self.delayed.ctl_temperature = req.transition_ms;
                Self::arm(timers, TimerId::DelayedCtlTemp, req.delay_ms);
            } else {
                self.start_temperature_transition(timers, hw, req.transition_ms);
            }
            self.changed(timers);
            req.delay_ms + req.transition_ms
        };

        mesh::respond(hw, req, &self.ctl_temperature_status(remaining_ms));
        self.ctl_temperature_update_and_publish(hw, remaining_ms);
        self.publish_ctl_temperature_bound(hw, remaining_ms);
    }

    fn snap_temperature(&mut self, hw: &mut impl NodeHw) {
        let s = &mut self.state;
        s.temperature_current = s.temperature_target;
        s.deltauv_current = s.deltauv_target;
        hw.set_temperature(s.temperature_current, s.deltauv_current, IMMEDIATE);
        self.sync_secondary();
    }

    fn start_temperature_transition(
        &mut self,
        timers: &mut TimerService,
        hw: &mut impl NodeHw,
        transition_ms: u32,
    ) {
        self.sync_secondary();
        let s = &self.state;
        hw.set_temperature(s.temperature_target, s.deltauv_target, transition_ms);
        Self::arm(timers, TimerId::CtlTempTransition, transition_ms);
    }

    pub(super) fn delayed_ctl_temperature(
        &mut self,
        timers: &mut TimerService,
        hw: &mut impl NodeHw,
    ) {
        let transition_ms = self.delayed.ctl_temperature;
        info!("LIGHT | delayed CTL temperature, {} ms", transition_ms);
        if transition_ms == 0 {
            self.snap_temperature(hw);
            self.changed(timers);
            self.ctl_temperature_update_and_publish(hw, IMMEDIATE);
            self.publish_ctl_temperature_bound(hw, IMMEDIATE);
        } else {
            self.start_temperature_transition(timers, hw, transition_ms);
            self.changed(timers);
            mesh::update(hw, &self.ctl_temperature_status(transition_ms));
        }
    }

    pub(super) fn ctl_temperature_transition_complete(
        &mut self,
        timers: &mut TimerService,
        hw: &mut impl NodeHw,
    ) {
        let s = &mut self.state;
        s.temperature_current = s.temperature_target;
        s.deltauv_current = s.deltauv_target;
        self.sync_secondary();
        info!("LIGHT | CTL temperature transition complete: {} K", self.state.temperature_current);
        self.changed(timers);
        self.ctl_temperature_update_and_publish(hw, IMMEDIATE);
        self.publish_ctl_temperature_bound(hw, IMMEDIATE);
    }

    pub fn ctl_temperature_change(&mut self, timers: &mut TimerService, change: &StateChange) {
        let GenericState::CtlTemperature {
            temperature,
            deltauv,
        } = change.current
        else {
            return;
        };
        self.stop_move(LevelChannel::Secondary, timers);
        let s = &mut self.state;
        let temperature = s.clamp_temperature(temperature);
        if (s.temperature_current, s.deltauv_current) == (temperature, deltauv) {
            info!("LIGHT | CTL temperature change: same state as before");
            return;
        }
        info!("LIGHT | CTL temperature changed to {} K deltauv={}", temperature, deltauv);
        s.temperature_current = temperature;
        s.deltauv_current = deltauv;
        self.sync_secondary();
        self.changed(timers);
    }

    pub fn ctl_temperature_recall(
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
        let GenericState::CtlTemperature {
            temperature,
            deltauv,
        } = state
        else {
            return;
        };
        let s = &mut self.state;
        s.temperature_target = s.clamp_temperature(temperature);
        s.deltauv_target = deltauv;

        if s.temperature_current == s.temperature_target && s.deltauv_current == s.deltauv_target {
            info!("LIGHT | CTL temperature recall of current state; no op");
        } else {
            info!("LIGHT | recall CTL temperature over {} ms", recall.transition_ms);
            if recall.transition_ms == IMMEDIATE {
                self.snap_temperature(hw);
            } else {
                self.start_temperature_transition(timers, hw, recall.transition_ms);
            }
            self.changed(timers);
        }
        self.ctl_temperature_update_and_publish(hw, recall.transition_ms);
    }

    // -- CTL setup ----------------------------------------------------------

    fn ctl_setup_status(&self, kind: StateKind) -> ServerStatus {
        let s = &self.state;
        let current = match kind {
            StateKind::CtlTemperatureRange => GenericState::CtlTemperatureRange {
                min: s.temperature_min,
                max: s.temperature_max,
            },
            _ => GenericState::CtlDefault {
                lightness: s.lightness_default,
                temperature: s.temperature_default,
                deltauv: s.deltauv_default,
            },
        };
        ServerStatus {
            model: ModelId::LIGHT_CTL_SETUP_SERVER,
            element: PRIMARY_ELEMENT,
            current,
            target: None,
            remaining_ms: IMMEDIATE,
        }
    }

    pub fn ctl_setup_request(
        &mut self,
        timers: &mut TimerService,
        hw: &mut impl NodeHw,
        req: &ServerRequest,
    ) {
        let kind = match req.request {
            GenericRequest::CtlDefault {
                lightness,
                temperature,
                deltauv,
            } => {
                info!(
                    "LIGHT | CTL default request: lightness={} temperature={} deltauv={}",
                    lightness, temperature, deltauv
                );
                self.set_ctl_default(timers, lightness, temperature, deltauv);
                StateKind::CtlDefault
            }
            GenericRequest::CtlTemperatureRange { min, max } => {
                info!("LIGHT | CTL temperature range request: {}..={}", min, max);
                if !valid_temperature_range(min, max) {
                    warn!("LIGHT | invalid temperature range {}..={}; ignored", min, max);
                    return;
                }
                if (min, max) != (self.state.temperature_min, self.state.temperature_max) {
                    self.state.temperature_min = min;
                    self.state.temperature_max = max;
                    self.apply_temperature_range(hw);
                    self.changed(timers);
                }
                StateKind::CtlTemperatureRange
            }
            _ => {
                warn!("LIGHT | CTL setup server cannot handle {:?}", req.request);
                return;
            }
        };
        let status = self.ctl_setup_status(kind);
        mesh::respond(hw, req, &status);
        mesh::update_and_publish(hw, &status, kind);
    }

    fn set_ctl_default(
        &mut self,
        timers: &mut TimerService,
        lightness: u16,
        temperature: u16,
        deltauv: i16,
    ) {
        let s = &mut self.state;
        let requested = (lightness, temperature, deltauv);
        if requested != (s.lightness_default, s.temperature_default, s.deltauv_default) {
            s.lightness_default = lightness;
            s.temperature_default = temperature;
            s.deltauv_default = deltauv;
            self.changed(timers);
        }
    }

    pub fn ctl_setup_change(
        &mut self,
        timers: &mut TimerService,
        hw: &mut impl NodeHw,
        change: &StateChange,
    ) {
        match change.current {
            GenericState::CtlDefault {
                lightness,
                temperature,
                deltauv,
            } => self.set_ctl_default(timers, lightness, temperature, deltauv),
            GenericState::CtlTemperatureRange { min, max }
                if valid_temperature_range(min, max)
                    && (min, max) != (self.state.temperature_min, self.state.temperature_max) =>
            {
                info!("LIGHT | CTL temperature range changed to {}..={}", min, max);
                self.state.temperature_min = min;
                self.state.temperature_max = max;
                self.apply_temperature_range(hw);
                self.changed(timers);
            }
            _ => {}
        }
    }

    fn apply_temperature_range(&mut self, hw: &mut impl NodeHw) {
        let before = self.state.temperature_current;
        self.state.enforce_ranges();
        let s = &self.state;
        if s.temperature_current != before {
            hw.set_temperature(s.temperature_current, s.deltauv_current, IMMEDIATE);
        }
        self.sync_secondary();
    }
}

fn valid_temperature_range(min: u16, max: u16) -> bool {
    min <= max && min >= MIN_TEMPERATURE && max <= MAX_TEMPERATURE
}
