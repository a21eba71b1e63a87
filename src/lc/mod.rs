//! Light Controller.
//!
//! The LC server itself (occupancy phases, regulator scheduling) lives in
//! the mesh library.  This module persists its state and property table,
//! reloads both into the library at boot, reacts to its events and runs
//! the LC on/off server that the library redirects to element 1.

pub mod properties;
pub mod regulator;

use log::{info, warn};

use crate::app::ports::{LcServerPort, NodeHw, StoragePort};
use crate::error::{MeshError, StorageError};
use crate::lighting::convert::{actual_to_linear, lightness_from_lc_output};
use crate::mesh::models::{
    GenericRequest, GenericState, IMMEDIATE, ModelId, OnOff, OnPowerUp, ServerRequest,
    ServerStatus, StateChange, StateKind, StateRecall,
};
use crate::mesh::{self, LcEvent};
use crate::store::{self, ByteReader, ByteWriter, PsKey, PsRecord};
use crate::timer::{TimerId, TimerService};
use properties::{LcProperty, LcPropertyState, encode_value};
use regulator::Regulator;

// ---------------------------------------------------------------------------
// Persisted LC state (PS key 0x4005)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LcState {
    /// 0 = manual, 1 = automatic.
    pub mode: u8,
    pub occupancy_mode: u8,
    pub light_onoff: u8,
    pub onoff_current: OnOff,
    pub onoff_target: OnOff,
}

impl PsRecord for LcState {
    const KEY: PsKey = PsKey::LC_STATE;
    const LEN: usize = 5;
    const SAVE_TIMER: TimerId = TimerId::SaveLc;

    fn encode(&self, w: &mut ByteWriter) {
        w.u8(self.mode);
        w.u8(self.occupancy_mode);
        w.u8(self.light_onoff);
        w.u8(self.onoff_current.raw());
        w.u8(self.onoff_target.raw());
    }

    fn decode(r: &mut ByteReader<'_>) -> Self {
        Self {
            mode: r.u8(),
            occupancy_mode: r.u8(),
            light_onoff: r.u8(),
            onoff_current: OnOff::from_raw(r.u8()),
            onoff_target: OnOff::from_raw(r.u8()),
        }
    }

    fn defaults() -> Self {
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

pub struct LightController {
    pub state: LcState,
    pub properties: LcPropertyState,
    pub regulator: Regulator,
    element: u16,
    delayed_onoff_ms: u32,
    save_debounce_ms: u32,
}

impl LightController {
    pub fn new(element: u16, save_debounce_ms: u32) -> Self {
        let properties = LcPropertyState::defaults();
        Self {
            state: LcState::defaults(),
            regulator: Regulator::new(&properties),
            properties,
            element,
            delayed_onoff_ms: 0,
            save_debounce_ms,
        }
    }

    pub const fn element(&self) -> u16 {
        self.element
    }

    fn state_changed(&self, timers: &mut TimerService) {
        store::mark_dirty::<LcState>(timers, self.save_debounce_ms);
    }

    fn properties_changed(&self, timers: &mut TimerService) {
        store::mark_dirty::<LcPropertyState>(timers, self.save_debounce_ms);
    }

    /// Initialise the LC server, restore both records and load every
    /// property into the library.
    pub fn init(
        &mut self,
        timers: &mut TimerService,
        hw: &mut impl NodeHw,
        regulator_interval_ms: u16,
    ) -> Result<(), MeshError> {
        if let Err(e) = hw.lc_server_init(self.element) {
            warn!("LC | server init failed: {}", e);
        }
        self.state = store::load_record(&*hw);
        self.properties = store::load_record(&*hw);
        self.regulator.configure(&self.properties);

        let result = hw.lc_set_regulator_interval(self.element, regulator_interval_ms);
        if let Err(e) = result {
            warn!("LC | set regulator interval failed: {}", e);
        }
        self.push_properties(hw);
        self.properties_changed(timers);
        result
    }

    fn push_properties(&self, hw: &mut impl LcServerPort) {
        for property in LcProperty::ALL {
            let data = encode_value(self.properties.get(property));
            if let Err(e) = hw.lc_update_property(self.element, property.id(), &data) {
                warn!("LC | update property 0x{:04x} failed: {}", property.id(), e);
            }
        }
    }

    // -- Events -------------------------------------------------------------

    pub fn handle_event(&mut self, timers: &mut TimerService, hw: &mut impl NodeHw, event: &LcEvent) {
        match event {
            LcEvent::ModeUpdated(mode) => {
                info!("LC | mode updated: {}", mode);
                self.state.mode = *mode;
                self.regulator.reset();
                self.state_changed(timers);
            }
            LcEvent::OccupancyModeUpdated(om) => {
                info!("LC | occupancy mode updated: {}", om);
                self.state.occupancy_mode = *om;
                self.state_changed(timers);
            }
            LcEvent::LightOnOffUpdated {
                value,
                transition_ms,
            } => {
                info!("LC | light on/off updated: {:?}, transtime={}", value, transition_ms);
                self.state.light_onoff = value.raw();
                self.state_changed(timers);
            }
            LcEvent::OccupancyUpdated(occupancy) => {
                info!("LC | occupancy updated: {}", occupancy);
            }
            LcEvent::AmbientLuxUpdated(centilux) => {
                info!("LC | ambient lux level updated: {}", centilux);
            }
            LcEvent::LinearOutputUpdated(linear) => {
                info!("LC | linear output updated: {}", linear);
                hw.set_level(lightness_from_lc_output(*linear), IMMEDIATE);
            }
            LcEvent::PropertySet { id, value } => self.set_property(timers, *id, value),
        }
    }

    fn set_property(&mut self, timers: &mut TimerService, id: u16, data: &[u8]) {
        info!("LC | set property 0x{:04x}, value={:02x?}", id, data);
        let Some(property) = LcProperty::from_id(id) else {
            warn!("LC | unknown property 0x{:04x}; ignored", id);
            return;
        };
        match property.decode(data) {
            Ok(value) => {
                self.properties.set(property, value);
                info!("LC | {} = {}", property.name(), value);
                self.regulator.configure(&self.properties);
                self.properties_changed(timers);
            }
            Err(e) => warn!("LC | {}", e),
        }
    }

    /// One regulator step against an ambient lux reading; returns the
    /// linear output for the current light on/off phase.
    pub fn regulate(&mut self, ambient_centilux: u32, interval_ms: u16) -> u16 {
        let p = &self.properties;
        let (lux, lightness) = if self.state.light_onoff != 0 {
            (p.ambient_luxlevel_on, p.lightness_on)
        } else {
            (p.ambient_luxlevel_standby, p.lightness_standby)
        };
        self.regulator.set_target(lux);
        self.regulator.set_floor(actual_to_linear(lightness));
        self.regulator.compute(ambient_centilux, f32::from(interval_ms) / 1000.0)
    }

    // -- Power up -----------------------------------------------------------

    /// Bring the library's LC state in line with the lightbulb's OnPowerUp
    /// policy.
    pub fn power_up_update(
        &mut self,
        timers: &mut TimerService,
        hw: &mut impl LcServerPort,
        onpowerup: OnPowerUp,
    ) {
        let element = self.element;
        match onpowerup {
            OnPowerUp::Off | OnPowerUp::On => {
                self.state.mode = 0;
                self.state.light_onoff = 0;
                self.state.onoff_current = OnOff::Off;
                self.state.onoff_target = OnOff::Off;
                self.push_mode(hw);
                report(hw.lc_update_light_onoff(element, OnOff::Off, IMMEDIATE));
            }
            OnPowerUp::Restore => {
                self.push_mode(hw);
                if self.state.mode != 0 {
                    let value = OnOff::from_raw(self.state.light_onoff);
                    report(hw.lc_update_light_onoff(element, value, IMMEDIATE));
                }
            }
        }
        self.state_changed(timers);
    }

    fn push_mode(&self, hw: &mut impl LcServerPort) {
        report(hw.lc_update_mode(self.element, self.state.mode));
        report(hw.lc_update_om(self.element, self.state.occupancy_mode));
    }

    // -- LC on/off server ---------------------------------------------------

    fn onoff_status(&self, remaining_ms: u32) -> ServerStatus {
        ServerStatus {
            model: ModelId::GENERIC_ON_OFF_SERVER,
            element: self.element,
            current: GenericState::OnOff(self.state.onoff_current),
            target: Some(GenericState::OnOff(self.state.onoff_target)),
            remaining_ms,
        }
    }

    fn onoff_update_and_publish(&self, hw: &mut impl NodeHw, remaining_ms: u32) {
        mesh::update_and_publish(hw, &self.onoff_status(remaining_ms), StateKind::OnOff);
    }

    pub fn onoff_request(
        &mut self,
        timers: &mut TimerService,
        hw: &mut impl NodeHw,
        req: &ServerRequest,
    ) {
        let GenericRequest::OnOff(requested) = req.request else {
            warn!("LC | on/off server cannot handle {:?}", req.request);
            return;
        };
        info!(
            "LC | on/off request: {:?}, transition={} delay={}",
            requested, req.transition_ms, req.delay_ms
        );

        if self.state.onoff_current == requested {
            info!("LC | request for current state; no op");
        } else {
            self.state.onoff_target = requested;
            if req.transition_ms == 0 && req.delay_ms == 0 {
                self.state.onoff_current = requested;
            } else if req.delay_ms > 0 {
                self.delayed_onoff_ms = req.transition_ms;
                arm(timers, TimerId::DelayedLcOnOff, req.delay_ms);
            } else {
                if requested.is_on() {
                    self.state.onoff_current = OnOff::On;
                }
                mesh::update(hw, &self.onoff_status(req.transition_ms));
                arm(timers, TimerId::LcOnOffTransition, req.transition_ms);
            }
            self.state_changed(timers);
        }

        let remaining_ms = req.delay_ms + req.transition_ms;
        mesh::respond(hw, req, &self.onoff_status(remaining_ms));
        self.onoff_update_and_publish(hw, remaining_ms);
    }

    pub fn onoff_change(&mut self, timers: &mut TimerService, change: &StateChange) {
        let GenericState::OnOff(current) = change.current else {
            return;
        };
        if current == self.state.onoff_current {
            info!("LC | on/off change: same state as before");
        } else {
            info!("LC | on/off changed {:?} -> {:?}", self.state.onoff_current, current);
            self.state.onoff_current = current;
            self.state_changed(timers);
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
        self.state.onoff_target = target;

        if self.state.onoff_current == target {
            info!("LC | on/off recall of current state; no op");
        } else {
            info!("LC | recall on/off {:?} over {} ms", target, recall.transition_ms);
            if recall.transition_ms == IMMEDIATE {
                self.state.onoff_current = target;
            } else {
                if target.is_on() {
                    self.state.onoff_current = OnOff::On;
                }
                arm(timers, TimerId::LcOnOffTransition, recall.transition_ms);
            }
            self.state_changed(timers);
        }
        self.onoff_update_and_publish(hw, recall.transition_ms);
    }

    fn delayed_onoff(&mut self, timers: &mut TimerService, hw: &mut impl NodeHw) {
        let transition_ms = self.delayed_onoff_ms;
        info!(
            "LC | delayed on/off: {:?} -> {:?}, {} ms",
            self.state.onoff_current, self.state.onoff_target, transition_ms
        );
        if transition_ms == 0 {
            self.state.onoff_current = self.state.onoff_target;
            self.state_changed(timers);
            self.onoff_update_and_publish(hw, IMMEDIATE);
        } else {
            if self.state.onoff_target.is_on() {
                self.state.onoff_current = OnOff::On;
                mesh::update(hw, &self.onoff_status(transition_ms));
            }
            arm(timers, TimerId::LcOnOffTransition, transition_ms);
        }
    }

    fn onoff_transition_complete(&mut self, timers: &mut TimerService, hw: &mut impl NodeHw) {
        self.state.onoff_current = self.state.onoff_target;
        info!("LC | on/off transition complete: {:?}", self.state.onoff_current);
        self.state_changed(timers);
        self.onoff_update_and_publish(hw, IMMEDIATE);
    }

    // -- Timers -------------------------------------------------------------

    pub fn save_state(&self, storage: &mut impl StoragePort) -> Result<(), StorageError> {
        store::save_record(&self.state, storage)
    }

    /// Handle an LC timer expiry.  Returns `false` for handles the
    /// controller does not own.
    pub fn handle_timer(
        &mut self,
        id: TimerId,
        timers: &mut TimerService,
        hw: &mut impl NodeHw,
    ) -> bool {
        match id {
            TimerId::SaveLc => {
                if let Err(e) = self.save_state(hw) {
                    warn!("LC | state save failed: {}", e);
                }
            }
            TimerId::SaveLcProperty => {
                if let Err(e) = store::save_record(&self.properties, hw) {
                    warn!("LC | property state save failed: {}", e);
                }
            }
            TimerId::DelayedLcOnOff => self.delayed_onoff(timers, hw),
            TimerId::LcOnOffTransition => self.onoff_transition_complete(timers, hw),
            _ => return false,
        }
        true
    }
}

fn arm(timers: &mut TimerService, id: TimerId, delay_ms: u32) {
    if let Err(e) = timers.set(id, delay_ms, false) {
        warn!("LC | cannot arm {:?}: {}", id, e);
    }
}

fn report(result: Result<(), MeshError>) {
    if let Err(e) = result {
        warn!("LC | server update failed: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct LcLib {
        modes: Vec<u8>,
        oms: Vec<u8>,
        light_onoff: Vec<OnOff>,
    }

    impl LcServerPort for LcLib {
        fn lc_server_init(&mut self, _element: u16) -> Result<(), MeshError> {
            Ok(())
        }

        fn lc_set_regulator_interval(&mut self, _element: u16, _ms: u16) -> Result<(), MeshError> {
            Ok(())
        }

        fn lc_update_mode(&mut self, _element: u16, mode: u8) -> Result<(), MeshError> {
            self.modes.push(mode);
            Ok(())
        }

        fn lc_update_om(&mut self, _element: u16, om: u8) -> Result<(), MeshError> {
            self.oms.push(om);
            Ok(())
        }

        fn lc_update_light_onoff(
            &mut self,
            _element: u16,
            value: OnOff,
            _remaining_ms: u32,
        ) -> Result<(), MeshError> {
            self.light_onoff.push(value);
            Ok(())
        }

        fn lc_update_property(&mut self, _element: u16, _id: u16, _data: &[u8]) -> Result<(), MeshError> {
            Ok(())
        }
    }

    #[test]
    fn lc_state_layout() {
        let state = LcState {
            mode: 1,
            occupancy_mode: 1,
            light_onoff: 1,
            onoff_current: OnOff::On,
            onoff_target: OnOff::Off,
        };
        let mut w = ByteWriter::new();
        state.encode(&mut w);
        assert_eq!(w.as_bytes(), &[1, 1, 1, 1, 0]);
        assert_eq!(LcState::decode(&mut ByteReader::new(w.as_bytes())), state);
    }

    #[test]
    fn power_up_off_forces_manual_mode() {
        let mut lc = LightController::new(1, 5000);
        lc.state.mode = 1;
        lc.state.light_onoff = 1;
        lc.state.occupancy_mode = 1;
        let mut timers = TimerService::new();
        let mut lib = LcLib::default();

        lc.power_up_update(&mut timers, &mut lib, OnPowerUp::On);

        assert_eq!(lc.state.mode, 0);
        assert_eq!(lc.state.light_onoff, 0);
        assert_eq!(lib.modes, vec![0]);
        assert_eq!(lib.oms, vec![1]);
        assert_eq!(lib.light_onoff, vec![OnOff::Off]);
        assert!(timers.is_active(TimerId::SaveLc));
    }

    #[test]
    fn power_up_restore_pushes_light_onoff_only_in_auto_mode() {
        let mut lc = LightController::new(1, 5000);
        let mut timers = TimerService::new();
        let mut lib = LcLib::default();
        lc.power_up_update(&mut timers, &mut lib, OnPowerUp::Restore);
        assert!(lib.light_onoff.is_empty());

        lc.state.mode = 1;
        lc.state.light_onoff = 1;
        lc.power_up_update(&mut timers, &mut lib, OnPowerUp::Restore);
        assert_eq!(lib.light_onoff, vec![OnOff::On]);
        assert_eq!(lib.modes, vec![0, 1]);
    }

    #[test]
    fn regulate_uses_standby_phase_when_light_is_off() {
        let mut lc = LightController::new(1, 5000);
        // ambient above the 0.20 lux standby target: output sits at the floor
        let out = lc.regulate(10_000, 100);
        assert_eq!(out, actual_to_linear(lc.properties.lightness_standby));
    }
}
