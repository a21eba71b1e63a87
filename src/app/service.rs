//! Application service, the hexagonal core.
//!
//! [`AppService`] owns the soft timers, the mesh lifecycle, the model
//! dispatcher, the rule engine and the acquisition pipeline.  It is a
//! single cooperative event loop: every iteration takes one expired
//! timer, one external signal or one mesh event and runs its handler to
//! completion.  All I/O flows through port traits injected at call sites,
//! making the entire service testable with mock adapters.
//!
//! ```text
//!   MeshInbox ──▶ ┌──────────────────────────────┐ ──▶ EventSink
//!  SignalQueue ──▶│          AppService          │
//!    timers   ──▶ │ lifecycle · models · rules   │ ◀─▶ NodeHw
//!                 │ acquisition · sleep governor │
//!                 └──────────────────────────────┘
//! ```

use log::{debug, info, warn};

use crate::config::NodeConfig;
use crate::error::MeshError;
use crate::events::{ExternalSignal, SignalQueue};
use crate::fsm::StateId;
use crate::mesh::dispatcher::Dispatcher;
use crate::mesh::inbox::MeshInbox;
use crate::mesh::lifecycle::{LifecycleAction, NodeLifecycle, NodeState};
use crate::mesh::{MeshEvent, SceneEvent};
use crate::power::{EnergyMode, SleepGovernor};
use crate::sensors::SensorHub;
use crate::timer::TimerId;

use super::events::AppEvent;
use super::models::{self, NodeCore};
use super::ports::{EventSink, NodeHw};
use super::rules::RuleEngine;

/// Upper bound on loop iterations in [`AppService::run_until_idle`].
const MAX_ITERATIONS: usize = 4096;

// ───────────────────────────────────────────────────────────────
// AppService
// ───────────────────────────────────────────────────────────────

/// The application service orchestrates all domain logic.
pub struct AppService<'q, H: NodeHw> {
    config: NodeConfig,
    core: NodeCore,
    dispatcher: Dispatcher<NodeCore, H>,
    lifecycle: NodeLifecycle,
    rules: RuleEngine,
    sensors: SensorHub,
    governor: SleepGovernor,
    signals: &'q SignalQueue,
    inbox: &'q MeshInbox,
    models_ready: bool,
}

impl<'q, H: NodeHw> AppService<'q, H> {
    /// Construct the service from configuration and the two interrupt-side
    /// queues.
    ///
    /// Does **not** touch hardware; call [`start`](Self::start) next.
    pub fn new(config: NodeConfig, signals: &'q SignalQueue, inbox: &'q MeshInbox) -> Self {
        Self {
            core: NodeCore::new(config.save_debounce_ms),
            dispatcher: Dispatcher::new(),
            lifecycle: NodeLifecycle::new(&config),
            rules: RuleEngine::new(&config),
            sensors: SensorHub::new(&config),
            governor: SleepGovernor::new(),
            signals,
            inbox,
            models_ready: false,
            config,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Put the acquisition pipeline in POWER_OFF and sync the clock.  The
    /// mesh stack's boot event starts the node lifecycle.
    pub fn start(&mut self, hw: &mut H, sink: &mut impl EventSink) {
        self.core.timers.set_now(hw.now_ticks());
        self.sensors
            .init(&mut self.core.timers, hw, &mut self.governor, self.signals);
        sink.emit(&AppEvent::Started);
        info!("AppService started");
    }

    // ── Event loop ────────────────────────────────────────────

    /// Run one loop iteration.  Returns `false` when there was nothing to
    /// do.
    pub fn step(&mut self, hw: &mut H, sink: &mut impl EventSink) -> bool {
        self.core.timers.set_now(hw.now_ticks());

        if let Some(id) = self.core.timers.next_expired() {
            self.handle_timer(id, hw, sink);
            return true;
        }
        if let Some(signal) = self.signals.take() {
            self.handle_signal(signal, hw, sink);
            return true;
        }
        if let Ok(event) = self.inbox.try_receive() {
            self.handle_mesh_event(&event, hw, sink);
            return true;
        }
        false
    }

    /// Iterate until no timer is due and both queues are empty.  Returns
    /// the number of iterations that did work.
    pub fn run_until_idle(&mut self, hw: &mut H, sink: &mut impl EventSink) -> usize {
        let mut handled = 0;
        while handled < MAX_ITERATIONS && self.step(hw, sink) {
            handled += 1;
        }
        if handled == MAX_ITERATIONS {
            warn!("AppService: loop did not settle after {} iterations", handled);
        }
        handled
    }

    /// Idle portion of the loop: enter the deepest allowed energy mode
    /// until the next timer deadline or an interrupt.
    pub fn sleep(&mut self, hw: &mut H) -> EnergyMode {
        let queue_empty = self.signals.is_empty() && self.inbox.is_empty();
        let mode = self.governor.select(queue_empty);
        let wake_at = self.core.timers.next_deadline();
        debug!("AppService: sleeping in {:?} until {:?}", mode, wake_at);
        hw.sleep(mode, wake_at);
        mode
    }

    // ── Mesh events ───────────────────────────────────────────

    pub fn handle_mesh_event(&mut self, event: &MeshEvent, hw: &mut H, sink: &mut impl EventSink) {
        match event {
            MeshEvent::ServerRequest(req) => {
                if self.rules.claims(req) {
                    self.rules
                        .handle_request(&mut self.core.timers, hw, sink, req);
                } else if let Err(e) = self.dispatcher.dispatch_request(&mut self.core, hw, req) {
                    self.unhandled(e, req.model, req.element, sink);
                }
            }
            MeshEvent::StateChanged(change) => {
                if let Err(e) = self.dispatcher.dispatch_change(&mut self.core, hw, change) {
                    self.unhandled(e, change.model, change.element, sink);
                }
            }
            MeshEvent::StateRecalled(recall) => {
                if let Err(e) = self.dispatcher.dispatch_recall(&mut self.core, hw, recall) {
                    self.unhandled(e, recall.model, recall.element, sink);
                }
            }
            MeshEvent::Lc(ev) => {
                if self.config.lighting_enabled {
                    self.core.lc.handle_event(&mut self.core.timers, hw, ev);
                } else {
                    debug!("LC | event {:?} ignored, lighting disabled", ev);
                }
            }
            MeshEvent::Scene(ev) => log_scene(ev),
            _ => self.handle_lifecycle_event(event, hw, sink),
        }
    }

    fn handle_lifecycle_event(&mut self, event: &MeshEvent, hw: &mut H, sink: &mut impl EventSink) {
        let prev_state = self.lifecycle.state();
        let prev_lpns = self.lifecycle.lpn_count();
        let action = self.lifecycle.handle_event(&mut self.core.timers, hw, event);

        let new_state = self.lifecycle.state();
        if new_state != prev_state {
            sink.emit(&AppEvent::NodeStateChanged {
                from: prev_state,
                to: new_state,
            });
        }

        match action {
            Some(LifecycleAction::Provisioned) => {
                if !self.models_ready {
                    self.rules.load(&*hw);
                }
                self.bring_up_models(hw, sink);
            }
            Some(LifecycleAction::FriendJoined) => {
                self.sensors.start(&mut self.core.timers);
                self.rules.arm_motion(hw);
            }
            None => {}
        }

        let lpns = self.lifecycle.lpn_count();
        if lpns != prev_lpns {
            sink.emit(&AppEvent::FriendshipChanged { lpns });
        }
    }

    /// Register the server models once the node is on a network.
    fn bring_up_models(&mut self, hw: &mut H, sink: &mut impl EventSink) {
        if self.models_ready {
            debug!("MESH | models already registered");
            return;
        }
        let result = if self.config.lighting_enabled {
            self.core
                .init_lighting(hw, self.config.lc_regulator_interval_ms);
            let registered = models::register_lighting(&mut self.dispatcher, hw);
            self.core.publish_power_up(hw);
            registered
        } else {
            models::register_lpn_endpoints(&mut self.dispatcher, hw)
        };
        match result {
            Ok(()) => {
                self.models_ready = true;
                sink.emit(&AppEvent::ModelsReady {
                    registered: self.dispatcher.len(),
                });
            }
            Err(e) => warn!("MESH | model registration failed: {}", e),
        }
    }

    fn unhandled(
        &self,
        e: MeshError,
        model: crate::mesh::models::ModelId,
        element: u16,
        sink: &mut impl EventSink,
    ) {
        warn!("MESH | {} on element {}: {}", model, element, e);
        sink.emit(&AppEvent::Unhandled { model, element });
    }

    // ── Timers ────────────────────────────────────────────────

    pub fn handle_timer(&mut self, id: TimerId, hw: &mut H, _sink: &mut impl EventSink) {
        let handled = self.lifecycle.handle_timer(id, hw)
            || self.sensors.handle_timer(id, self.signals)
            || self.rules.handle_timer(id, hw)
            || self.core.handle_timer(id, hw);
        if !handled {
            warn!("AppService: unhandled timer {}", id.handle());
        }
    }

    // ── External signals ──────────────────────────────────────

    pub fn handle_signal(&mut self, signal: ExternalSignal, hw: &mut H, sink: &mut impl EventSink) {
        match signal {
            ExternalSignal::SampleComplete => {
                if let Some(rh) = self.sensors.collect_sample() {
                    self.rules.on_humidity(hw, sink, rh);
                }
            }
            ExternalSignal::ButtonEdge => {
                self.rules
                    .on_button_edge(&mut self.core.timers, hw, sink);
            }
            ExternalSignal::MotionEdge => self.rules.on_motion(hw, sink),
            s if s.is_acquisition_step() => {
                let from = self.sensors.state();
                self.sensors.step(
                    s,
                    &mut self.core.timers,
                    hw,
                    &mut self.governor,
                    self.signals,
                );
                let to = self.sensors.state();
                if from != to {
                    sink.emit(&AppEvent::AcquisitionStateChanged { from, to });
                }
            }
            s => debug!("AppService: signal {:?} ignored", s),
        }
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn core(&self) -> &NodeCore {
        &self.core
    }

    /// Direct access to the model context (simulation and tests).
    pub fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }

    pub fn lifecycle(&self) -> &NodeLifecycle {
        &self.lifecycle
    }

    pub fn node_state(&self) -> NodeState {
        self.lifecycle.state()
    }

    pub fn rules(&self) -> &RuleEngine {
        &self.rules
    }

    pub fn sensors(&self) -> &SensorHub {
        &self.sensors
    }

    pub fn acquisition_state(&self) -> StateId {
        self.sensors.state()
    }

    pub fn governor(&self) -> &SleepGovernor {
        &self.governor
    }

    pub fn models_ready(&self) -> bool {
        self.models_ready
    }

    pub fn registered_models(&self) -> usize {
        self.dispatcher.len()
    }
}

fn log_scene(event: &SceneEvent) {
    match *event {
        SceneEvent::Get { client, appkey } => {
            info!("MESH | scene get from 0x{:04x}, appkey {}", client, appkey);
        }
        SceneEvent::RegisterGet { client, appkey } => {
            info!("MESH | scene register get from 0x{:04x}, appkey {}", client, appkey);
        }
        SceneEvent::Recall {
            client,
            scene,
            transition_ms,
            ..
        } => info!(
            "MESH | scene {} recall from 0x{:04x}, transition {} ms",
            scene, client, transition_ms
        ),
        SceneEvent::Publish { period_ms } => info!("MESH | scene publish period {} ms", period_ms),
        SceneEvent::Store { client, scene, .. } => {
            info!("MESH | scene {} stored by 0x{:04x}", scene, client);
        }
        SceneEvent::Delete { client, scene, .. } => {
            info!("MESH | scene {} deleted by 0x{:04x}", scene, client);
        }
        SceneEvent::SetupPublish { period_ms } => {
            info!("MESH | scene setup publish period {} ms", period_ms);
        }
    }
}
