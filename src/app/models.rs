//! Lighting model context and the server model registration table.

use log::{debug, info, warn};

use crate::app::ports::NodeHw;
use crate::error::MeshError;
use crate::lc::LightController;
use crate::lighting::{LevelChannel, LightingEngine};
use crate::mesh::dispatcher::{Dispatcher, ModelHandlers};
use crate::mesh::models::{ModelId, PRIMARY_ELEMENT, SECONDARY_ELEMENT, ServerRequest};
use crate::timer::{TimerId, TimerService};

/// Everything the model handlers mutate.
pub struct NodeCore {
    pub timers: TimerService,
    pub lighting: LightingEngine,
    pub lc: LightController,
}

impl NodeCore {
    pub fn new(save_debounce_ms: u32) -> Self {
        Self {
            timers: TimerService::new(),
            lighting: LightingEngine::new(save_debounce_ms),
            lc: LightController::new(SECONDARY_ELEMENT, save_debounce_ms),
        }
    }

    /// Restore persisted lighting state, bring up the LC and scene servers
    /// and apply the OnPowerUp policy.
    pub fn init_lighting(&mut self, hw: &mut impl NodeHw, regulator_interval_ms: u16) {
        self.lighting.load(&*hw);
        if let Err(e) = self.lc.init(&mut self.timers, hw, regulator_interval_ms) {
            warn!("LC | init failed: {}", e);
        }
        if let Err(e) = hw.scene_server_init(PRIMARY_ELEMENT) {
            warn!("MESH | scene server init failed: {}", e);
        }
        self.lighting
            .power_up(&mut self.timers, hw, self.lc.state.mode);
    }

    /// Second half of power-up, once the models are registered.
    pub fn publish_power_up(&mut self, hw: &mut impl NodeHw) {
        let onpowerup = self.lighting.state.onpowerup;
        self.lc.power_up_update(&mut self.timers, hw, onpowerup);
        self.lighting.publish_power_up(hw);
    }

    /// Route a timer to the lighting engine or the Light Controller.
    pub fn handle_timer(&mut self, id: TimerId, hw: &mut impl NodeHw) -> bool {
        self.lighting.handle_timer(id, &mut self.timers, hw)
            || self.lc.handle_timer(id, &mut self.timers, hw)
    }
}

type Handlers<H> = ModelHandlers<NodeCore, H>;

/// Register the eleven lighting server models.
pub fn register_lighting<H: NodeHw>(
    dispatcher: &mut Dispatcher<NodeCore, H>,
    hw: &mut H,
) -> Result<(), MeshError> {
    let table: [(ModelId, u16, Handlers<H>); 11] = [
        (
            ModelId::GENERIC_ON_OFF_SERVER,
            PRIMARY_ELEMENT,
            Handlers::<H>::new(|c, hw, r| c.lighting.onoff_request(&mut c.timers, hw, r))
                .with_change(|c, _, ch| c.lighting.onoff_change(&mut c.timers, ch))
                .with_recall(|c, hw, rc| c.lighting.onoff_recall(&mut c.timers, hw, rc)),
        ),
        (
            ModelId::GENERIC_POWER_ON_OFF_SETUP_SERVER,
            PRIMARY_ELEMENT,
            Handlers::<H>::new(|c, hw, r| c.lighting.power_onoff_request(&mut c.timers, hw, r))
                .with_change(|c, _, ch| c.lighting.power_onoff_change(&mut c.timers, ch)),
        ),
        (
            ModelId::GENERIC_DEFAULT_TRANSITION_TIME_SERVER,
            PRIMARY_ELEMENT,
            Handlers::<H>::new(|c, hw, r| c.lighting.transtime_request(&mut c.timers, hw, r))
                .with_change(|c, _, ch| c.lighting.transtime_change(&mut c.timers, ch)),
        ),
        (
            ModelId::LIGHT_LIGHTNESS_SERVER,
            PRIMARY_ELEMENT,
            Handlers::<H>::new(|c, hw, r| c.lighting.lightness_request(&mut c.timers, hw, r))
                .with_change(|c, _, ch| c.lighting.lightness_change(&mut c.timers, ch))
                .with_recall(|c, hw, rc| c.lighting.lightness_recall(&mut c.timers, hw, rc)),
        ),
        (
            ModelId::LIGHT_LIGHTNESS_SETUP_SERVER,
            PRIMARY_ELEMENT,
            Handlers::<H>::new(|c, hw, r| {
                c.lighting.lightness_setup_request(&mut c.timers, hw, r);
            })
            .with_change(|c, _, ch| c.lighting.lightness_setup_change(&mut c.timers, ch)),
        ),
        (
            ModelId::GENERIC_LEVEL_SERVER,
            PRIMARY_ELEMENT,
            Handlers::<H>::new(|c, hw, r| {
                c.lighting
                    .level_request(LevelChannel::Primary, &mut c.timers, hw, r);
            })
            .with_change(|c, _, ch| {
                c.lighting
                    .level_change(LevelChannel::Primary, &mut c.timers, ch);
            })
            .with_recall(|c, hw, rc| {
                c.lighting
                    .level_recall(LevelChannel::Primary, &mut c.timers, hw, rc);
            }),
        ),
        (
            ModelId::LIGHT_CTL_SERVER,
            PRIMARY_ELEMENT,
            Handlers::<H>::new(|c, hw, r| c.lighting.ctl_request(&mut c.timers, hw, r))
                .with_change(|c, _, ch| c.lighting.ctl_change(&mut c.timers, ch))
                .with_recall(|c, hw, rc| c.lighting.ctl_recall(&mut c.timers, hw, rc)),
        ),
        (
            ModelId::LIGHT_CTL_SETUP_SERVER,
            PRIMARY_ELEMENT,
            Handlers::<H>::new(|c, hw, r| c.lighting.ctl_setup_request(&mut c.timers, hw, r))
                .with_change(|c, hw, ch| c.lighting.ctl_setup_change(&mut c.timers, hw, ch)),
        ),
        (
            ModelId::LIGHT_CTL_TEMPERATURE_SERVER,
            SECONDARY_ELEMENT,
            Handlers::<H>::new(|c, hw, r| {
                c.lighting.ctl_temperature_request(&mut c.timers, hw, r);
            })
            .with_change(|c, _, ch| c.lighting.ctl_temperature_change(&mut c.timers, ch))
            .with_recall(|c, hw, rc| {
                c.lighting.ctl_temperature_recall(&mut c.timers, hw, rc);
            }),
        ),
        (
            ModelId::GENERIC_LEVEL_SERVER,
            SECONDARY_ELEMENT,
            Handlers::<H>::new(|c, hw, r| {
                c.lighting
                    .level_request(LevelChannel::Secondary, &mut c.timers, hw, r);
            })
            .with_change(|c, _, ch| {
                c.lighting
                    .level_change(LevelChannel::Secondary, &mut c.timers, ch);
            })
            .with_recall(|c, hw, rc| {
                c.lighting
                    .level_recall(LevelChannel::Secondary, &mut c.timers, hw, rc);
            }),
        ),
        // LC on/off is served by the generic on/off model of element 1
        (
            ModelId::GENERIC_ON_OFF_SERVER,
            SECONDARY_ELEMENT,
            Handlers::<H>::new(|c, hw, r| c.lc.onoff_request(&mut c.timers, hw, r))
                .with_change(|c, _, ch| c.lc.onoff_change(&mut c.timers, ch))
                .with_recall(|c, hw, rc| c.lc.onoff_recall(&mut c.timers, hw, rc)),
        ),
    ];

    for (model, element, handlers) in table {
        dispatcher.register(hw, model, element, handlers)?;
    }
    info!("MESH | {} lighting models registered", dispatcher.len());
    Ok(())
}

fn unclaimed<H>(_: &mut NodeCore, _: &mut H, req: &ServerRequest) {
    debug!(
        "MESH | ignoring {:?} from 0x{:04x}",
        req.request, req.client
    );
}

/// Without the lighting engine only the LPN data endpoints of element 0
/// are served.  Their traffic is consumed by the rules before dispatch.
pub fn register_lpn_endpoints<H: NodeHw>(
    dispatcher: &mut Dispatcher<NodeCore, H>,
    hw: &mut H,
) -> Result<(), MeshError> {
    for model in [ModelId::GENERIC_ON_OFF_SERVER, ModelId::GENERIC_LEVEL_SERVER] {
        dispatcher.register(hw, model, PRIMARY_ELEMENT, Handlers::<H>::new(unclaimed::<H>))?;
    }
    Ok(())
}
