//! Mesh-stack boundary: inbound events, model dispatch and the node
//! lifecycle state machine.
//!
//! ```text
//!   mesh stack ──▶ inbox (MeshEvent) ──▶ AppService
//!                                          ├─▶ lifecycle   (boot, provisioning, friendship)
//!                                          └─▶ dispatcher  (server requests / change / recall)
//! ```

pub mod dispatcher;
pub mod inbox;
pub mod lifecycle;
pub mod models;

use heapless::Vec;
use log::warn;

use crate::app::ports::MeshPort;
use models::{ModelId, OnOff, ServerRequest, ServerStatus, StateChange, StateKind, StateRecall};

/// Largest LC property value (a 32-bit coefficient).
pub const MAX_PROPERTY_LEN: usize = 4;

// ---------------------------------------------------------------------------
// Inbound events
// ---------------------------------------------------------------------------

/// Which key the configuration client added.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Network,
    Application,
}

/// Events delivered by the mesh stack and the GATT server.
#[derive(Debug, Clone, PartialEq)]
pub enum MeshEvent {
    /// The stack finished booting.
    SystemBoot,
    /// Mesh node initialisation completed.
    NodeInitialized {
        provisioned: bool,
        address: u16,
        iv_index: u32,
    },
    ProvisioningStarted,
    Provisioned {
        address: u16,
        iv_index: u32,
    },
    ProvisioningFailed {
        reason: u16,
    },
    KeyAdded {
        kind: KeyKind,
        index: u16,
    },
    ModelConfigChanged,
    /// The provisioner removed this node from the network.
    NodeReset,
    FriendshipEstablished {
        lpn_address: u16,
    },
    FriendshipTerminated {
        lpn_address: u16,
        reason: u16,
    },
    ConnectionOpened {
        handle: u8,
        address: [u8; 6],
    },
    ConnectionClosed {
        handle: u8,
        reason: u16,
    },
    /// A GATT client wrote the OTA control characteristic.
    OtaControlWrite {
        connection: u8,
    },
    ServerRequest(ServerRequest),
    StateChanged(StateChange),
    StateRecalled(StateRecall),
    Lc(LcEvent),
    Scene(SceneEvent),
}

/// Light Controller server events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LcEvent {
    ModeUpdated(u8),
    OccupancyModeUpdated(u8),
    LightOnOffUpdated { value: OnOff, transition_ms: u32 },
    OccupancyUpdated(u8),
    /// Ambient light level in hundredths of lux.
    AmbientLuxUpdated(u32),
    LinearOutputUpdated(u16),
    /// A client wrote one LC setup property.
    PropertySet {
        id: u16,
        value: Vec<u8, MAX_PROPERTY_LEN>,
    },
}

/// Scene server events.  Recall transitions are driven by the mesh
/// library through per-model recall callbacks, so these are reporting only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneEvent {
    Get { client: u16, appkey: u16 },
    RegisterGet { client: u16, appkey: u16 },
    Recall { client: u16, appkey: u16, scene: u16, transition_ms: u32 },
    Publish { period_ms: u32 },
    Store { client: u16, appkey: u16, scene: u16 },
    Delete { client: u16, appkey: u16, scene: u16 },
    SetupPublish { period_ms: u32 },
}

// ---------------------------------------------------------------------------
// Server-state output helpers
// ---------------------------------------------------------------------------

/// Answer a request when its flags ask for a response.
pub fn respond(mesh: &mut impl MeshPort, req: &ServerRequest, status: &ServerStatus) {
    if !req.response_required() {
        return;
    }
    if let Err(e) = mesh.server_respond(req.client, req.appkey, status, 0) {
        warn!("MESH | response {} to 0x{:04x} failed: {}", status.model, req.client, e);
    }
}

/// Inform the library of a new server state.
pub fn update(mesh: &mut impl MeshPort, status: &ServerStatus) -> bool {
    match mesh.server_update(status) {
        Ok(()) => true,
        Err(e) => {
            warn!("MESH | update {}[{}] failed: {}", status.model, status.element, e);
            false
        }
    }
}

/// Publish a server state to its configured publish address.
pub fn publish(mesh: &mut impl MeshPort, model: ModelId, element: u16, kind: StateKind) {
    if let Err(e) = mesh.server_publish(model, element, kind) {
        warn!("MESH | publish {}[{}] failed: {}", model, element, e);
    }
}

/// Update then publish; the publish is skipped if the update failed.
pub fn update_and_publish(mesh: &mut impl MeshPort, status: &ServerStatus, kind: StateKind) {
    if update(mesh, status) {
        publish(mesh, status.model, status.element, kind);
    }
}
