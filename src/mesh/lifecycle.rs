//! Mesh node lifecycle: boot, provisioning, friendship, GATT connections,
//! OTA entry and factory reset.
//!
//! ```text
//!  boot ──[PB0|PB1 held]──────────────────────────────▶ RESETTING
//!    │                                                      ▲
//!    └─▶ node_init ─▶ INITIALIZING ─┬─[provisioned]─▶ PROVISIONED
//!                                   └─▶ UNPROVISIONED       │ ▲
//!                                          │                │ │
//!                                 [prov started]   [node reset] │
//!                                          ▼                    │
//!                                     PROVISIONING ──[ok]───────┘
//!                                          └──[failed]──▶ restart
//! ```

use core::fmt::Write;

use heapless::String;
use log::{error, info, warn};

use super::{KeyKind, MeshEvent};
use crate::app::ports::{Edge, LcdRow, NodeHw, ResetMode};
use crate::config::NodeConfig;
use crate::pins::{PB0_GPIO, PB1_GPIO};
use crate::timer::{TimerId, TimerService};

/// Advertising + GATT provisioning bearers.
const UNPROV_BEARERS: u8 = 0x03;

/// Connection handle meaning "no connection".
pub const NO_CONNECTION: u8 = 0xFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Waiting for the stack boot event.
    Booting,
    /// `node_init` issued, waiting for `node_initialized`.
    Initializing,
    /// `node_init` was rejected; waiting for a manual reset.
    InitFailed,
    Unprovisioned,
    Provisioning,
    Provisioned,
    /// PS erased, reboot pending.
    Resetting,
}

/// Follow-up work the event loop performs after a lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    /// The node joined a network (now, or restored at boot): the mesh
    /// library is up and server models can be registered.
    Provisioned,
    /// A Low-Power Node befriended this node.
    FriendJoined,
}

pub struct NodeLifecycle {
    state: NodeState,
    address: u16,
    iv_index: u32,
    connections: u8,
    conn_handle: u8,
    lpn_count: u8,
    boot_to_dfu: bool,
    restart_delay_ms: u32,
    blink_ms: u32,
    max_models: u8,
}

impl NodeLifecycle {
    pub fn new(config: &NodeConfig) -> Self {
        Self {
            state: NodeState::Booting,
            address: 0,
            iv_index: 0,
            connections: 0,
            conn_handle: NO_CONNECTION,
            lpn_count: 0,
            boot_to_dfu: false,
            restart_delay_ms: config.restart_delay_ms,
            blink_ms: config.provisioning_blink_ms,
            max_models: config.max_models,
        }
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn is_provisioned(&self) -> bool {
        self.state == NodeState::Provisioned
    }

    /// Unicast address of the primary element; 0 until provisioned.
    pub fn address(&self) -> u16 {
        self.address
    }

    pub fn iv_index(&self) -> u32 {
        self.iv_index
    }

    pub fn connections(&self) -> u8 {
        self.connections
    }

    pub fn conn_handle(&self) -> u8 {
        self.conn_handle
    }

    pub fn lpn_count(&self) -> u8 {
        self.lpn_count
    }

    pub fn boot_to_dfu(&self) -> bool {
        self.boot_to_dfu
    }

    /// Handle a lifecycle event.  Events that belong to the dispatcher or
    /// the Light Controller are ignored.
    pub fn handle_event(
        &mut self,
        timers: &mut TimerService,
        hw: &mut impl NodeHw,
        event: &MeshEvent,
    ) -> Option<LifecycleAction> {
        match *event {
            MeshEvent::SystemBoot => self.boot(timers, hw),
            MeshEvent::NodeInitialized {
                provisioned,
                address,
                iv_index,
            } => return self.node_initialized(hw, provisioned, address, iv_index),
            MeshEvent::ProvisioningStarted => {
                info!("MESH | provisioning started");
                self.state = NodeState::Provisioning;
                hw.write_row(LcdRow::Action, "Provisioning");
                arm(timers, TimerId::ProvisioningBlink, self.blink_ms, true);
            }
            MeshEvent::Provisioned { address, iv_index } => {
                info!("MESH | provisioned, address 0x{:04x}", address);
                self.address = address;
                self.iv_index = iv_index;
                timers.cancel(TimerId::ProvisioningBlink);
                self.join_network(hw);
                hw.clear_alert();
                return Some(LifecycleAction::Provisioned);
            }
            MeshEvent::ProvisioningFailed { reason } => {
                warn!("MESH | provisioning failed, code 0x{:x}", reason);
                timers.cancel(TimerId::ProvisioningBlink);
                self.state = NodeState::Unprovisioned;
                hw.write_row(LcdRow::Action, "Provisioning failed");
                arm(timers, TimerId::Restart, self.restart_delay_ms, false);
            }
            MeshEvent::KeyAdded { kind, index } => {
                let kind = match kind {
                    KeyKind::Network => "network",
                    KeyKind::Application => "application",
                };
                info!("MESH | got new {} key with index 0x{:x}", kind, index);
            }
            MeshEvent::ModelConfigChanged => info!("MESH | model config changed"),
            MeshEvent::NodeReset => {
                info!("MESH | node reset by provisioner");
                self.factory_reset(timers, hw);
            }
            MeshEvent::FriendshipEstablished { lpn_address } => {
                self.lpn_count = self.lpn_count.saturating_add(1);
                info!(
                    "MESH | friendship established with 0x{:04x}, {} LPN(s)",
                    lpn_address, self.lpn_count
                );
                hw.write_row(LcdRow::BtAddr2, "FRIEND");
                return Some(LifecycleAction::FriendJoined);
            }
            MeshEvent::FriendshipTerminated {
                lpn_address,
                reason,
            } => {
                self.lpn_count = self.lpn_count.saturating_sub(1);
                info!(
                    "MESH | friendship with 0x{:04x} terminated (0x{:x}), {} LPN(s)",
                    lpn_address, reason, self.lpn_count
                );
                hw.write_row(LcdRow::BtAddr2, "No LPN");
            }
            MeshEvent::ConnectionOpened { handle, address } => {
                self.connections = self.connections.saturating_add(1);
                self.conn_handle = handle;
                info!("MESH | connection {} opened", handle);
                hw.write_row(LcdRow::BtAddr, &dotted_address(&address));
                hw.write_row(LcdRow::Connection, "Connected");
            }
            MeshEvent::ConnectionClosed { handle, reason } => {
                self.connection_closed(hw, handle, reason);
            }
            MeshEvent::OtaControlWrite { connection } => {
                info!("MESH | OTA control write, rebooting into DFU");
                self.boot_to_dfu = true;
                if let Err(e) = hw.ota_write_response(connection) {
                    warn!("MESH | OTA write response failed: {}", e);
                }
                if let Err(e) = hw.close_connection(connection) {
                    warn!("MESH | close connection {} failed: {}", connection, e);
                }
            }
            MeshEvent::ServerRequest(_)
            | MeshEvent::StateChanged(_)
            | MeshEvent::StateRecalled(_)
            | MeshEvent::Lc(_)
            | MeshEvent::Scene(_) => {}
        }
        None
    }

    /// Handle a lifecycle timer.  Returns `false` for handles it does not
    /// own.
    pub fn handle_timer(&mut self, id: TimerId, hw: &mut impl NodeHw) -> bool {
        match id {
            TimerId::FactoryReset | TimerId::Restart => {
                info!("MESH | rebooting");
                hw.system_reset(ResetMode::Normal);
            }
            TimerId::ProvisioningBlink => {
                if self.state == NodeState::Provisioning {
                    hw.toggle_status();
                }
            }
            _ => return false,
        }
        true
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn boot(&mut self, timers: &mut TimerService, hw: &mut impl NodeHw) {
        // buttons are active-low
        if !hw.pin_read(PB0_GPIO) || !hw.pin_read(PB1_GPIO) {
            self.factory_reset(timers, hw);
            return;
        }

        let bt = hw.bt_address();
        let name = device_name(&bt);
        info!("MESH | device name: '{}'", name);
        if let Err(e) = hw.set_device_name(&name) {
            warn!("MESH | writing device name failed: {}", e);
        }
        hw.write_row(LcdRow::Name, "Subscriber");
        hw.write_row(LcdRow::BtAddr, &colon_address(&bt));

        match hw.node_init() {
            Ok(()) => self.state = NodeState::Initializing,
            Err(e) => {
                error!("MESH | node init failed: {}", e);
                self.state = NodeState::InitFailed;
                let mut text: String<24> = String::new();
                let _ = write!(text, "init failed (0x{:04x})", e.code());
                hw.write_row(LcdRow::Action, &text);
            }
        }
    }

    fn node_initialized(
        &mut self,
        hw: &mut impl NodeHw,
        provisioned: bool,
        address: u16,
        iv_index: u32,
    ) -> Option<LifecycleAction> {
        info!("MESH | node initialized");
        if let Err(e) = hw.generic_server_init() {
            warn!("MESH | generic server init failed: {}", e);
        }

        if provisioned {
            info!("MESH | node is provisioned, address 0x{:04x}, ivi {}", address, iv_index);
            self.address = address;
            self.iv_index = iv_index;
            self.join_network(hw);
            Some(LifecycleAction::Provisioned)
        } else {
            info!("MESH | node is unprovisioned, starting beaconing");
            self.state = NodeState::Unprovisioned;
            hw.write_row(LcdRow::Action, "Un-provisioned");
            if let Err(e) = hw.start_unprov_beaconing(UNPROV_BEARERS) {
                warn!("MESH | start beaconing failed: {}", e);
            }
            None
        }
    }

    /// Common work once the node is part of a network.
    fn join_network(&mut self, hw: &mut impl NodeHw) {
        self.state = NodeState::Provisioned;
        hw.configure_edge(PB0_GPIO, Edge::Both);
        if let Err(e) = hw.lib_init(self.max_models) {
            warn!("MESH | mesh lib init failed: {}", e);
        }
        if let Err(e) = hw.friend_init() {
            warn!("MESH | friend init failed: {}", e);
        }
        hw.write_row(LcdRow::Action, "Provisioned");
    }

    fn factory_reset(&mut self, timers: &mut TimerService, hw: &mut impl NodeHw) {
        if self.state == NodeState::Resetting {
            info!("MESH | factory reset already pending");
            return;
        }
        info!("MESH | factory reset");
        self.state = NodeState::Resetting;
        hw.write_row(LcdRow::Action, "***FACTORY RESET***");

        if self.conn_handle != NO_CONNECTION {
            if let Err(e) = hw.close_connection(self.conn_handle) {
                warn!("MESH | close connection failed: {}", e);
            }
        }
        if let Err(e) = hw.erase_all() {
            error!("MESH | PS erase failed: {}", e);
        }
        arm(timers, TimerId::FactoryReset, self.restart_delay_ms, false);
        // the factory-reset reboot is the only one left to fire
        timers.retire(TimerId::Restart);
        timers.retire(TimerId::ProvisioningBlink);
    }

    fn connection_closed(&mut self, hw: &mut impl NodeHw, handle: u8, reason: u16) {
        if self.boot_to_dfu {
            hw.system_reset(ResetMode::Dfu);
            return;
        }
        info!("MESH | connection {} closed, reason 0x{:x}", handle, reason);
        self.conn_handle = NO_CONNECTION;
        if self.connections > 0 {
            self.connections -= 1;
            if self.connections == 0 {
                hw.write_row(LcdRow::Connection, "");
            }
        }
    }
}

fn arm(timers: &mut TimerService, id: TimerId, delay_ms: u32, periodic: bool) {
    if let Err(e) = timers.set(id, delay_ms, periodic) {
        warn!("MESH | cannot arm {:?}: {}", id, e);
    }
}

/// GATT device name from the two low address bytes.
pub fn device_name(bt: &[u8; 6]) -> String<20> {
    let mut name = String::new();
    let _ = write!(name, "5823Sub {:02x}:{:02x}", bt[1], bt[0]);
    name
}

/// Own address in the usual most-significant-first notation.
fn colon_address(bt: &[u8; 6]) -> String<20> {
    let mut text = String::new();
    let _ = write!(
        text,
        "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
        bt[5], bt[4], bt[3], bt[2], bt[1], bt[0]
    );
    text
}

/// Peer address as shown on the connection screen.
fn dotted_address(bt: &[u8; 6]) -> String<24> {
    let mut text = String::new();
    let _ = write!(
        text,
        "{}.{}.{}.{}.{}.{}",
        bt[0], bt[1], bt[2], bt[3], bt[4], bt[5]
    );
    text
}
