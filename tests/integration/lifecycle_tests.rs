//! Node lifecycle: boot, provisioning, friendship, connections and the
//! two reboot paths (factory reset and DFU).

use roomnode::app::events::AppEvent;
use roomnode::app::ports::{Edge, LcdRow, ResetMode};
use roomnode::config::NodeConfig;
use roomnode::error::MeshError;
use roomnode::mesh::MeshEvent;
use roomnode::mesh::lifecycle::NodeState;
use roomnode::mesh::models::ModelId;
use roomnode::pins::{MOTION_GPIO, PB0_GPIO, PB1_GPIO};
use roomnode::store::PsKey;
use roomnode::timer::TimerId;

use crate::mock_hw::{MeshCall, NODE_ADDR, Node};

const PEER: [u8; 6] = [1, 2, 3, 4, 5, 6];

fn provisioned_event() -> MeshEvent {
    MeshEvent::Provisioned {
        address: NODE_ADDR,
        iv_index: 0,
    }
}

// ── Boot ─────────────────────────────────────────────────────

#[test]
fn unprovisioned_boot_starts_beaconing_one_iteration_after_init() {
    let mut node = Node::new(NodeConfig::default());
    node.post(MeshEvent::SystemBoot);

    assert!(node.app.step(&mut node.hw, &mut node.sink));
    assert_eq!(node.app.node_state(), NodeState::Initializing);
    assert!(!node.hw.mesh_calls.contains(&MeshCall::StartBeaconing(0x03)));

    // the stack answers node_init with NodeInitialized
    assert!(node.app.step(&mut node.hw, &mut node.sink));
    assert!(node.hw.mesh_calls.contains(&MeshCall::StartBeaconing(0x03)));
    assert_eq!(node.app.node_state(), NodeState::Unprovisioned);
    assert_eq!(node.hw.row(LcdRow::Action), "Un-provisioned");
    assert!(!node.app.models_ready());
}

#[test]
fn boot_names_the_device_and_fills_the_header_rows() {
    let mut node = Node::new(NodeConfig::default());
    node.boot();

    assert!(
        node.hw
            .mesh_calls
            .contains(&MeshCall::SetDeviceName("5823Sub 8a:3c".to_owned()))
    );
    assert_eq!(node.hw.row(LcdRow::Name), "Subscriber");
    assert_eq!(node.hw.row(LcdRow::BtAddr), "00:0B:57:1F:8A:3C");
    assert!(node.sink.has(&AppEvent::NodeStateChanged {
        from: NodeState::Booting,
        to: NodeState::Initializing,
    }));
    assert!(node.sink.has(&AppEvent::NodeStateChanged {
        from: NodeState::Initializing,
        to: NodeState::Unprovisioned,
    }));
}

#[test]
fn rejected_node_init_shows_the_result_code() {
    let mut node = Node::new(NodeConfig::default());
    node.hw.fail_node_init = Some(MeshError::Stack(0x0181));
    node.boot();

    assert_eq!(node.app.node_state(), NodeState::InitFailed);
    assert_eq!(node.hw.row(LcdRow::Action), "init failed (0x0181)");
    assert!(
        !node
            .hw
            .mesh_calls
            .iter()
            .any(|c| matches!(c, MeshCall::StartBeaconing(_)))
    );
}

#[test]
fn provisioned_boot_joins_and_registers_models() {
    let node = Node::provisioned(NodeConfig::default());

    assert_eq!(node.app.node_state(), NodeState::Provisioned);
    assert_eq!(node.app.lifecycle().address(), NODE_ADDR);
    assert_eq!(node.hw.row(LcdRow::Action), "Provisioned");
    assert_eq!(node.hw.edges.get(&PB0_GPIO), Some(&Edge::Both));
    assert!(node.hw.mesh_calls.contains(&MeshCall::LibInit(11)));
    assert!(node.hw.mesh_calls.contains(&MeshCall::FriendInit));

    let registered = node.hw.registered();
    assert_eq!(registered.len(), 11);
    assert!(registered.contains(&(ModelId::LIGHT_CTL_TEMPERATURE_SERVER, 1)));
    assert!(registered.contains(&(ModelId::GENERIC_ON_OFF_SERVER, 1)));
    assert!(node.sink.has(&AppEvent::ModelsReady { registered: 11 }));
    assert!(node.app.models_ready());
}

#[test]
fn lighting_disabled_serves_only_the_lpn_endpoints() {
    let config = NodeConfig {
        lighting_enabled: false,
        ..Default::default()
    };
    let node = Node::provisioned(config);

    assert_eq!(
        node.hw.registered(),
        vec![
            (ModelId::GENERIC_ON_OFF_SERVER, 0),
            (ModelId::GENERIC_LEVEL_SERVER, 0)
        ]
    );
    assert!(node.sink.has(&AppEvent::ModelsReady { registered: 2 }));
    assert!(
        !node
            .hw
            .mesh_calls
            .iter()
            .any(|c| matches!(c, MeshCall::LcServerInit(_)))
    );
}

// ── Provisioning ─────────────────────────────────────────────

#[test]
fn provisioning_blinks_until_provisioned() {
    let mut node = Node::new(NodeConfig::default());
    node.boot();

    node.deliver(MeshEvent::ProvisioningStarted);
    assert_eq!(node.app.node_state(), NodeState::Provisioning);
    assert_eq!(node.hw.row(LcdRow::Action), "Provisioning");

    node.run_for(1_000);
    assert_eq!(node.hw.status_toggles, 4);

    node.deliver(provisioned_event());
    assert_eq!(node.app.node_state(), NodeState::Provisioned);
    assert_eq!(node.hw.row(LcdRow::Action), "Provisioned");
    assert_eq!(node.app.registered_models(), 11);

    node.run_for(1_000);
    assert_eq!(node.hw.status_toggles, 4, "blink must stop once provisioned");
}

#[test]
fn a_second_provisioned_event_does_not_register_again() {
    let mut node = Node::provisioned(NodeConfig::default());
    node.deliver(provisioned_event());

    assert_eq!(node.hw.registered().len(), 11);
    assert_eq!(
        node.sink
            .count(|e| matches!(e, AppEvent::ModelsReady { .. })),
        1
    );
}

#[test]
fn provisioning_failure_restarts_after_the_delay() {
    let mut node = Node::new(NodeConfig::default());
    node.boot();
    node.deliver(MeshEvent::ProvisioningStarted);
    node.deliver(MeshEvent::ProvisioningFailed { reason: 0x0b });

    assert_eq!(node.hw.row(LcdRow::Action), "Provisioning failed");
    assert_eq!(node.app.node_state(), NodeState::Unprovisioned);

    node.run_until(61);
    assert!(node.hw.resets().is_empty());
    node.run_until(62);
    assert_eq!(node.hw.resets(), vec![ResetMode::Normal]);
}

// ── Friendship ───────────────────────────────────────────────

#[test]
fn friendships_are_counted_and_shown() {
    let mut node = Node::provisioned(NodeConfig::default());

    node.deliver(MeshEvent::FriendshipEstablished { lpn_address: 2 });
    assert_eq!(node.hw.row(LcdRow::BtAddr2), "FRIEND");
    assert!(node.sink.has(&AppEvent::FriendshipChanged { lpns: 1 }));
    // motion interrupts follow the authority mode once an LPN is attached
    assert_eq!(node.hw.edges.get(&MOTION_GPIO), Some(&Edge::Rising));
    assert_eq!(node.hw.row(LcdRow::Authority), "Not Authorized");

    node.deliver(MeshEvent::FriendshipEstablished { lpn_address: 3 });
    assert_eq!(node.app.lifecycle().lpn_count(), 2);

    node.deliver(MeshEvent::FriendshipTerminated {
        lpn_address: 2,
        reason: 0,
    });
    assert_eq!(node.hw.row(LcdRow::BtAddr2), "No LPN");
    assert!(node.sink.has(&AppEvent::FriendshipChanged { lpns: 1 }));
    assert_eq!(node.app.lifecycle().lpn_count(), 1);
}

#[test]
fn terminating_without_friends_does_not_underflow() {
    let mut node = Node::provisioned(NodeConfig::default());
    node.deliver(MeshEvent::FriendshipTerminated {
        lpn_address: 2,
        reason: 0,
    });
    assert_eq!(node.app.lifecycle().lpn_count(), 0);
    assert_eq!(
        node.sink
            .count(|e| matches!(e, AppEvent::FriendshipChanged { .. })),
        0
    );
}

// ── Connections ──────────────────────────────────────────────

#[test]
fn connection_row_clears_when_the_last_connection_closes() {
    let mut node = Node::provisioned(NodeConfig::default());

    node.deliver(MeshEvent::ConnectionOpened {
        handle: 1,
        address: PEER,
    });
    node.deliver(MeshEvent::ConnectionOpened {
        handle: 2,
        address: PEER,
    });
    assert_eq!(node.hw.row(LcdRow::Connection), "Connected");
    assert_eq!(node.hw.row(LcdRow::BtAddr), "1.2.3.4.5.6");

    node.deliver(MeshEvent::ConnectionClosed {
        handle: 1,
        reason: 0x13,
    });
    assert_eq!(node.hw.row(LcdRow::Connection), "Connected");

    node.deliver(MeshEvent::ConnectionClosed {
        handle: 2,
        reason: 0x13,
    });
    assert_eq!(node.hw.row(LcdRow::Connection), "");
    assert_eq!(node.app.lifecycle().connections(), 0);
}

#[test]
fn ota_control_write_reboots_into_dfu() {
    let mut node = Node::provisioned(NodeConfig::default());
    node.deliver(MeshEvent::ConnectionOpened {
        handle: 2,
        address: PEER,
    });

    node.deliver(MeshEvent::OtaControlWrite { connection: 2 });

    let calls = &node.hw.mesh_calls;
    let ack = calls.iter().position(|c| *c == MeshCall::OtaWriteResponse(2));
    let close = calls.iter().position(|c| *c == MeshCall::CloseConnection(2));
    assert!(ack.is_some() && close.is_some() && ack < close);
    assert!(node.app.lifecycle().boot_to_dfu());
    // the close is reported back by the stack and triggers the reboot
    assert_eq!(node.hw.resets(), vec![ResetMode::Dfu]);
}

// ── Factory reset ────────────────────────────────────────────

#[test]
fn factory_reset_with_pb0_held_at_boot() {
    let mut node = Node::new(NodeConfig::default());
    node.hw.store.insert(PsKey::BUTTON_COUNT, vec![7]);
    node.hw.store.insert(PsKey::AUTHORIZED, vec![1]);
    node.hw.pins.insert(PB0_GPIO, false);

    node.boot();

    assert_eq!(node.app.node_state(), NodeState::Resetting);
    assert_eq!(node.hw.row(LcdRow::Action), "***FACTORY RESET***");
    assert_eq!(node.hw.erases, 1);
    assert!(node.hw.store.is_empty());
    assert!(!node.hw.mesh_calls.contains(&MeshCall::NodeInit));

    node.run_until(61);
    assert!(node.hw.resets().is_empty());
    node.run_until(62);
    assert_eq!(node.hw.resets(), vec![ResetMode::Normal]);

    // the next boot sees an empty store and starts from defaults
    let mut next = Node::new(NodeConfig::default());
    next.hw.store = std::mem::take(&mut node.hw.store);
    next.hw.network = Some((NODE_ADDR, 0));
    next.boot();
    assert_eq!(next.app.node_state(), NodeState::Provisioned);
    assert_eq!(next.app.rules().button_count(), 0);
    assert!(!next.app.rules().authorized());
    let bulb = &next.app.core().lighting.state;
    assert_eq!(bulb.lightness_last, 0xFFFF);
    assert_eq!(bulb.lightness_min, 1);
}

#[test]
fn pb1_held_at_boot_also_resets() {
    let mut node = Node::new(NodeConfig::default());
    node.hw.pins.insert(PB1_GPIO, false);
    node.boot();
    assert_eq!(node.app.node_state(), NodeState::Resetting);
    assert_eq!(node.hw.erases, 1);
}

#[test]
fn records_survive_a_normal_boot() {
    let mut node = Node::new(NodeConfig::default());
    node.hw.store.insert(PsKey::BUTTON_COUNT, vec![7]);
    node.hw.network = Some((NODE_ADDR, 0));
    node.boot();
    assert_eq!(node.hw.erases, 0);
    assert_eq!(node.app.rules().button_count(), 7);
}

#[test]
fn node_reset_closes_the_connection_and_erases() {
    let mut node = Node::provisioned(NodeConfig::default());
    node.deliver(MeshEvent::ConnectionOpened {
        handle: 1,
        address: PEER,
    });

    node.deliver(MeshEvent::NodeReset);

    assert!(node.hw.mesh_calls.contains(&MeshCall::CloseConnection(1)));
    assert_eq!(node.hw.erases, 1);
    assert_eq!(node.app.node_state(), NodeState::Resetting);
    node.run_for(62);
    assert_eq!(node.hw.resets(), vec![ResetMode::Normal]);
}

#[test]
fn pending_factory_reset_cannot_be_rescheduled() {
    let mut node = Node::provisioned(NodeConfig::default());
    node.deliver(MeshEvent::NodeReset);
    node.run_until(30);

    node.deliver(MeshEvent::NodeReset);
    node.deliver(MeshEvent::ProvisioningFailed { reason: 1 });
    assert_eq!(node.hw.erases, 1);
    assert!(node.app.core().timers.is_retired(TimerId::Restart));
    assert!(!node.app.core().timers.is_active(TimerId::Restart));

    node.run_until(61);
    assert!(node.hw.resets().is_empty());
    node.run_until(500);
    assert_eq!(node.hw.resets(), vec![ResetMode::Normal]);
}

#[test]
fn rule_records_load_only_once_on_a_network() {
    let mut node = Node::new(NodeConfig::default());
    node.hw.store.insert(PsKey::BUTTON_COUNT, vec![5]);
    node.boot();
    assert_eq!(node.app.node_state(), NodeState::Unprovisioned);
    assert_eq!(node.app.rules().button_count(), 0);

    node.deliver(provisioned_event());
    assert_eq!(node.app.rules().button_count(), 5);
}
