//! Light Controller server on the secondary element.

use roomnode::config::NodeConfig;
use roomnode::lc::properties::{LcProperty, PropertyValue};
use roomnode::mesh::models::{
    GenericRequest, GenericState, ModelId, OnOff, SECONDARY_ELEMENT, ServerRequest,
};
use roomnode::mesh::{LcEvent, MeshEvent};
use roomnode::store::PsKey;

use crate::mock_hw::{LedCall, MeshCall, Node, SWITCH_ADDR, request};

fn ready() -> Node {
    let mut node = Node::provisioned(NodeConfig::default());
    node.hw.clear_calls();
    node
}

fn property(id: u16, bytes: &[u8]) -> MeshEvent {
    let mut value = heapless::Vec::new();
    value.extend_from_slice(bytes).unwrap();
    MeshEvent::Lc(LcEvent::PropertySet { id, value })
}

#[test]
fn provisioning_brings_up_the_controller() {
    let node = Node::provisioned(NodeConfig::default());
    let calls = &node.hw.mesh_calls;

    assert!(calls.contains(&MeshCall::LcServerInit(SECONDARY_ELEMENT)));
    assert!(calls.contains(&MeshCall::LcRegulatorInterval(100)));
    assert_eq!(
        calls
            .iter()
            .filter(|c| matches!(c, MeshCall::LcProperty(_)))
            .count(),
        18
    );
    // OnPowerUp OFF forces manual mode with the light off
    assert!(calls.contains(&MeshCall::LcMode(0)));
    assert!(calls.contains(&MeshCall::LcLightOnOff(OnOff::Off)));
}

#[test]
fn mode_update_is_persisted() {
    let mut node = ready();
    node.deliver(MeshEvent::Lc(LcEvent::ModeUpdated(1)));
    assert_eq!(node.app.core().lc.state.mode, 1);

    node.run_for(5_000);
    assert_eq!(
        node.hw.store.get(&PsKey::LC_STATE),
        Some(&vec![1, 0, 0, 0, 0])
    );
}

#[test]
fn linear_output_drives_the_led_immediately() {
    let mut node = ready();
    node.deliver(MeshEvent::Lc(LcEvent::LinearOutputUpdated(16_384)));
    assert_eq!(
        node.hw.led_calls.last(),
        Some(&LedCall::Level {
            level: 32_767,
            transition_ms: 0,
            at_ms: 0,
        })
    );
}

#[test]
fn property_write_is_decoded_and_saved_after_the_window() {
    let mut node = ready();
    node.run_for(1_000);
    node.deliver(property(0x002E, &[0x00, 0x80]));

    assert_eq!(
        node.app.core().lc.properties.get(LcProperty::LightnessOn),
        PropertyValue::Lightness(0x8000)
    );

    node.run_until(7_000);
    let saves: Vec<u64> = node
        .hw
        .saves
        .iter()
        .filter(|(key, _)| *key == PsKey::LC_PROPERTY_STATE)
        .map(|(_, at)| *at)
        .collect();
    assert_eq!(saves, vec![6_000], "the write restarts the window");
}

#[test]
fn malformed_property_writes_are_ignored() {
    let mut node = ready();
    let before = node.app.core().lc.properties;

    node.deliver(property(0x002E, &[0x01]));
    node.deliver(property(0x0099, &[0x01, 0x02]));

    assert_eq!(node.app.core().lc.properties, before);
}

#[test]
fn secondary_onoff_switches_the_controller_not_the_lamp() {
    let mut node = ready();
    node.deliver(MeshEvent::ServerRequest(ServerRequest {
        element: SECONDARY_ELEMENT,
        ..request(
            SWITCH_ADDR,
            ModelId::GENERIC_ON_OFF_SERVER,
            GenericRequest::OnOff(OnOff::On),
        )
    }));

    assert_eq!(node.app.core().lc.state.onoff_current, OnOff::On);
    assert_eq!(node.app.core().lighting.state.onoff_current, OnOff::Off);
    let response = node.hw.responses()[0];
    assert_eq!(response.element, SECONDARY_ELEMENT);
    assert_eq!(response.current, GenericState::OnOff(OnOff::On));
}

#[test]
fn events_are_ignored_with_lighting_disabled() {
    let config = NodeConfig {
        lighting_enabled: false,
        ..Default::default()
    };
    let mut node = Node::provisioned(config);
    node.deliver(MeshEvent::Lc(LcEvent::ModeUpdated(1)));
    assert_eq!(node.app.core().lc.state.mode, 0);
}
