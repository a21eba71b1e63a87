//! Debounced persistence across the records.

use roomnode::config::NodeConfig;
use roomnode::mesh::MeshEvent;
use roomnode::mesh::models::{GenericRequest, ModelId, OnOff, OnPowerUp};
use roomnode::store::PsKey;

use crate::mock_hw::{NODE_ADDR, Node, request};

fn saves_of(node: &Node, key: PsKey) -> Vec<u64> {
    node.hw
        .saves
        .iter()
        .filter(|(k, _)| *k == key)
        .map(|(_, at)| *at)
        .collect()
}

fn click(node: &mut Node) {
    node.press(true);
    node.press(false);
}

#[test]
fn changes_inside_the_window_coalesce_into_one_write() {
    let mut node = Node::provisioned(NodeConfig::default());

    click(&mut node);
    node.run_until(2_000);
    click(&mut node);
    node.run_until(4_000);
    click(&mut node);

    node.run_until(8_999);
    assert!(saves_of(&node, PsKey::BUTTON_COUNT).is_empty());
    node.run_until(12_000);
    assert_eq!(saves_of(&node, PsKey::BUTTON_COUNT), vec![9_000]);
    assert_eq!(node.hw.store[&PsKey::BUTTON_COUNT], vec![3]);
}

#[test]
fn each_record_has_its_own_window() {
    let mut node = Node::provisioned(NodeConfig::default());

    click(&mut node);
    node.run_until(3_000);
    node.deliver(MeshEvent::ServerRequest(request(
        3,
        ModelId::GENERIC_ON_OFF_SERVER,
        GenericRequest::OnOff(OnOff::On),
    )));

    node.run_until(10_000);
    assert_eq!(saves_of(&node, PsKey::BUTTON_COUNT), vec![5_000]);
    assert_eq!(saves_of(&node, PsKey::AUTHORIZED), vec![8_000]);
}

#[test]
fn unchanged_records_are_never_written() {
    let mut node = Node::provisioned(NodeConfig::default());
    node.run_for(20_000);

    assert!(saves_of(&node, PsKey::BUTTON_COUNT).is_empty());
    assert!(saves_of(&node, PsKey::AUTHORIZED).is_empty());
    assert!(saves_of(&node, PsKey::MAX_TEMPERATURE).is_empty());
}

#[test]
fn a_record_of_the_wrong_length_falls_back_to_defaults() {
    let mut node = Node::new(NodeConfig::default());
    node.hw.store.insert(PsKey::LIGHTBULB_STATE, vec![0xAA; 39]);
    node.hw.store.insert(PsKey::BUTTON_COUNT, vec![4, 4]);
    node.hw.network = Some((NODE_ADDR, 0));
    node.boot();

    let bulb = &node.app.core().lighting.state;
    assert_eq!(bulb.onpowerup, OnPowerUp::Off);
    assert_eq!(bulb.lightness_last, 0xFFFF);
    assert_eq!((bulb.lightness_min, bulb.lightness_max), (1, 0xFFFF));
    assert_eq!((bulb.temperature_min, bulb.temperature_max), (800, 20_000));
    assert_eq!(node.app.rules().button_count(), 0);
}
