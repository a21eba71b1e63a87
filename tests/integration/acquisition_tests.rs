//! Periodic humidity acquisition and the sleep modes around it.

use roomnode::app::events::AppEvent;
use roomnode::app::ports::LcdRow;
use roomnode::config::NodeConfig;
use roomnode::fsm::StateId;
use roomnode::mesh::MeshEvent;
use roomnode::pins::SI7021_ADDR;
use roomnode::power::EnergyMode;

use crate::mock_hw::Node;

/// A provisioned node with one LPN attached at t = 0.
fn befriended() -> Node {
    let mut node = Node::provisioned(NodeConfig::default());
    node.deliver(MeshEvent::FriendshipEstablished { lpn_address: 2 });
    node
}

#[test]
fn no_acquisition_before_a_friend_joins() {
    let mut node = Node::provisioned(NodeConfig::default());
    node.run_for(10_000);

    assert_eq!(node.app.sensors().samples(), 0);
    assert!(node.hw.writes.is_empty());
    assert!(!node.hw.rails);
}

#[test]
fn one_period_yields_one_sample() {
    let mut node = befriended();

    node.run_until(3_009);
    assert_eq!(node.app.acquisition_state(), StateId::WriteComplete);
    assert!(node.hw.rails);
    assert_eq!(node.hw.writes, vec![(SI7021_ADDR, vec![0xF5])]);
    assert_eq!(node.hw.reads, 0);

    node.run_until(3_010);
    assert_eq!(node.app.sensors().samples(), 1);
    assert_eq!(node.hw.reads, 1);
    assert!(node.sink.has(&AppEvent::HumiditySample(56.5)));
    assert_eq!(node.hw.row(LcdRow::TempValue), "RH: 56.5 %");
    assert_eq!(node.app.acquisition_state(), StateId::PowerOff);
    assert!(!node.hw.rails, "rails drop once the sample is in");
    assert!(node.sink.has(&AppEvent::AcquisitionStateChanged {
        from: StateId::PowerOff,
        to: StateId::PowerUp,
    }));
}

#[test]
fn samples_accumulate_in_the_history() {
    let mut node = befriended();
    node.hw.humidity_raw = 0x6000;

    node.run_until(9_100);

    let sensors = node.app.sensors();
    assert_eq!(sensors.samples(), 3);
    assert_eq!(sensors.history().len(), 3);
    assert_eq!(sensors.history().latest(), Some(40.875));
    assert_eq!(sensors.history().average(), Some(40.875));
    assert_eq!(node.hw.writes.len(), 3);
}

#[test]
fn bus_nack_aborts_the_cycle_and_the_next_one_recovers() {
    let mut node = befriended();
    node.hw.nack = true;

    node.run_until(3_100);
    assert_eq!(node.app.sensors().samples(), 0);
    assert_eq!(node.app.sensors().bus_errors(), 1);
    assert_eq!(node.app.acquisition_state(), StateId::PowerOff);
    assert!(!node.hw.rails);
    assert_eq!(node.hw.reads, 0);
    assert!(!node.app.governor().is_blocked(EnergyMode::Em2));

    node.hw.nack = false;
    node.run_until(6_100);
    assert_eq!(node.app.sensors().samples(), 1);
    assert_eq!(node.app.sensors().bus_errors(), 1);
}

#[test]
fn deep_sleep_is_held_off_only_while_converting() {
    let mut node = befriended();

    node.run_until(2_900);
    assert!(node.hw.sleeps.iter().all(|m| *m == EnergyMode::Em2));

    node.hw.sleeps.clear();
    node.run_until(3_005);
    assert!(node.app.governor().is_blocked(EnergyMode::Em2));
    assert_eq!(node.hw.sleeps.last(), Some(&EnergyMode::Em1));

    node.run_until(3_500);
    assert!(!node.app.governor().is_blocked(EnergyMode::Em2));
    assert_eq!(node.hw.sleeps.last(), Some(&EnergyMode::Em2));
}
