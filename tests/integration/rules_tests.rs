//! Application rules driven by the two LPN clients, the local button and
//! the PIR sensor.

use roomnode::app::events::{AlertKind, AppEvent, Stream};
use roomnode::app::ports::{Edge, LcdRow};
use roomnode::config::NodeConfig;
use roomnode::mesh::MeshEvent;
use roomnode::mesh::models::{GenericRequest, GenericState, ModelId, OnOff, StateKind};
use roomnode::pins::MOTION_GPIO;
use roomnode::store::PsKey;

use crate::mock_hw::{NODE_ADDR, Node, request};

const AUTHORITY: u16 = 3;
const STREAM: u16 = 2;

fn ready() -> Node {
    let mut node = Node::provisioned(NodeConfig::default());
    node.hw.clear_calls();
    node
}

fn onoff(node: &mut Node, client: u16, value: OnOff) {
    node.deliver(MeshEvent::ServerRequest(request(
        client,
        ModelId::GENERIC_ON_OFF_SERVER,
        GenericRequest::OnOff(value),
    )));
}

fn level(node: &mut Node, client: u16, value: i16) {
    node.deliver(MeshEvent::ServerRequest(request(
        client,
        ModelId::GENERIC_LEVEL_SERVER,
        GenericRequest::Level(value),
    )));
}

// ── Authority client ─────────────────────────────────────────

#[test]
fn authority_on_toggles_and_persists() {
    let mut node = ready();
    onoff(&mut node, AUTHORITY, OnOff::On);

    assert!(node.app.rules().authorized());
    assert!(node.sink.has(&AppEvent::AuthorityChanged { authorized: true }));
    assert_eq!(node.hw.row(LcdRow::Authority), "Authorized");
    assert_eq!(node.hw.edges.get(&MOTION_GPIO), Some(&Edge::Falling));

    let echo = node.hw.responses()[0];
    assert_eq!(echo.current, GenericState::OnOff(OnOff::On));
    assert_eq!(echo.remaining_ms, 0);
    // LPN traffic never reaches the lightbulb
    assert_eq!(node.app.core().lighting.state.onoff_current, OnOff::Off);
    assert!(node.hw.level_ramps().is_empty());

    node.run_for(5_000);
    assert_eq!(node.hw.store.get(&PsKey::AUTHORIZED), Some(&vec![1]));

    onoff(&mut node, AUTHORITY, OnOff::On);
    assert!(!node.app.rules().authorized());
    assert_eq!(node.hw.row(LcdRow::Authority), "Not Authorized");
    assert_eq!(node.hw.edges.get(&MOTION_GPIO), Some(&Edge::Rising));
}

#[test]
fn authority_off_is_acknowledged_but_changes_nothing() {
    let mut node = ready();
    onoff(&mut node, AUTHORITY, OnOff::Off);

    assert!(!node.app.rules().authorized());
    assert_eq!(
        node.sink
            .count(|e| matches!(e, AppEvent::AuthorityChanged { .. })),
        0
    );
    assert_eq!(node.hw.responses().len(), 1);
}

#[test]
fn authority_level_is_ultrasonic_distance() {
    let mut node = ready();
    level(&mut node, AUTHORITY, 1_234);

    assert_eq!(node.hw.row(LcdRow::Ultrasonic), "Dist: 12.34 cm");
    assert!(node.sink.has(&AppEvent::Distance(1_234)));
    assert_eq!(node.app.core().lighting.state.lightness_current, 0);
}

// ── Stream client ────────────────────────────────────────────

#[test]
fn high_temperature_raises_the_alert_and_tracks_the_maximum() {
    let mut node = ready();
    onoff(&mut node, STREAM, OnOff::On);
    assert!(node.sink.has(&AppEvent::StreamSelected(Stream::Temperature)));

    level(&mut node, STREAM, 3_512);
    assert_eq!(node.hw.row(LcdRow::Temperature), "Temp: 35.12 C");
    assert_eq!(node.hw.row(LcdRow::Alert), "HIGH TEMP");
    assert!(node.hw.alert);
    assert!(node.sink.has(&AppEvent::AlertRaised(AlertKind::HighTemperature)));
    assert!(node.sink.has(&AppEvent::Temperature {
        centi_c: 3_512,
        max_centi_c: 3_512,
    }));

    level(&mut node, STREAM, 2_500);
    assert_eq!(node.app.rules().max_temperature(), 3_512);
    assert_eq!(
        node.sink
            .count(|e| *e == AppEvent::AlertRaised(AlertKind::HighTemperature)),
        1
    );

    node.run_for(5_000);
    assert_eq!(
        node.hw.store.get(&PsKey::MAX_TEMPERATURE),
        Some(&3_512u16.to_le_bytes().to_vec())
    );
}

#[test]
fn temperature_at_the_limit_does_not_alert() {
    let mut node = ready();
    level(&mut node, STREAM, 3_400);
    assert!(!node.hw.alert);
    assert_eq!(node.app.rules().stream(), Stream::Temperature);
}

#[test]
fn accelerometer_stream_detects_falls() {
    let mut node = ready();
    onoff(&mut node, STREAM, OnOff::Off);
    assert_eq!(node.app.rules().stream(), Stream::Accelerometer);

    level(&mut node, STREAM, 100);
    assert_eq!(node.hw.row(LcdRow::Accelerometer), "Acc: 100");
    assert!(!node.hw.alert);

    level(&mut node, STREAM, 3_000);
    assert_eq!(node.hw.row(LcdRow::Alert), "FALL DETECTED");
    assert!(node.sink.has(&AppEvent::AlertRaised(AlertKind::FallDetected)));
    assert!(node.sink.has(&AppEvent::Acceleration(3_000)));
    // acceleration is not a temperature
    assert_eq!(node.app.rules().max_temperature(), 0);
}

#[test]
fn configured_client_addresses_replace_the_defaults() {
    let config = NodeConfig {
        authority_client_addr: 0x0020,
        stream_client_addr: 0x0021,
        ..Default::default()
    };
    let mut node = Node::provisioned(config);

    // address 3 is now an ordinary lighting client
    onoff(&mut node, AUTHORITY, OnOff::On);
    assert!(!node.app.rules().authorized());
    assert_eq!(node.app.core().lighting.state.onoff_current, OnOff::On);

    onoff(&mut node, 0x0020, OnOff::On);
    assert!(node.app.rules().authorized());
}

// ── Button ───────────────────────────────────────────────────

#[test]
fn button_presses_are_counted_published_and_saved() {
    let mut node = ready();

    node.press(true);
    assert!(node.sink.has(&AppEvent::ButtonPressed { count: 1 }));
    assert_eq!(node.hw.row(LcdRow::TempValue), "Button Pressed");

    node.press(false);
    assert!(node.sink.has(&AppEvent::ButtonReleased));
    assert_eq!(node.hw.row(LcdRow::TempValue), "Button Released");
    assert_eq!(node.hw.published(StateKind::OnOff), 2);

    node.press(true);
    node.press(false);
    assert_eq!(node.app.rules().button_count(), 2);

    node.run_for(5_000);
    assert_eq!(node.hw.store.get(&PsKey::BUTTON_COUNT), Some(&vec![2]));
}

// ── Motion ───────────────────────────────────────────────────

#[test]
fn motion_in_an_empty_room_is_an_intruder() {
    let mut node = ready();
    node.deliver(MeshEvent::FriendshipEstablished { lpn_address: AUTHORITY });

    node.motion();
    assert!(node.hw.alert);
    assert_eq!(node.hw.row(LcdRow::Alert), "INTRUDER");
    assert!(node.sink.has(&AppEvent::AlertRaised(AlertKind::Intruder)));
}

#[test]
fn motion_with_authorized_personnel_clears_the_alert() {
    let mut node = ready();
    level(&mut node, STREAM, 3_600);
    assert!(node.hw.alert);

    onoff(&mut node, AUTHORITY, OnOff::On);
    node.motion();
    assert!(!node.hw.alert);
    assert!(node.sink.has(&AppEvent::AlertCleared));
}

#[test]
fn persisted_rule_state_is_restored_at_boot() {
    let mut node = Node::new(NodeConfig::default());
    node.hw.store.insert(PsKey::BUTTON_COUNT, vec![9]);
    node.hw.store.insert(PsKey::AUTHORIZED, vec![1]);
    node.hw
        .store
        .insert(PsKey::MAX_TEMPERATURE, 3_600u16.to_le_bytes().to_vec());
    node.hw.network = Some((NODE_ADDR, 0));
    node.boot();

    assert_eq!(node.app.rules().button_count(), 9);
    assert!(node.app.rules().authorized());
    assert_eq!(node.app.rules().max_temperature(), 3_600);

    node.deliver(MeshEvent::FriendshipEstablished { lpn_address: STREAM });
    assert_eq!(node.hw.row(LcdRow::Authority), "Authorized");
    assert_eq!(node.hw.edges.get(&MOTION_GPIO), Some(&Edge::Falling));
}
