//! Lighting servers end to end: requests from a plain lighting client run
//! through the dispatcher, drive the LED and persist the lightbulb record.

use roomnode::app::events::AppEvent;
use roomnode::config::NodeConfig;
use roomnode::lighting::LevelChannel;
use roomnode::mesh::MeshEvent;
use roomnode::mesh::models::{
    GenericRequest, GenericState, ModelId, OnOff, OnPowerUp, PRIMARY_ELEMENT, SECONDARY_ELEMENT,
    ServerRequest, StateChange, StateKind, StateRecall, UNKNOWN_REMAINING_TIME,
};
use roomnode::store::PsKey;
use roomnode::timer::TimerId;

use crate::mock_hw::{LedCall, NODE_ADDR, Node, SWITCH_ADDR, request};

fn ready() -> Node {
    let mut node = Node::provisioned(NodeConfig::default());
    node.hw.clear_calls();
    node
}

fn send(node: &mut Node, req: ServerRequest) {
    node.deliver(MeshEvent::ServerRequest(req));
}

fn switch(model: ModelId, req: GenericRequest) -> ServerRequest {
    request(SWITCH_ADDR, model, req)
}

#[test]
fn delayed_onoff_ramps_then_saves_once() {
    let mut node = ready();
    send(
        &mut node,
        ServerRequest {
            transition_ms: 500,
            delay_ms: 100,
            ..switch(ModelId::GENERIC_ON_OFF_SERVER, GenericRequest::OnOff(OnOff::On))
        },
    );

    let first = node.hw.responses()[0];
    assert_eq!(first.remaining_ms, 600);
    assert_eq!(first.current, GenericState::OnOff(OnOff::Off));
    assert_eq!(first.target, Some(GenericState::OnOff(OnOff::On)));

    node.run_until(99);
    assert!(node.hw.level_ramps().is_empty());

    node.run_until(100);
    assert_eq!(node.hw.level_ramps(), vec![(0xFFFF, 500, 100)]);
    // reads as on for the whole ramp
    assert_eq!(node.app.core().lighting.state.onoff_current, OnOff::On);

    node.run_until(600);
    let bulb = &node.app.core().lighting.state;
    assert_eq!(bulb.lightness_current, 0xFFFF);
    assert_eq!(bulb.onoff_current, OnOff::On);
    assert!(!node.app.core().timers.is_active(TimerId::OnOffTransition));

    node.run_until(5_599);
    assert!(!node.hw.store.contains_key(&PsKey::LIGHTBULB_STATE));
    node.run_until(5_600);
    assert_eq!(node.hw.store[&PsKey::LIGHTBULB_STATE].len(), 40);
}

#[test]
fn primary_level_maps_onto_lightness() {
    let mut node = ready();
    send(
        &mut node,
        ServerRequest {
            transition_ms: 200,
            ..switch(ModelId::GENERIC_LEVEL_SERVER, GenericRequest::Level(-16_384))
        },
    );

    assert_eq!(node.app.core().lighting.state.lightness_target, 16_384);
    assert_eq!(node.hw.level_ramps(), vec![(16_384, 200, 0)]);

    node.run_until(200);
    let lighting = &node.app.core().lighting;
    assert_eq!(lighting.state.lightness_current, 16_384);
    assert_eq!(lighting.level_current(LevelChannel::Primary), -16_384);
    assert_eq!(lighting.state.onoff_current, OnOff::On);
}

#[test]
fn immediate_ctl_drives_both_outputs_and_publishes_bound_states() {
    let mut node = ready();
    send(
        &mut node,
        switch(
            ModelId::LIGHT_CTL_SERVER,
            GenericRequest::Ctl {
                lightness: 0x4000,
                temperature: 0x4000,
                deltauv: 0,
            },
        ),
    );

    assert!(node.hw.led_calls.contains(&LedCall::Level {
        level: 0x4000,
        transition_ms: 0,
        at_ms: 0,
    }));
    assert!(node.hw.led_calls.contains(&LedCall::Temperature {
        temperature: 0x4000,
        transition_ms: 0,
    }));

    let bulb = &node.app.core().lighting.state;
    assert_eq!(bulb.lightness_current, 0x4000);
    assert_eq!(bulb.temperature_current, 0x4000);

    let response = node.hw.responses()[0];
    assert_eq!(response.model, ModelId::LIGHT_CTL_SERVER);
    assert_eq!(response.remaining_ms, 0);
    assert!(node.hw.published(StateKind::Ctl) >= 1);
    assert!(node.hw.published(StateKind::LightnessActual) >= 1);
    assert!(node.hw.published(StateKind::CtlTemperature) >= 1);
}

#[test]
fn level_move_then_halt_freezes_at_the_led_output() {
    let mut node = ready();
    send(
        &mut node,
        switch(ModelId::GENERIC_LEVEL_SERVER, GenericRequest::Level(0)),
    );
    assert_eq!(node.hw.level_ramps(), vec![(0x8000, 0, 0)]);

    send(
        &mut node,
        ServerRequest {
            transition_ms: 100,
            ..switch(ModelId::GENERIC_LEVEL_SERVER, GenericRequest::LevelMove(1_000))
        },
    );
    assert_eq!(
        node.hw.responses().last().map(|s| s.remaining_ms),
        Some(UNKNOWN_REMAINING_TIME)
    );
    assert!(node.app.core().lighting.move_request(LevelChannel::Primary).is_moving());

    node.run_until(350);
    let level = node.app.core().lighting.level_current(LevelChannel::Primary);
    assert_eq!(level, 3_000, "three whole steps taken");

    send(
        &mut node,
        switch(ModelId::GENERIC_LEVEL_SERVER, GenericRequest::LevelHalt),
    );

    let lighting = &node.app.core().lighting;
    let frozen = lighting.level_current(LevelChannel::Primary);
    assert!(frozen > 3_000 && frozen < 4_000, "halted mid-step at {frozen}");
    assert_eq!(frozen, lighting.level_target(LevelChannel::Primary));
    assert_eq!(lighting.state.lightness_current, node.hw.level_now());
    assert!(!lighting.move_request(LevelChannel::Primary).is_moving());
    assert!(!node.app.core().timers.is_active(TimerId::PriLevelMove));

    node.run_for(1_000);
    assert_eq!(
        node.app.core().lighting.level_current(LevelChannel::Primary),
        frozen
    );
}

#[test]
fn zero_move_delta_changes_nothing() {
    let mut node = ready();
    send(
        &mut node,
        ServerRequest {
            transition_ms: 100,
            ..switch(ModelId::GENERIC_LEVEL_SERVER, GenericRequest::LevelMove(0))
        },
    );
    assert!(!node.app.core().timers.is_active(TimerId::PriLevelMove));
    assert!(node.hw.level_ramps().is_empty());
    assert_eq!(node.hw.responses()[0].remaining_ms, 0);
}

#[test]
fn request_for_current_state_is_a_no_op() {
    let mut node = ready();
    send(
        &mut node,
        ServerRequest {
            transition_ms: 300,
            ..switch(ModelId::GENERIC_ON_OFF_SERVER, GenericRequest::OnOff(OnOff::Off))
        },
    );

    assert_eq!(node.hw.responses()[0].remaining_ms, 0);
    assert!(node.hw.level_ramps().is_empty());
    assert!(!node.app.core().timers.is_active(TimerId::OnOffTransition));
}

#[test]
fn switching_on_restores_the_last_lightness() {
    let mut node = ready();
    send(
        &mut node,
        switch(
            ModelId::LIGHT_LIGHTNESS_SERVER,
            GenericRequest::LightnessActual(0x3000),
        ),
    );
    send(
        &mut node,
        switch(ModelId::GENERIC_ON_OFF_SERVER, GenericRequest::OnOff(OnOff::Off)),
    );
    assert_eq!(node.app.core().lighting.state.lightness_current, 0);

    send(
        &mut node,
        switch(ModelId::GENERIC_ON_OFF_SERVER, GenericRequest::OnOff(OnOff::On)),
    );
    let bulb = &node.app.core().lighting.state;
    assert_eq!(bulb.lightness_current, 0x3000);
    assert_eq!(bulb.lightness_last, 0x3000);
    assert_eq!(node.hw.level_now(), 0x3000);
}

#[test]
fn lightness_range_clamps_later_requests() {
    let mut node = ready();
    send(
        &mut node,
        switch(
            ModelId::LIGHT_LIGHTNESS_SETUP_SERVER,
            GenericRequest::LightnessRange {
                min: 0x1000,
                max: 0x8000,
            },
        ),
    );
    send(
        &mut node,
        switch(
            ModelId::LIGHT_LIGHTNESS_SERVER,
            GenericRequest::LightnessActual(0xF000),
        ),
    );
    assert_eq!(node.app.core().lighting.state.lightness_current, 0x8000);
}

#[test]
fn invalid_lightness_range_is_ignored_without_a_response() {
    let mut node = ready();
    send(
        &mut node,
        switch(
            ModelId::LIGHT_LIGHTNESS_SETUP_SERVER,
            GenericRequest::LightnessRange { min: 0, max: 0x8000 },
        ),
    );
    let bulb = &node.app.core().lighting.state;
    assert_eq!((bulb.lightness_min, bulb.lightness_max), (1, 0xFFFF));
    assert!(node.hw.responses().is_empty());
}

#[test]
fn secondary_level_drives_colour_temperature() {
    let mut node = ready();
    send(
        &mut node,
        ServerRequest {
            element: SECONDARY_ELEMENT,
            ..switch(ModelId::GENERIC_LEVEL_SERVER, GenericRequest::Level(0))
        },
    );
    let bulb = &node.app.core().lighting.state;
    assert!((10_390..=10_410).contains(&bulb.temperature_current));
    assert_eq!(bulb.sec_level_current, 0);
    assert!(matches!(
        node.hw.led_calls.last(),
        Some(LedCall::Temperature { transition_ms: 0, .. })
    ));
}

#[test]
fn restore_policy_brings_the_light_back_after_reboot() {
    let mut node = ready();
    send(
        &mut node,
        switch(
            ModelId::GENERIC_POWER_ON_OFF_SETUP_SERVER,
            GenericRequest::OnPowerUp(OnPowerUp::Restore),
        ),
    );
    send(
        &mut node,
        switch(
            ModelId::LIGHT_LIGHTNESS_SERVER,
            GenericRequest::LightnessActual(0x5000),
        ),
    );
    node.run_for(5_000);
    assert!(node.hw.store.contains_key(&PsKey::LIGHTBULB_STATE));

    let mut next = Node::new(NodeConfig::default());
    next.hw.store = node.hw.store.clone();
    next.hw.network = Some((NODE_ADDR, 0));
    next.boot();

    let bulb = &next.app.core().lighting.state;
    assert_eq!(bulb.onpowerup, OnPowerUp::Restore);
    assert_eq!(bulb.lightness_current, 0x5000);
    assert_eq!(next.hw.level_now(), 0x5000);
}

#[test]
fn request_to_an_unregistered_model_is_reported() {
    let mut node = ready();
    send(
        &mut node,
        switch(ModelId::LIGHT_LC_SERVER, GenericRequest::OnOff(OnOff::On)),
    );
    assert!(node.sink.has(&AppEvent::Unhandled {
        model: ModelId::LIGHT_LC_SERVER,
        element: 0,
    }));

    // registered, but only on the secondary element
    send(
        &mut node,
        switch(
            ModelId::LIGHT_CTL_TEMPERATURE_SERVER,
            GenericRequest::CtlTemperature {
                temperature: 3_000,
                deltauv: 0,
            },
        ),
    );
    assert!(node.sink.has(&AppEvent::Unhandled {
        model: ModelId::LIGHT_CTL_TEMPERATURE_SERVER,
        element: 0,
    }));
}

// ── Scene recall and library-driven changes ──────────────────

fn recall(
    model: ModelId,
    element: u16,
    current: GenericState,
    target: GenericState,
    ms: u32,
) -> MeshEvent {
    MeshEvent::StateRecalled(StateRecall {
        model,
        element,
        current,
        target,
        transition_ms: ms,
    })
}

fn changed(model: ModelId, element: u16, state: GenericState) -> MeshEvent {
    MeshEvent::StateChanged(StateChange {
        model,
        element,
        current: state,
        target: state,
        remaining_ms: 0,
    })
}

#[test]
fn recall_off_with_a_transition_ends_dark() {
    let mut node = ready();
    send(
        &mut node,
        switch(ModelId::GENERIC_ON_OFF_SERVER, GenericRequest::OnOff(OnOff::On)),
    );
    assert_eq!(node.app.core().lighting.state.lightness_current, 0xFFFF);

    node.deliver(recall(
        ModelId::GENERIC_ON_OFF_SERVER,
        PRIMARY_ELEMENT,
        GenericState::OnOff(OnOff::On),
        GenericState::OnOff(OnOff::Off),
        200,
    ));
    assert_eq!(node.hw.level_ramps().last(), Some(&(0, 200, 0)));
    assert_eq!(node.app.core().lighting.state.lightness_target, 0);

    node.run_for(1_000);
    let bulb = &node.app.core().lighting.state;
    assert_eq!(bulb.onoff_current, OnOff::Off);
    assert_eq!(bulb.onoff_target, OnOff::Off);
    assert_eq!(bulb.lightness_current, 0);
    assert!(!node.app.core().timers.is_active(TimerId::OnOffTransition));
}

#[test]
fn immediate_recall_on_drives_the_led() {
    let mut node = ready();
    node.deliver(recall(
        ModelId::GENERIC_ON_OFF_SERVER,
        PRIMARY_ELEMENT,
        GenericState::OnOff(OnOff::On),
        GenericState::OnOff(OnOff::On),
        0,
    ));

    let bulb = &node.app.core().lighting.state;
    assert_eq!(bulb.onoff_current, OnOff::On);
    assert_eq!(bulb.lightness_current, 0xFFFF);
    assert_eq!(node.hw.level_now(), 0xFFFF);
    assert!(node.hw.published(StateKind::LightnessActual) > 0);
}

#[test]
fn changed_temperature_is_clamped_into_range() {
    let mut node = ready();
    node.deliver(changed(
        ModelId::LIGHT_CTL_TEMPERATURE_SERVER,
        SECONDARY_ELEMENT,
        GenericState::CtlTemperature {
            temperature: 100,
            deltauv: 0,
        },
    ));

    let bulb = &node.app.core().lighting.state;
    assert_eq!(bulb.temperature_current, bulb.temperature_min);
    assert_eq!(bulb.sec_level_current, i16::MIN);
}

#[test]
fn changed_lightness_and_ctl_respect_the_range() {
    let mut node = ready();
    send(
        &mut node,
        switch(
            ModelId::LIGHT_LIGHTNESS_SETUP_SERVER,
            GenericRequest::LightnessRange {
                min: 0x1000,
                max: 0x8000,
            },
        ),
    );

    node.deliver(changed(
        ModelId::LIGHT_LIGHTNESS_SERVER,
        PRIMARY_ELEMENT,
        GenericState::LightnessActual(0xF000),
    ));
    assert_eq!(node.app.core().lighting.state.lightness_current, 0x8000);

    node.deliver(changed(
        ModelId::LIGHT_CTL_SERVER,
        PRIMARY_ELEMENT,
        GenericState::Ctl {
            lightness: 0x0010,
            temperature: 30_000,
            deltauv: 0,
        },
    ));
    let bulb = &node.app.core().lighting.state;
    assert_eq!(bulb.lightness_current, 0x1000);
    assert_eq!(bulb.temperature_current, bulb.temperature_max);
}
