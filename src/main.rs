//! RoomNode Firmware: Main Entry Point
//!
//! Hexagonal architecture with a single cooperative event loop.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  SimHardware        LogEventSink   NvsAdapter   MonotonicClock │
//! │  (every NodeHw port) (EventSink)   (Config+PS)                 │
//! │  Si7021Bus (I2cPort)   gpio_irq (ISR → SignalQueue)            │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │              AppService (pure logic)                   │    │
//! │  │  lifecycle · models · rules · acquisition · sleep      │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The mesh stack is a black box behind `MeshPort`; this binary drives the
//! loop against the simulated stack with a scripted room scenario.
#![deny(unused_must_use)]

use std::collections::VecDeque;

use anyhow::Result;
use log::{info, warn};

use roomnode::adapters::log_sink::LogEventSink;
use roomnode::adapters::nvs::{NvsAdapter, validate_config};
use roomnode::adapters::sim::SimHardware;
use roomnode::app::ports::{ClockPort, ConfigPort, LcdRow, LedPort};
use roomnode::app::service::AppService;
use roomnode::config::NodeConfig;
use roomnode::drivers::gpio_irq;
use roomnode::events::SIGNALS;
use roomnode::mesh::inbox::MESH_INBOX;
use roomnode::mesh::models::{
    GenericRequest, ModelId, OnOff, PRIMARY_ELEMENT, RESPONSE_REQUIRED, ServerRequest,
};
use roomnode::mesh::{LcEvent, MeshEvent};
use roomnode::pins::PB0_GPIO;
use roomnode::timer::{ms_to_ticks, ticks_to_ms};

/// Simulated run length.
const RUN_MS: u32 = 15_000;
/// Unicast address the provisioner assigns.
const NODE_ADDRESS: u16 = 0x0010;
/// A plain lighting client, not one of the LPNs.
const LIGHT_SWITCH_ADDR: u16 = 0x0001;

// ── Scenario ──────────────────────────────────────────────────

enum Stimulus {
    Mesh(MeshEvent),
    Button { pressed: bool },
    Motion,
}

fn request(client: u16, model: ModelId, request: GenericRequest, transition_ms: u32) -> MeshEvent {
    MeshEvent::ServerRequest(ServerRequest {
        model,
        element: PRIMARY_ELEMENT,
        client,
        server: NODE_ADDRESS,
        appkey: 0,
        request,
        transition_ms,
        delay_ms: 0,
        flags: RESPONSE_REQUIRED,
    })
}

fn scenario(config: &NodeConfig) -> VecDeque<(u32, Stimulus)> {
    let authority = config.authority_client_addr;
    let stream = config.stream_client_addr;
    VecDeque::from([
        (0, Stimulus::Mesh(MeshEvent::SystemBoot)),
        (200, Stimulus::Mesh(MeshEvent::ProvisioningStarted)),
        (
            1_200,
            Stimulus::Mesh(MeshEvent::Provisioned {
                address: NODE_ADDRESS,
                iv_index: 0,
            }),
        ),
        (
            1_500,
            Stimulus::Mesh(MeshEvent::FriendshipEstablished { lpn_address: stream }),
        ),
        (
            2_000,
            Stimulus::Mesh(request(
                LIGHT_SWITCH_ADDR,
                ModelId::LIGHT_LIGHTNESS_SERVER,
                GenericRequest::LightnessActual(0x8000),
                500,
            )),
        ),
        (
            4_000,
            Stimulus::Mesh(request(
                stream,
                ModelId::GENERIC_LEVEL_SERVER,
                GenericRequest::Level(3512),
                0,
            )),
        ),
        (
            5_000,
            Stimulus::Mesh(request(
                authority,
                ModelId::GENERIC_ON_OFF_SERVER,
                GenericRequest::OnOff(OnOff::On),
                0,
            )),
        ),
        (6_000, Stimulus::Motion),
        (7_000, Stimulus::Button { pressed: true }),
        (7_200, Stimulus::Button { pressed: false }),
        (8_000, Stimulus::Mesh(MeshEvent::Lc(LcEvent::ModeUpdated(1)))),
    ])
}

/// Ambient light seen by the LC sensor: daylight plus the lamp.
fn ambient_centilux(hw: &SimHardware<'_>) -> u32 {
    8_000 + u32::from(hw.level()) / 4
}

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. Bootstrap ──────────────────────────────────────────
    #[cfg(target_os = "espidf")]
    {
        esp_idf_svc::sys::link_patches();
        esp_idf_logger::init()?;
    }
    #[cfg(not(target_os = "espidf"))]
    roomnode::adapters::console_log::init(log::LevelFilter::Info)
        .map_err(|e| anyhow::anyhow!("logger install failed: {e}"))?;

    info!("╔══════════════════════════════════════╗");
    info!("║  RoomNode v{}                        ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    if let Err(e) = gpio_irq::install() {
        log::error!("GPIO ISR install failed: {}; continuing without edges", e);
    }

    // ── 2. Load config from NVS (or defaults) ─────────────────
    let nvs = NvsAdapter::new().map_err(|e| anyhow::anyhow!("NVS init: {}", e))?;
    let config = match nvs.load_config() {
        Ok(cfg) => match validate_config(&cfg) {
            Ok(()) => cfg,
            Err(e) => {
                warn!("Stored config rejected ({}), using defaults", e);
                NodeConfig::default()
            }
        },
        Err(e) => {
            warn!("NVS config load failed ({}), using defaults", e);
            NodeConfig::default()
        }
    };

    // ── 3. Construct adapters and the app service ─────────────
    let mut hw = SimHardware::new(&MESH_INBOX, &SIGNALS);
    let mut sink = LogEventSink::new();
    let mut app = AppService::new(config.clone(), &SIGNALS, &MESH_INBOX);
    app.start(&mut hw, &mut sink);

    let mut script = scenario(&config);
    let regulator_ms = u32::from(config.lc_regulator_interval_ms);
    let mut next_regulation = 0u64;
    let end = ms_to_ticks(RUN_MS);

    info!("System ready. Entering event loop.");

    // ── 4. Event loop ─────────────────────────────────────────
    while hw.now_ticks() < end && hw.reset.is_none() {
        let now = hw.now_ticks();

        while script.front().is_some_and(|(at, _)| ms_to_ticks(*at) <= now) {
            let Some((_, stimulus)) = script.pop_front() else {
                break;
            };
            match stimulus {
                Stimulus::Mesh(event) => hw.post(event),
                Stimulus::Button { pressed } => {
                    hw.set_pin(PB0_GPIO, !pressed);
                    gpio_irq::button_isr(&SIGNALS);
                }
                Stimulus::Motion => gpio_irq::motion_isr(&SIGNALS),
            }
        }

        // The LC regulator runs inside the mesh library on the board.
        if app.core().lc.state.mode != 0 && now >= next_regulation {
            let lux = ambient_centilux(&hw);
            let output = app.core_mut().lc.regulate(lux, config.lc_regulator_interval_ms);
            hw.post(MeshEvent::Lc(LcEvent::LinearOutputUpdated(output)));
            next_regulation = now + ms_to_ticks(regulator_ms);
        }

        app.run_until_idle(&mut hw, &mut sink);

        let mut alarm = end;
        if let Some((at, _)) = script.front() {
            alarm = alarm.min(ms_to_ticks(*at));
        }
        if app.core().lc.state.mode != 0 {
            alarm = alarm.min(next_regulation);
        }
        hw.set_alarm(alarm);
        app.sleep(&mut hw);
    }

    // ── 5. Summary ────────────────────────────────────────────
    info!("Simulation ended at {} ms", ticks_to_ms(hw.now_ticks()));
    info!("Node state: {:?}", app.node_state());
    info!("Models registered: {}", app.registered_models());
    info!(
        "Humidity samples: {} (avg {:?})",
        app.sensors().samples(),
        app.sensors().history().average()
    );
    info!(
        "Rules: authorized={} buttons={} max_temp={}",
        app.rules().authorized(),
        app.rules().button_count(),
        app.rules().max_temperature()
    );
    for row in [LcdRow::Action, LcdRow::TempValue, LcdRow::Alert, LcdRow::Authority] {
        info!("LCD {:?}: {}", row, hw.row(row));
    }
    let total: u64 = hw.sleep_ticks.iter().sum::<u64>().max(1);
    info!(
        "Sleep residency: EM0 {}% EM1 {}% EM2 {}%",
        hw.sleep_ticks[0] * 100 / total,
        hw.sleep_ticks[1] * 100 / total,
        hw.sleep_ticks[2] * 100 / total
    );
    if let Some(mode) = hw.reset {
        info!("Node requested reset ({:?})", mode);
    }
    Ok(())
}
