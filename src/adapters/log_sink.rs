//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the logger (UART on the board, stderr in the simulator).
//! A future telemetry adapter would implement the same trait.

use log::{info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] to the serial console.
#[derive(Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Started => info!("START | event loop running"),
            AppEvent::NodeStateChanged { from, to } => {
                info!("MESH | node {:?} -> {:?}", from, to);
            }
            AppEvent::ModelsReady { registered } => {
                info!("MESH | {} server models ready", registered);
            }
            AppEvent::FriendshipChanged { lpns } => info!("MESH | befriended LPNs: {}", lpns),
            AppEvent::AcquisitionStateChanged { from, to } => {
                info!("ACQ | {:?} -> {:?}", from, to);
            }
            AppEvent::HumiditySample(rh) => info!("ACQ | RH={:.1}%", rh),
            AppEvent::ButtonPressed { count } => info!("ALERT | button pressed, count={}", count),
            AppEvent::ButtonReleased => info!("ALERT | button released"),
            AppEvent::AuthorityChanged { authorized } => {
                info!(
                    "ALERT | personnel {}",
                    if *authorized { "authorized" } else { "not authorized" }
                );
            }
            AppEvent::StreamSelected(stream) => info!("ALERT | LPN stream {:?}", stream),
            AppEvent::Temperature {
                centi_c,
                max_centi_c,
            } => info!(
                "ALERT | T={}.{:02}\u{00b0}C max={}.{:02}\u{00b0}C",
                centi_c / 100,
                (centi_c % 100).unsigned_abs(),
                max_centi_c / 100,
                max_centi_c % 100
            ),
            AppEvent::Acceleration(v) => info!("ALERT | acc={}", v),
            AppEvent::Distance(d) => {
                info!("ALERT | dist={}.{:02}cm", d / 100, (d % 100).unsigned_abs());
            }
            AppEvent::AlertRaised(kind) => warn!("ALERT | raised: {:?}", kind),
            AppEvent::AlertCleared => info!("ALERT | cleared"),
            AppEvent::Unhandled { model, element } => {
                warn!("MESH | no handler for {} on element {}", model, element);
            }
        }
    }
}

/// Sink that keeps every event.  Used by the simulator summary and tests.
#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, pred: impl Fn(&AppEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        LogEventSink.emit(event);
        self.events.push(event.clone());
    }
}
