//! Application rules: reactions to the local button, the PIR sensor and
//! the readings forwarded by the Low-Power Nodes.
//!
//! Two LPN clients talk to element 0 of this node:
//!
//! | Client    | On/Off request                | Level request                 |
//! |-----------|-------------------------------|-------------------------------|
//! | authority | ON toggles authorized presence | ultrasonic distance (×100 cm) |
//! | stream    | ON = temperature, OFF = accel  | reading of the selected stream |

use core::fmt::Write;

use heapless::String;
use log::{info, warn};

use super::events::{AlertKind, AppEvent, Stream};
use super::ports::{Edge, EventSink, LcdRow, NodeHw, StoragePort};
use crate::config::NodeConfig;
use crate::mesh;
use crate::mesh::models::{
    GenericRequest, GenericState, IMMEDIATE, ModelId, OnOff, PRIMARY_ELEMENT, ServerRequest,
    ServerStatus, StateKind,
};
use crate::pins::{MOTION_GPIO, PB0_GPIO};
use crate::store::{self, Authorized, ButtonCount, MaxTemperature, PsRecord};
use crate::timer::{TimerId, TimerService};

type Row = String<24>;

pub struct RuleEngine {
    authorized: Authorized,
    button_count: ButtonCount,
    max_temperature: MaxTemperature,
    stream: Stream,
    authority_addr: u16,
    stream_addr: u16,
    high_temp_centi_c: i16,
    fall_threshold: i16,
    save_debounce_ms: u32,
}

impl RuleEngine {
    pub fn new(config: &NodeConfig) -> Self {
        Self {
            authorized: Authorized::defaults(),
            button_count: ButtonCount::defaults(),
            max_temperature: MaxTemperature::defaults(),
            stream: Stream::default(),
            authority_addr: config.authority_client_addr,
            stream_addr: config.stream_client_addr,
            high_temp_centi_c: config.high_temp_centi_c,
            fall_threshold: config.fall_threshold,
            save_debounce_ms: config.save_debounce_ms,
        }
    }

    /// Restore the three application records.
    pub fn load(&mut self, storage: &impl StoragePort) {
        self.button_count = store::load_record(storage);
        self.authorized = store::load_record(storage);
        self.max_temperature = store::load_record(storage);
        info!("ALERT | button pressed count {}", self.button_count.0);
        if self.authorized.0 {
            info!("ALERT | authorized personnel present in room");
        } else {
            info!("ALERT | authorized personnel not present in room");
        }
    }

    pub fn authorized(&self) -> bool {
        self.authorized.0
    }

    pub fn button_count(&self) -> u8 {
        self.button_count.0
    }

    pub fn max_temperature(&self) -> u16 {
        self.max_temperature.0
    }

    pub fn stream(&self) -> Stream {
        self.stream
    }

    /// Whether a server request carries LPN data for the rules rather
    /// than a lighting command.
    pub fn claims(&self, req: &ServerRequest) -> bool {
        req.element == PRIMARY_ELEMENT
            && (req.client == self.authority_addr || req.client == self.stream_addr)
            && matches!(
                req.request,
                GenericRequest::OnOff(_) | GenericRequest::Level(_)
            )
    }

    // -----------------------------------------------------------------------
    // LPN requests
    // -----------------------------------------------------------------------

    pub fn handle_request(
        &mut self,
        timers: &mut TimerService,
        hw: &mut impl NodeHw,
        sink: &mut impl EventSink,
        req: &ServerRequest,
    ) {
        info!(
            "ALERT | request {:?} from client {}",
            req.request, req.client
        );
        let authority = req.client == self.authority_addr;
        match req.request {
            GenericRequest::OnOff(value) if authority => {
                if value.is_on() {
                    self.toggle_authority(timers, hw, sink);
                }
            }
            GenericRequest::OnOff(value) => {
                self.stream = if value.is_on() {
                    Stream::Temperature
                } else {
                    Stream::Accelerometer
                };
                info!("ALERT | stream selector: {:?}", self.stream);
                sink.emit(&AppEvent::StreamSelected(self.stream));
            }
            GenericRequest::Level(distance) if authority => {
                info!("ALERT | ultrasonic data {}", distance);
                hw.write_row(LcdRow::Ultrasonic, &centi_row("Dist: ", distance, " cm"));
                sink.emit(&AppEvent::Distance(distance));
            }
            GenericRequest::Level(reading) => match self.stream {
                Stream::Temperature => self.temperature_reading(timers, hw, sink, reading),
                Stream::Accelerometer => self.acceleration_reading(hw, sink, reading),
            },
            _ => return,
        }

        if let Some(current) = echo_state(&req.request) {
            let status = ServerStatus {
                model: req.model,
                element: req.element,
                current,
                target: None,
                remaining_ms: IMMEDIATE,
            };
            mesh::respond(hw, req, &status);
        }
    }

    fn toggle_authority(
        &mut self,
        timers: &mut TimerService,
        hw: &mut impl NodeHw,
        sink: &mut impl EventSink,
    ) {
        self.authorized.0 = !self.authorized.0;
        hw.write_row(LcdRow::TempValue, "Button Pressed");
        store::mark_dirty::<Authorized>(timers, self.save_debounce_ms);
        self.arm_motion(hw);
        info!("ALERT | authorized personnel: {}", self.authorized.0);
        sink.emit(&AppEvent::AuthorityChanged {
            authorized: self.authorized.0,
        });
    }

    fn temperature_reading(
        &mut self,
        timers: &mut TimerService,
        hw: &mut impl NodeHw,
        sink: &mut impl EventSink,
        centi_c: i16,
    ) {
        hw.write_row(LcdRow::Temperature, &centi_row("Temp: ", centi_c, " C"));
        if let Ok(value) = u16::try_from(centi_c) {
            if value > self.max_temperature.0 {
                self.max_temperature.0 = value;
                store::mark_dirty::<MaxTemperature>(timers, self.save_debounce_ms);
                info!("ALERT | new max temperature {}", value);
            }
        }
        sink.emit(&AppEvent::Temperature {
            centi_c,
            max_centi_c: self.max_temperature.0,
        });
        if centi_c > self.high_temp_centi_c {
            self.raise(hw, sink, AlertKind::HighTemperature);
        }
    }

    fn acceleration_reading(&mut self, hw: &mut impl NodeHw, sink: &mut impl EventSink, v: i16) {
        let mut row = Row::new();
        let _ = write!(row, "Acc: {}", v);
        hw.write_row(LcdRow::Accelerometer, &row);
        sink.emit(&AppEvent::Acceleration(v));
        if v > self.fall_threshold {
            self.raise(hw, sink, AlertKind::FallDetected);
        }
    }

    fn raise(&mut self, hw: &mut impl NodeHw, sink: &mut impl EventSink, kind: AlertKind) {
        let banner = match kind {
            AlertKind::HighTemperature => "HIGH TEMP",
            AlertKind::FallDetected => "FALL DETECTED",
            AlertKind::Intruder => "INTRUDER",
        };
        warn!("ALERT | {}", banner);
        hw.red_alert();
        hw.write_row(LcdRow::Alert, banner);
        sink.emit(&AppEvent::AlertRaised(kind));
    }

    // -----------------------------------------------------------------------
    // Local inputs
    // -----------------------------------------------------------------------

    /// Configure the PIR interrupt for the current authority mode and show
    /// the mode.  Authorized personnel arm the falling edge, an empty room
    /// the rising edge.
    pub fn arm_motion(&mut self, hw: &mut impl NodeHw) {
        let (edge, text) = if self.authorized.0 {
            (Edge::Falling, "Authorized")
        } else {
            (Edge::Rising, "Not Authorized")
        };
        hw.configure_edge(MOTION_GPIO, edge);
        hw.write_row(LcdRow::Authority, text);
    }

    /// PB0 edge: publish the button state through the primary on/off
    /// server and count presses.
    pub fn on_button_edge(
        &mut self,
        timers: &mut TimerService,
        hw: &mut impl NodeHw,
        sink: &mut impl EventSink,
    ) {
        // active-low
        let pressed = !hw.pin_read(PB0_GPIO);
        let value = if pressed {
            self.button_count.0 = self.button_count.0.wrapping_add(1);
            store::mark_dirty::<ButtonCount>(timers, self.save_debounce_ms);
            hw.write_row(LcdRow::TempValue, "Button Pressed");
            sink.emit(&AppEvent::ButtonPressed {
                count: self.button_count.0,
            });
            OnOff::On
        } else {
            hw.write_row(LcdRow::TempValue, "Button Released");
            sink.emit(&AppEvent::ButtonReleased);
            OnOff::Off
        };

        let status = ServerStatus {
            model: ModelId::GENERIC_ON_OFF_SERVER,
            element: PRIMARY_ELEMENT,
            current: GenericState::OnOff(value),
            target: None,
            remaining_ms: IMMEDIATE,
        };
        mesh::update_and_publish(hw, &status, StateKind::OnOff);
    }

    /// PIR edge.
    pub fn on_motion(&mut self, hw: &mut impl NodeHw, sink: &mut impl EventSink) {
        info!("ALERT | human detected");
        if self.authorized.0 {
            hw.clear_alert();
            sink.emit(&AppEvent::AlertCleared);
        } else {
            self.raise(hw, sink, AlertKind::Intruder);
        }
    }

    /// A new humidity sample from the local sensor.
    pub fn on_humidity(&mut self, hw: &mut impl NodeHw, sink: &mut impl EventSink, rh: f32) {
        let mut row = Row::new();
        let _ = write!(row, "RH: {:.1} %", rh);
        hw.write_row(LcdRow::TempValue, &row);
        sink.emit(&AppEvent::HumiditySample(rh));
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Handle a save timer.  Returns `false` for handles the rules do not
    /// own.
    pub fn handle_timer(&mut self, id: TimerId, storage: &mut impl StoragePort) -> bool {
        let result = match id {
            TimerId::SaveMaxTemp => store::save_record(&self.max_temperature, storage),
            TimerId::SaveAuthorized => store::save_record(&self.authorized, storage),
            TimerId::SaveButtonCount => store::save_record(&self.button_count, storage),
            _ => return false,
        };
        if let Err(e) = result {
            warn!("STORE | app state save failed: {}", e);
        }
        true
    }
}

/// State echoed back to an LPN that asked for a response.
fn echo_state(request: &GenericRequest) -> Option<GenericState> {
    match *request {
        GenericRequest::OnOff(v) => Some(GenericState::OnOff(v)),
        GenericRequest::Level(v) => Some(GenericState::Level(v)),
        _ => None,
    }
}

/// `prefix` + a ×100 fixed-point value with two decimals + `suffix`.
fn centi_row(prefix: &str, centi: i16, suffix: &str) -> Row {
    let value = i32::from(centi);
    let sign = if value < 0 { "-" } else { "" };
    let abs = value.abs();
    let mut row = Row::new();
    let _ = write!(row, "{}{}{}.{:02}{}", prefix, sign, abs / 100, abs % 100, suffix);
    row
}
