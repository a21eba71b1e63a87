//! Mock hardware adapter for integration tests.
//!
//! Records every mesh-stack, LED and display call so tests can assert on
//! the full command history without a mesh library or LED driver.  The
//! clock is virtual and only moves when the node sleeps.

use std::collections::HashMap;

use roomnode::app::events::AppEvent;
use roomnode::app::ports::{
    ClockPort, DisplayPort, Edge, EventSink, GpioPort, I2cPort, IndicatorPort, LcServerPort,
    LcdRow, LedPort, LedState, MeshPort, ResetMode, StoragePort,
};
use roomnode::app::service::AppService;
use roomnode::config::NodeConfig;
use roomnode::error::{I2cError, MeshError, StorageError};
use roomnode::events::{ExternalSignal, SignalQueue};
use roomnode::mesh::MeshEvent;
use roomnode::mesh::inbox::MeshInbox;
use roomnode::mesh::models::{
    GenericRequest, ModelId, OnOff, PRIMARY_ELEMENT, RESPONSE_REQUIRED, ServerRequest,
    ServerStatus, StateKind,
};
use roomnode::pins::{PB0_GPIO, PB1_GPIO};
use roomnode::power::EnergyMode;
use roomnode::store::PsKey;
use roomnode::timer::{ms_to_ticks, ticks_to_ms};

/// Unicast address the tests provision the node with.
pub const NODE_ADDR: u16 = 0x0010;
/// A lighting client that is neither of the LPNs.
pub const SWITCH_ADDR: u16 = 0x0001;

// ── Call records ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum MeshCall {
    SetDeviceName(String),
    NodeInit,
    StartBeaconing(u8),
    GenericServerInit,
    LibInit(u8),
    FriendInit,
    Register(ModelId, u16),
    Respond { client: u16, status: ServerStatus },
    Update(ServerStatus),
    Publish(ModelId, u16, StateKind),
    SceneServerInit(u16),
    CloseConnection(u8),
    OtaWriteResponse(u8),
    SystemReset(ResetMode),
    LcServerInit(u16),
    LcRegulatorInterval(u16),
    LcMode(u8),
    LcOccupancyMode(u8),
    LcLightOnOff(OnOff),
    LcProperty(u16),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LedCall {
    Level { level: u16, transition_ms: u32, at_ms: u64 },
    Temperature { temperature: u16, transition_ms: u32 },
    State(LedState),
}

#[derive(Debug, Clone, Copy, Default)]
struct Ramp {
    from: u16,
    to: u16,
    start: u64,
    ticks: u64,
}

impl Ramp {
    fn sample(&self, now: u64) -> u16 {
        if self.ticks == 0 || now >= self.start + self.ticks {
            return self.to;
        }
        let elapsed = (now - self.start) as i64;
        let span = i64::from(self.to) - i64::from(self.from);
        (i64::from(self.from) + span * elapsed / self.ticks as i64) as u16
    }
}

// ── MockHardware ──────────────────────────────────────────────

pub struct MockHardware {
    inbox: &'static MeshInbox,
    signals: &'static SignalQueue,

    pub now: u64,
    limit: u64,
    pub sleeps: Vec<EnergyMode>,

    pub network: Option<(u16, u32)>,
    pub fail_node_init: Option<MeshError>,
    pub mesh_calls: Vec<MeshCall>,

    pub led_calls: Vec<LedCall>,
    level: Ramp,
    temperature: Ramp,

    pub alert: bool,
    pub status_toggles: u32,
    pub rows: HashMap<LcdRow, String>,

    pub pins: HashMap<i32, bool>,
    pub edges: HashMap<i32, Edge>,

    pub rails: bool,
    pub writes: Vec<(u8, Vec<u8>)>,
    pub reads: u32,
    pub humidity_raw: u16,
    pub nack: bool,

    pub store: HashMap<PsKey, Vec<u8>>,
    /// Every save, in order.
    pub saves: Vec<(PsKey, u64)>,
    pub erases: u32,
}

#[allow(dead_code)]
impl MockHardware {
    pub fn new(inbox: &'static MeshInbox, signals: &'static SignalQueue) -> Self {
        Self {
            inbox,
            signals,
            now: 0,
            limit: 0,
            sleeps: Vec::new(),
            network: None,
            fail_node_init: None,
            mesh_calls: Vec::new(),
            led_calls: Vec::new(),
            level: Ramp::default(),
            temperature: Ramp::default(),
            alert: false,
            status_toggles: 0,
            rows: HashMap::new(),
            pins: HashMap::from([(PB0_GPIO, true), (PB1_GPIO, true)]),
            edges: HashMap::new(),
            rails: false,
            writes: Vec::new(),
            reads: 0,
            humidity_raw: 0x8000,
            nack: false,
            store: HashMap::new(),
            saves: Vec::new(),
            erases: 0,
        }
    }

    pub fn now_ms(&self) -> u64 {
        ticks_to_ms(self.now)
    }

    /// LED output at the current virtual time.
    pub fn level_now(&self) -> u16 {
        self.level.sample(self.now)
    }

    pub fn row(&self, row: LcdRow) -> &str {
        self.rows.get(&row).map_or("", String::as_str)
    }

    pub fn published(&self, kind: StateKind) -> usize {
        self.mesh_calls
            .iter()
            .filter(|c| matches!(c, MeshCall::Publish(_, _, k) if *k == kind))
            .count()
    }

    pub fn registered(&self) -> Vec<(ModelId, u16)> {
        self.mesh_calls
            .iter()
            .filter_map(|c| match c {
                MeshCall::Register(model, element) => Some((*model, *element)),
                _ => None,
            })
            .collect()
    }

    pub fn responses(&self) -> Vec<&ServerStatus> {
        self.mesh_calls
            .iter()
            .filter_map(|c| match c {
                MeshCall::Respond { status, .. } => Some(status),
                _ => None,
            })
            .collect()
    }

    pub fn resets(&self) -> Vec<ResetMode> {
        self.mesh_calls
            .iter()
            .filter_map(|c| match c {
                MeshCall::SystemReset(mode) => Some(*mode),
                _ => None,
            })
            .collect()
    }

    pub fn level_ramps(&self) -> Vec<(u16, u32, u64)> {
        self.led_calls
            .iter()
            .filter_map(|c| match *c {
                LedCall::Level {
                    level,
                    transition_ms,
                    at_ms,
                } => Some((level, transition_ms, at_ms)),
                _ => None,
            })
            .collect()
    }

    pub fn clear_calls(&mut self) {
        self.mesh_calls.clear();
        self.led_calls.clear();
    }
}

impl MeshPort for MockHardware {
    fn bt_address(&self) -> [u8; 6] {
        [0x3c, 0x8a, 0x1f, 0x57, 0x0b, 0x00]
    }

    fn set_device_name(&mut self, name: &str) -> Result<(), MeshError> {
        self.mesh_calls.push(MeshCall::SetDeviceName(name.to_owned()));
        Ok(())
    }

    fn node_init(&mut self) -> Result<(), MeshError> {
        self.mesh_calls.push(MeshCall::NodeInit);
        if let Some(e) = self.fail_node_init {
            return Err(e);
        }
        let (address, iv_index) = self.network.unwrap_or((0, 0));
        let _ = self.inbox.try_send(MeshEvent::NodeInitialized {
            provisioned: self.network.is_some(),
            address,
            iv_index,
        });
        Ok(())
    }

    fn start_unprov_beaconing(&mut self, bearers: u8) -> Result<(), MeshError> {
        self.mesh_calls.push(MeshCall::StartBeaconing(bearers));
        Ok(())
    }

    fn generic_server_init(&mut self) -> Result<(), MeshError> {
        self.mesh_calls.push(MeshCall::GenericServerInit);
        Ok(())
    }

    fn lib_init(&mut self, max_models: u8) -> Result<(), MeshError> {
        self.mesh_calls.push(MeshCall::LibInit(max_models));
        Ok(())
    }

    fn friend_init(&mut self) -> Result<(), MeshError> {
        self.mesh_calls.push(MeshCall::FriendInit);
        Ok(())
    }

    fn register_model(&mut self, model: ModelId, element: u16) -> Result<(), MeshError> {
        self.mesh_calls.push(MeshCall::Register(model, element));
        Ok(())
    }

    fn server_respond(
        &mut self,
        client: u16,
        _appkey: u16,
        status: &ServerStatus,
        _flags: u8,
    ) -> Result<(), MeshError> {
        self.mesh_calls.push(MeshCall::Respond {
            client,
            status: *status,
        });
        Ok(())
    }

    fn server_update(&mut self, status: &ServerStatus) -> Result<(), MeshError> {
        self.mesh_calls.push(MeshCall::Update(*status));
        Ok(())
    }

    fn server_publish(
        &mut self,
        model: ModelId,
        element: u16,
        kind: StateKind,
    ) -> Result<(), MeshError> {
        self.mesh_calls.push(MeshCall::Publish(model, element, kind));
        Ok(())
    }

    fn scene_server_init(&mut self, element: u16) -> Result<(), MeshError> {
        self.mesh_calls.push(MeshCall::SceneServerInit(element));
        Ok(())
    }

    fn close_connection(&mut self, handle: u8) -> Result<(), MeshError> {
        self.mesh_calls.push(MeshCall::CloseConnection(handle));
        let _ = self
            .inbox
            .try_send(MeshEvent::ConnectionClosed { handle, reason: 0 });
        Ok(())
    }

    fn ota_write_response(&mut self, handle: u8) -> Result<(), MeshError> {
        self.mesh_calls.push(MeshCall::OtaWriteResponse(handle));
        Ok(())
    }

    fn system_reset(&mut self, mode: ResetMode) {
        self.mesh_calls.push(MeshCall::SystemReset(mode));
    }
}

impl LcServerPort for MockHardware {
    fn lc_server_init(&mut self, element: u16) -> Result<(), MeshError> {
        self.mesh_calls.push(MeshCall::LcServerInit(element));
        Ok(())
    }

    fn lc_set_regulator_interval(&mut self, _element: u16, interval_ms: u16) -> Result<(), MeshError> {
        self.mesh_calls.push(MeshCall::LcRegulatorInterval(interval_ms));
        Ok(())
    }

    fn lc_update_mode(&mut self, _element: u16, mode: u8) -> Result<(), MeshError> {
        self.mesh_calls.push(MeshCall::LcMode(mode));
        Ok(())
    }

    fn lc_update_om(&mut self, _element: u16, om: u8) -> Result<(), MeshError> {
        self.mesh_calls.push(MeshCall::LcOccupancyMode(om));
        Ok(())
    }

    fn lc_update_light_onoff(
        &mut self,
        _element: u16,
        value: OnOff,
        _remaining_ms: u32,
    ) -> Result<(), MeshError> {
        self.mesh_calls.push(MeshCall::LcLightOnOff(value));
        Ok(())
    }

    fn lc_update_property(&mut self, _element: u16, id: u16, _data: &[u8]) -> Result<(), MeshError> {
        self.mesh_calls.push(MeshCall::LcProperty(id));
        Ok(())
    }
}

impl LedPort for MockHardware {
    fn set_level(&mut self, level: u16, transition_ms: u32) {
        self.led_calls.push(LedCall::Level {
            level,
            transition_ms,
            at_ms: self.now_ms(),
        });
        self.level = Ramp {
            from: self.level.sample(self.now),
            to: level,
            start: self.now,
            ticks: ms_to_ticks(transition_ms),
        };
    }

    fn set_temperature(&mut self, temperature: u16, _deltauv: i16, transition_ms: u32) {
        self.led_calls.push(LedCall::Temperature {
            temperature,
            transition_ms,
        });
        self.temperature = Ramp {
            from: self.temperature.sample(self.now),
            to: temperature,
            start: self.now,
            ticks: ms_to_ticks(transition_ms),
        };
    }

    fn set_state(&mut self, state: LedState) {
        self.led_calls.push(LedCall::State(state));
    }

    fn level(&self) -> u16 {
        self.level.sample(self.now)
    }

    fn temperature(&self) -> u16 {
        self.temperature.sample(self.now)
    }
}

impl IndicatorPort for MockHardware {
    fn red_alert(&mut self) {
        self.alert = true;
    }

    fn clear_alert(&mut self) {
        self.alert = false;
    }

    fn toggle_status(&mut self) {
        self.status_toggles += 1;
    }
}

impl DisplayPort for MockHardware {
    fn write_row(&mut self, row: LcdRow, text: &str) {
        self.rows.insert(row, text.to_owned());
    }
}

impl GpioPort for MockHardware {
    fn pin_read(&self, gpio: i32) -> bool {
        self.pins.get(&gpio).copied().unwrap_or(true)
    }

    fn configure_edge(&mut self, gpio: i32, edge: Edge) {
        self.edges.insert(gpio, edge);
    }
}

/// Transfers complete instantly: the completion signal is deposited
/// before `start_*` returns.
impl I2cPort for MockHardware {
    fn set_rails(&mut self, on: bool) {
        self.rails = on;
    }

    fn start_write(&mut self, addr: u8, data: &[u8]) -> Result<(), I2cError> {
        self.writes.push((addr, data.to_vec()));
        self.signals.deposit(ExternalSignal::WriteDone);
        Ok(())
    }

    fn finish_write(&mut self) -> Result<(), I2cError> {
        if self.nack { Err(I2cError::Nack) } else { Ok(()) }
    }

    fn start_read(&mut self, _addr: u8) -> Result<(), I2cError> {
        self.reads += 1;
        self.signals.deposit(ExternalSignal::ReadDone);
        Ok(())
    }

    fn finish_read(&mut self) -> Result<[u8; 2], I2cError> {
        if self.nack {
            Err(I2cError::Nack)
        } else {
            Ok(self.humidity_raw.to_be_bytes())
        }
    }
}

impl StoragePort for MockHardware {
    fn load(&self, key: PsKey, buf: &mut [u8]) -> Result<usize, StorageError> {
        let data = self.store.get(&key).ok_or(StorageError::NotFound)?;
        let n = data.len().min(buf.len());
        buf[..n].copy_from_slice(&data[..n]);
        Ok(data.len())
    }

    fn save(&mut self, key: PsKey, data: &[u8]) -> Result<(), StorageError> {
        self.saves.push((key, self.now_ms()));
        self.store.insert(key, data.to_vec());
        Ok(())
    }

    fn erase_all(&mut self) -> Result<(), StorageError> {
        self.erases += 1;
        self.store.clear();
        Ok(())
    }
}

impl ClockPort for MockHardware {
    fn now_ticks(&self) -> u64 {
        self.now
    }

    /// Jump to the wake deadline, never past the end of the current run.
    fn sleep(&mut self, mode: EnergyMode, wake_at: Option<u64>) {
        self.sleeps.push(mode);
        let wake = wake_at.unwrap_or(self.limit).min(self.limit);
        self.now = self.now.max(wake);
    }
}

// ── LogSink ───────────────────────────────────────────────────

#[derive(Default)]
pub struct LogSink {
    pub events: Vec<AppEvent>,
}

#[allow(dead_code)]
impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, pred: impl Fn(&AppEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }

    pub fn has(&self, event: &AppEvent) -> bool {
        self.events.contains(event)
    }
}

impl EventSink for LogSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}

// ── Node fixture ──────────────────────────────────────────────

/// A service wired to mock hardware and its own interrupt queues.
pub struct Node {
    pub app: AppService<'static, MockHardware>,
    pub hw: MockHardware,
    pub sink: LogSink,
    inbox: &'static MeshInbox,
    signals: &'static SignalQueue,
}

#[allow(dead_code)]
impl Node {
    /// A fresh, unprovisioned node.  Nothing has run yet.
    pub fn new(config: NodeConfig) -> Self {
        // each node gets its own queues for the life of the test binary
        let inbox: &'static MeshInbox = Box::leak(Box::new(MeshInbox::new()));
        let signals: &'static SignalQueue = Box::leak(Box::new(SignalQueue::new()));
        let mut hw = MockHardware::new(inbox, signals);
        let mut sink = LogSink::new();
        let mut app = AppService::new(config, signals, inbox);
        app.start(&mut hw, &mut sink);
        Self {
            app,
            hw,
            sink,
            inbox,
            signals,
        }
    }

    /// Boot a node that the mesh stack reports as already on a network.
    pub fn provisioned(config: NodeConfig) -> Self {
        let mut node = Self::new(config);
        node.hw.network = Some((NODE_ADDR, 0));
        node.boot();
        node
    }

    /// Deliver the stack boot event and let the node settle.
    pub fn boot(&mut self) {
        self.post(MeshEvent::SystemBoot);
        self.settle();
    }

    pub fn post(&mut self, event: MeshEvent) {
        assert!(self.inbox.try_send(event).is_ok(), "mesh inbox full");
    }

    pub fn signal(&mut self, signal: ExternalSignal) {
        self.signals.deposit(signal);
    }

    /// Deliver an event and run everything it makes due right now.
    pub fn deliver(&mut self, event: MeshEvent) {
        self.post(event);
        self.settle();
    }

    pub fn settle(&mut self) -> usize {
        self.app.run_until_idle(&mut self.hw, &mut self.sink)
    }

    /// Run the event loop for `ms` of virtual time, sleeping between
    /// deadlines the way the firmware loop does.
    pub fn run_for(&mut self, ms: u32) {
        let end = self.hw.now + ms_to_ticks(ms);
        self.run_to(end);
    }

    /// Run until the virtual clock reads `ms` since start.
    pub fn run_until(&mut self, ms: u32) {
        let end = ms_to_ticks(ms).max(self.hw.now);
        self.run_to(end);
    }

    fn run_to(&mut self, end: u64) {
        self.hw.limit = end;
        loop {
            self.settle();
            if self.hw.now >= end {
                break;
            }
            self.app.sleep(&mut self.hw);
        }
    }

    pub fn press(&mut self, pressed: bool) {
        self.hw.pins.insert(PB0_GPIO, !pressed);
        self.signal(ExternalSignal::ButtonEdge);
        self.settle();
    }

    pub fn motion(&mut self) {
        self.signal(ExternalSignal::MotionEdge);
        self.settle();
    }
}

/// A request to a primary-element server from `client`, response wanted.
#[allow(dead_code)]
pub fn request(client: u16, model: ModelId, request: GenericRequest) -> ServerRequest {
    ServerRequest {
        model,
        element: PRIMARY_ELEMENT,
        client,
        server: NODE_ADDR,
        appkey: 0,
        request,
        transition_ms: 0,
        delay_ms: 0,
        flags: RESPONSE_REQUIRED,
    }
}
