//! Host simulation of the node's hardware.
//!
//! [`SimHardware`] implements every port of [`NodeHw`] against a virtual
//! 32 768 Hz clock.  Mesh-stack completions are posted to the mesh inbox
//! and I²C completions are deposited as external signals, so the event
//! loop sees the same asynchronous shape as on the board.
//!
//! [`NodeHw`]: crate::app::ports::NodeHw

use std::collections::HashMap;

use log::{debug, info};

use crate::app::ports::{
    ClockPort, DisplayPort, Edge, GpioPort, I2cPort, IndicatorPort, LcServerPort, LcdRow, LedPort,
    LedState, MeshPort, ResetMode, StoragePort,
};
use crate::error::{I2cError, MeshError, StorageError};
use crate::events::{ExternalSignal, SignalQueue};
use crate::mesh::inbox::MeshInbox;
use crate::mesh::models::{ModelId, OnOff, ServerStatus, StateKind};
use crate::mesh::MeshEvent;
use crate::pins::{PB0_GPIO, PB1_GPIO};
use crate::power::EnergyMode;
use crate::store::PsKey;
use crate::timer::{TICKS_PER_SEC, ms_to_ticks};

/// Simulated time an I²C transfer takes.
const I2C_TRANSFER_TICKS: u64 = ms_to_ticks(1);

/// One linear LED ramp.
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
        let elapsed = now.saturating_sub(self.start) as i64;
        let span = i64::from(self.to) - i64::from(self.from);
        (i64::from(self.from) + span * elapsed / self.ticks as i64) as u16
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transfer {
    Write,
    Read,
}

pub struct SimHardware<'q> {
    inbox: &'q MeshInbox,
    signals: &'q SignalQueue,
    now: u64,

    // mesh stack
    bt_address: [u8; 6],
    provisioned: Option<(u16, u32)>,
    pub registered: Vec<(ModelId, u16)>,
    pub published: Vec<(ModelId, u16)>,
    pub responses: usize,
    pub reset: Option<ResetMode>,

    // LC server
    pub lc_mode: u8,

    // outputs
    level: Ramp,
    temperature: Ramp,
    pub led_state: Option<LedState>,
    pub alert: bool,
    pub status_led: bool,
    pub rows: HashMap<LcdRow, String>,

    // inputs
    pins: HashMap<i32, bool>,
    pub edges: HashMap<i32, Edge>,

    // sensor bus
    pub rails: bool,
    transfer: Option<Transfer>,
    /// Completion time of the in-flight transfer, until it is signalled.
    done_at: Option<u64>,
    /// Raw humidity word returned by the next read.
    pub humidity_raw: u16,

    // flash
    store: HashMap<u16, Vec<u8>>,

    /// Ticks spent in each energy mode (index = mode).
    pub sleep_ticks: [u64; 4],
    /// Extra wake source for scripted stimuli.
    alarm: Option<u64>,
}

impl<'q> SimHardware<'q> {
    pub fn new(inbox: &'q MeshInbox, signals: &'q SignalQueue) -> Self {
        let mut pins = HashMap::new();
        pins.insert(PB0_GPIO, true);
        pins.insert(PB1_GPIO, true);
        Self {
            inbox,
            signals,
            now: 0,
            bt_address: [0x3c, 0x5a, 0x10, 0xe4, 0x0b, 0x00],
            provisioned: None,
            registered: Vec::new(),
            published: Vec::new(),
            responses: 0,
            reset: None,
            lc_mode: 0,
            level: Ramp::default(),
            temperature: Ramp::default(),
            led_state: None,
            alert: false,
            status_led: false,
            rows: HashMap::new(),
            pins,
            edges: HashMap::new(),
            rails: false,
            transfer: None,
            done_at: None,
            humidity_raw: 0x8000,
            store: HashMap::new(),
            sleep_ticks: [0; 4],
            alarm: None,
        }
    }

    /// Start as a node already on a network.
    pub fn with_network(mut self, address: u16, iv_index: u32) -> Self {
        self.provisioned = Some((address, iv_index));
        self
    }

    pub fn post(&self, event: MeshEvent) {
        if self.inbox.try_send(event).is_err() {
            debug!("SIM | inbox full");
        }
    }

    /// Drive an input pin level.
    pub fn set_pin(&mut self, gpio: i32, high: bool) {
        self.pins.insert(gpio, high);
    }

    pub fn row(&self, row: LcdRow) -> &str {
        self.rows.get(&row).map_or("", String::as_str)
    }

    /// Wake the next sleep no later than `ticks`.
    pub fn set_alarm(&mut self, ticks: u64) {
        self.alarm = Some(ticks);
    }

    pub fn now_ms(&self) -> u64 {
        self.now * 1000 / TICKS_PER_SEC
    }

    /// Advance virtual time, completing any I²C transfer that finishes on
    /// the way.
    pub fn advance_to(&mut self, ticks: u64) {
        if let Some(done_at) = self.transfer_done_at() {
            if done_at <= ticks {
                self.now = self.now.max(done_at);
                self.complete_transfer();
            }
        }
        self.now = self.now.max(ticks);
    }

    fn transfer_done_at(&self) -> Option<u64> {
        self.done_at
    }

    fn complete_transfer(&mut self) {
        self.done_at = None;
        let signal = match self.transfer {
            Some(Transfer::Write) => ExternalSignal::WriteDone,
            Some(Transfer::Read) => ExternalSignal::ReadDone,
            None => return,
        };
        self.signals.deposit(signal);
    }
}

impl MeshPort for SimHardware<'_> {
    fn bt_address(&self) -> [u8; 6] {
        self.bt_address
    }

    fn set_device_name(&mut self, name: &str) -> Result<(), MeshError> {
        info!("SIM | device name '{}'", name);
        Ok(())
    }

    fn node_init(&mut self) -> Result<(), MeshError> {
        let (address, iv_index) = self.provisioned.unwrap_or((0, 0));
        self.post(MeshEvent::NodeInitialized {
            provisioned: self.provisioned.is_some(),
            address,
            iv_index,
        });
        Ok(())
    }

    fn start_unprov_beaconing(&mut self, bearers: u8) -> Result<(), MeshError> {
        info!("SIM | beaconing on bearers 0x{:02x}", bearers);
        Ok(())
    }

    fn generic_server_init(&mut self) -> Result<(), MeshError> {
        Ok(())
    }

    fn lib_init(&mut self, max_models: u8) -> Result<(), MeshError> {
        debug!("SIM | model library sized for {}", max_models);
        Ok(())
    }

    fn friend_init(&mut self) -> Result<(), MeshError> {
        Ok(())
    }

    fn register_model(&mut self, model: ModelId, element: u16) -> Result<(), MeshError> {
        self.registered.push((model, element));
        Ok(())
    }

    fn server_respond(
        &mut self,
        client: u16,
        _appkey: u16,
        status: &ServerStatus,
        _flags: u8,
    ) -> Result<(), MeshError> {
        debug!("SIM | respond {:?} to 0x{:04x}", status.current, client);
        self.responses += 1;
        Ok(())
    }

    fn server_update(&mut self, _status: &ServerStatus) -> Result<(), MeshError> {
        Ok(())
    }

    fn server_publish(
        &mut self,
        model: ModelId,
        element: u16,
        _kind: StateKind,
    ) -> Result<(), MeshError> {
        self.published.push((model, element));
        Ok(())
    }

    fn scene_server_init(&mut self, _element: u16) -> Result<(), MeshError> {
        Ok(())
    }

    fn close_connection(&mut self, handle: u8) -> Result<(), MeshError> {
        self.post(MeshEvent::ConnectionClosed { handle, reason: 0 });
        Ok(())
    }

    fn ota_write_response(&mut self, _handle: u8) -> Result<(), MeshError> {
        Ok(())
    }

    fn system_reset(&mut self, mode: ResetMode) {
        info!("SIM | system reset ({:?})", mode);
        self.reset = Some(mode);
    }
}

impl LcServerPort for SimHardware<'_> {
    fn lc_server_init(&mut self, _element: u16) -> Result<(), MeshError> {
        Ok(())
    }

    fn lc_set_regulator_interval(&mut self, _element: u16, interval_ms: u16) -> Result<(), MeshError> {
        debug!("SIM | LC regulator every {} ms", interval_ms);
        Ok(())
    }

    fn lc_update_mode(&mut self, _element: u16, mode: u8) -> Result<(), MeshError> {
        self.lc_mode = mode;
        Ok(())
    }

    fn lc_update_om(&mut self, _element: u16, _om: u8) -> Result<(), MeshError> {
        Ok(())
    }

    fn lc_update_light_onoff(
        &mut self,
        _element: u16,
        _value: OnOff,
        _remaining_ms: u32,
    ) -> Result<(), MeshError> {
        Ok(())
    }

    fn lc_update_property(&mut self, _element: u16, _id: u16, _data: &[u8]) -> Result<(), MeshError> {
        Ok(())
    }
}

impl LedPort for SimHardware<'_> {
    fn set_level(&mut self, level: u16, transition_ms: u32) {
        self.level = Ramp {
            from: self.level.sample(self.now),
            to: level,
            start: self.now,
            ticks: ms_to_ticks(transition_ms),
        };
    }

    fn set_temperature(&mut self, temperature: u16, _deltauv: i16, transition_ms: u32) {
        self.temperature = Ramp {
            from: self.temperature.sample(self.now),
            to: temperature,
            start: self.now,
            ticks: ms_to_ticks(transition_ms),
        };
    }

    fn set_state(&mut self, state: LedState) {
        self.led_state = Some(state);
    }

    fn level(&self) -> u16 {
        self.level.sample(self.now)
    }

    fn temperature(&self) -> u16 {
        self.temperature.sample(self.now)
    }
}

impl IndicatorPort for SimHardware<'_> {
    fn red_alert(&mut self) {
        self.alert = true;
    }

    fn clear_alert(&mut self) {
        self.alert = false;
    }

    fn toggle_status(&mut self) {
        self.status_led = !self.status_led;
    }
}

impl DisplayPort for SimHardware<'_> {
    fn write_row(&mut self, row: LcdRow, text: &str) {
        debug!("LCD | {:?}: {}", row, text);
        self.rows.insert(row, text.to_owned());
    }
}

impl GpioPort for SimHardware<'_> {
    fn pin_read(&self, gpio: i32) -> bool {
        self.pins.get(&gpio).copied().unwrap_or(true)
    }

    fn configure_edge(&mut self, gpio: i32, edge: Edge) {
        self.edges.insert(gpio, edge);
    }
}

impl I2cPort for SimHardware<'_> {
    fn set_rails(&mut self, on: bool) {
        self.rails = on;
    }

    fn start_write(&mut self, _addr: u8, _data: &[u8]) -> Result<(), I2cError> {
        if self.transfer.is_some() {
            return Err(I2cError::Busy);
        }
        if !self.rails {
            return Err(I2cError::Nack);
        }
        self.transfer = Some(Transfer::Write);
        self.done_at = Some(self.now + I2C_TRANSFER_TICKS);
        Ok(())
    }

    fn finish_write(&mut self) -> Result<(), I2cError> {
        match self.transfer.take() {
            Some(Transfer::Write) => Ok(()),
            _ => Err(I2cError::Bus),
        }
    }

    fn start_read(&mut self, _addr: u8) -> Result<(), I2cError> {
        if self.transfer.is_some() {
            return Err(I2cError::Busy);
        }
        self.transfer = Some(Transfer::Read);
        self.done_at = Some(self.now + I2C_TRANSFER_TICKS);
        Ok(())
    }

    fn finish_read(&mut self) -> Result<[u8; 2], I2cError> {
        match self.transfer.take() {
            Some(Transfer::Read) => Ok(self.humidity_raw.to_be_bytes()),
            _ => Err(I2cError::Bus),
        }
    }
}

impl StoragePort for SimHardware<'_> {
    fn load(&self, key: PsKey, buf: &mut [u8]) -> Result<usize, StorageError> {
        let data = self.store.get(&key.0).ok_or(StorageError::NotFound)?;
        let len = data.len().min(buf.len());
        buf[..len].copy_from_slice(&data[..len]);
        Ok(data.len())
    }

    fn save(&mut self, key: PsKey, data: &[u8]) -> Result<(), StorageError> {
        self.store.insert(key.0, data.to_vec());
        Ok(())
    }

    fn erase_all(&mut self) -> Result<(), StorageError> {
        self.store.clear();
        Ok(())
    }
}

impl ClockPort for SimHardware<'_> {
    fn now_ticks(&self) -> u64 {
        self.now
    }

    /// Sleep until the first wake source: the caller's deadline, the
    /// in-flight I²C transfer or the scripted alarm.
    fn sleep(&mut self, mode: EnergyMode, wake_at: Option<u64>) {
        let wake = [wake_at, self.transfer_done_at(), self.alarm.take()]
            .into_iter()
            .flatten()
            .min()
            .unwrap_or(self.now + TICKS_PER_SEC);
        let before = self.now;
        self.advance_to(wake);
        self.sleep_ticks[mode as usize] += self.now - before;
    }
}
