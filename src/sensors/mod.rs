//! Sensor subsystem: the humidity acquisition pipeline.
//!
//! The [`SensorHub`] owns the acquisition state machine and the humidity
//! history.  It feeds acquisition signals into the machine, then carries
//! out the commands the state handlers posted: rail switching, bus
//! transfers, wait timers and sleep claims.
//!
//! ```text
//!  ExternalSignal ──▶ SensorHub ──▶ Fsm (pure) ──▶ AcqCommands
//!                         │                            │
//!                         ◀────────── execute ─────────┘
//!                    I2cPort · TimerService · SleepGovernor
//! ```

pub mod humidity;

use log::{info, warn};

use crate::app::ports::I2cPort;
use crate::config::NodeConfig;
use crate::error::I2cError;
use crate::events::{ExternalSignal, SignalQueue};
use crate::fsm::context::{AcqCommands, FsmContext, SleepClaim};
use crate::fsm::{Fsm, StateId, states};
use crate::pins::SI7021_ADDR;
use crate::power::{EnergyMode, SleepGovernor};
use crate::timer::{TimerId, TimerService};
use humidity::{HumidityHistory, MEASURE_RH_NO_HOLD};

/// Bound on chained immediate transitions within one signal.
const MAX_CHAIN: usize = StateId::COUNT;

pub struct SensorHub {
    fsm: Fsm,
    ctx: FsmContext,
    history: HumidityHistory,
    period_ms: u32,
    conversion_wait_ms: u32,
    rail_settle_ms: u32,
    bus_errors: u32,
}

impl SensorHub {
    pub fn new(config: &NodeConfig) -> Self {
        Self {
            fsm: Fsm::new(states::build_state_table(), StateId::PowerOff),
            ctx: FsmContext::new(),
            history: HumidityHistory::new(),
            period_ms: config.acquisition_period_ms,
            conversion_wait_ms: config.conversion_wait_ms,
            rail_settle_ms: config.rail_settle_ms,
            bus_errors: 0,
        }
    }

    /// Enter POWER_OFF and apply its actions (rails off).
    pub fn init(
        &mut self,
        timers: &mut TimerService,
        hw: &mut impl I2cPort,
        sleep: &mut SleepGovernor,
        signals: &SignalQueue,
    ) {
        self.fsm.start(&mut self.ctx);
        self.execute(timers, hw, sleep, signals);
    }

    /// Start periodic acquisition.
    pub fn start(&mut self, timers: &mut TimerService) {
        info!("ACQ | periodic acquisition every {} ms", self.period_ms);
        if let Err(e) = timers.set(TimerId::AcquisitionWake, self.period_ms, true) {
            warn!("ACQ | cannot arm wake timer: {}", e);
        }
    }

    pub fn stop(&mut self, timers: &mut TimerService) {
        timers.cancel(TimerId::AcquisitionWake);
    }

    pub fn state(&self) -> StateId {
        self.fsm.current_state()
    }

    pub fn history(&self) -> &HumidityHistory {
        &self.history
    }

    pub fn samples(&self) -> u32 {
        self.ctx.samples
    }

    pub fn bus_errors(&self) -> u32 {
        self.bus_errors
    }

    /// Translate an acquisition timer into its signal.  Returns `false`
    /// for handles the hub does not own.
    pub fn handle_timer(&mut self, id: TimerId, signals: &SignalQueue) -> bool {
        let signal = match id {
            TimerId::AcquisitionWake => ExternalSignal::AcquisitionWake,
            TimerId::ConversionWait => ExternalSignal::ConversionDone,
            TimerId::RailSettle => ExternalSignal::RailsSettled,
            _ => return false,
        };
        signals.deposit(signal);
        true
    }

    /// Advance the pipeline on one of the `0x02..=0x06` signals.
    pub fn step(
        &mut self,
        signal: ExternalSignal,
        timers: &mut TimerService,
        hw: &mut impl I2cPort,
        sleep: &mut SleepGovernor,
        signals: &SignalQueue,
    ) {
        // Completion interrupts are only meaningful in the state that
        // started the transfer.
        let collected = match (signal, self.fsm.current_state()) {
            (ExternalSignal::WriteDone, StateId::WriteStart) => hw.finish_write().map(|()| None),
            (ExternalSignal::ReadDone, StateId::ReadStart) => hw.finish_read().map(Some),
            _ => Ok(None),
        };
        match collected {
            Ok(raw) => {
                if raw.is_some() {
                    self.ctx.raw = raw;
                }
            }
            Err(e) => {
                self.abort(e, timers, hw, sleep, signals);
                return;
            }
        }

        self.ctx.signal = Some(signal);
        let mut moved = self.fsm.tick(&mut self.ctx);
        self.ctx.signal = None;
        let mut chained = 0;
        while moved && chained < MAX_CHAIN {
            self.execute(timers, hw, sleep, signals);
            moved = self.fsm.tick(&mut self.ctx);
            chained += 1;
        }
        self.execute(timers, hw, sleep, signals);

        if self.ctx.humidity.is_some() {
            signals.deposit(ExternalSignal::SampleComplete);
        }
    }

    /// Move the converted sample into the history.  Called on
    /// SAMPLE_COMPLETE.
    pub fn collect_sample(&mut self) -> Option<f32> {
        let humidity = self.ctx.humidity.take()?;
        self.history.push(humidity);
        Some(humidity)
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    /// Carry out the commands posted by the last step.
    fn execute(
        &mut self,
        timers: &mut TimerService,
        hw: &mut impl I2cPort,
        sleep: &mut SleepGovernor,
        signals: &SignalQueue,
    ) {
        let AcqCommands {
            rails,
            sleep: claim,
            rail_settle,
            start_write,
            conversion_wait,
            start_read,
        } = self.ctx.take_commands();

        match claim {
            Some(SleepClaim::Block) => sleep.block_below(EnergyMode::Em2),
            Some(SleepClaim::Release) => sleep.release(EnergyMode::Em2),
            None => {}
        }
        if let Some(on) = rails {
            hw.set_rails(on);
        }
        if rail_settle {
            if self.rail_settle_ms == 0 {
                signals.deposit(ExternalSignal::RailsSettled);
            } else {
                arm(timers, TimerId::RailSettle, self.rail_settle_ms);
            }
        }
        if conversion_wait {
            arm(timers, TimerId::ConversionWait, self.conversion_wait_ms);
        }

        let transfer = if start_write {
            hw.start_write(SI7021_ADDR, &[MEASURE_RH_NO_HOLD])
        } else if start_read {
            hw.start_read(SI7021_ADDR)
        } else {
            Ok(())
        };
        if let Err(e) = transfer {
            self.abort(e, timers, hw, sleep, signals);
        }
    }

    /// Bus failure: log, power down and wait for the next periodic wake.
    fn abort(
        &mut self,
        error: I2cError,
        timers: &mut TimerService,
        hw: &mut impl I2cPort,
        sleep: &mut SleepGovernor,
        signals: &SignalQueue,
    ) {
        self.bus_errors = self.bus_errors.saturating_add(1);
        warn!(
            "ACQ | I2C error in {}: {}, powering off",
            self.fsm.current_name(),
            error
        );
        timers.cancel(TimerId::ConversionWait);
        timers.cancel(TimerId::RailSettle);
        self.ctx.raw = None;
        self.fsm.force_transition(StateId::PowerOff, &mut self.ctx);
        self.execute(timers, hw, sleep, signals);
    }
}

fn arm(timers: &mut TimerService, id: TimerId, delay_ms: u32) {
    if let Err(e) = timers.set(id, delay_ms, false) {
        warn!("ACQ | cannot arm {:?}: {}", id, e);
    }
}
