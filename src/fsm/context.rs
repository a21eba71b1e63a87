//! Blackboard shared by the acquisition state handlers.
//!
//! The sensor hub writes the current signal and any bus data in, steps
//! the machine, then takes the requested [`AcqCommands`] out and carries
//! them out against the I²C port, the timers and the sleep governor.

use crate::events::ExternalSignal;

// ---------------------------------------------------------------------------
// Commands (written by state handlers; consumed by the sensor hub)
// ---------------------------------------------------------------------------

/// Sleep-governor request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepClaim {
    /// Keep the bus clock up: nothing deeper than EM1.
    Block,
    Release,
}

/// Work requested by the handlers of one step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AcqCommands {
    /// Switch the sensor rails and I²C pins.
    pub rails: Option<bool>,
    pub sleep: Option<SleepClaim>,
    /// Wait for the rails to settle before the first transfer.
    pub rail_settle: bool,
    /// Issue the "measure humidity" command.
    pub start_write: bool,
    /// Arm the conversion wait.
    pub conversion_wait: bool,
    /// Issue the two-byte read.
    pub start_read: bool,
}

// ---------------------------------------------------------------------------
// FsmContext
// ---------------------------------------------------------------------------

pub struct FsmContext {
    // -- Timing --
    pub ticks_in_state: u64,
    pub total_ticks: u64,

    // -- Inputs --
    /// Signal being processed by this step, if any.
    pub signal: Option<ExternalSignal>,
    /// Bytes returned by the last completed read.
    pub raw: Option<[u8; 2]>,

    // -- Outputs --
    pub commands: AcqCommands,
    /// Converted sample waiting for the SAMPLE_COMPLETE signal (%RH).
    pub humidity: Option<f32>,

    // -- Bookkeeping --
    /// Whether this pipeline currently holds a sleep claim.
    pub sleep_blocked: bool,
    pub samples: u32,
}

impl FsmContext {
    pub fn new() -> Self {
        Self {
            ticks_in_state: 0,
            total_ticks: 0,
            signal: None,
            raw: None,
            commands: AcqCommands::default(),
            humidity: None,
            sleep_blocked: false,
            samples: 0,
        }
    }

    /// Whether the step is driven by `signal`.
    pub fn signalled(&self, signal: ExternalSignal) -> bool {
        self.signal == Some(signal)
    }

    /// Hand the accumulated commands to the executor.
    pub fn take_commands(&mut self) -> AcqCommands {
        core::mem::take(&mut self.commands)
    }
}

impl Default for FsmContext {
    fn default() -> Self {
        Self::new()
    }
}
