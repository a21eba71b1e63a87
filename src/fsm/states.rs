//! Acquisition state handlers and table builder.
//!
//! ```text
//!  POWER_OFF ──[wake]──▶ POWER_UP ──[rails settled]──▶ WRITE_START
//!      ▲                                                    │
//!      │                                               [write done]
//!      │                                                    ▼
//!  READ_COMPLETE ◀──[read done]── READ_START ◀──[wait]── WRITE_COMPLETE
//!      │
//!      └──[immediate]──▶ POWER_OFF
//!
//!  Any state ──[bus error]──▶ POWER_OFF   (forced by the sensor hub)
//! ```

use super::context::{FsmContext, SleepClaim};
use super::{StateDescriptor, StateId};
use crate::events::ExternalSignal;
use crate::sensors::humidity::humidity_from_raw;
use log::{debug, info};

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

pub fn build_state_table() -> [StateDescriptor; StateId::COUNT] {
    [
        StateDescriptor {
            id: StateId::PowerOff,
            name: "PowerOff",
            on_enter: Some(power_off_enter),
            on_exit: None,
            on_update: power_off_update,
        },
        StateDescriptor {
            id: StateId::PowerUp,
            name: "PowerUp",
            on_enter: Some(power_up_enter),
            on_exit: None,
            on_update: power_up_update,
        },
        StateDescriptor {
            id: StateId::WriteStart,
            name: "WriteStart",
            on_enter: Some(write_start_enter),
            on_exit: None,
            on_update: write_start_update,
        },
        StateDescriptor {
            id: StateId::WriteComplete,
            name: "WriteComplete",
            on_enter: Some(write_complete_enter),
            on_exit: None,
            on_update: write_complete_update,
        },
        StateDescriptor {
            id: StateId::ReadStart,
            name: "ReadStart",
            on_enter: Some(read_start_enter),
            on_exit: None,
            on_update: read_start_update,
        },
        StateDescriptor {
            id: StateId::ReadComplete,
            name: "ReadComplete",
            on_enter: Some(read_complete_enter),
            on_exit: None,
            on_update: read_complete_update,
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  POWER_OFF
// ═══════════════════════════════════════════════════════════════════════════

fn power_off_enter(ctx: &mut FsmContext) {
    ctx.commands.rails = Some(false);
    if ctx.sleep_blocked {
        ctx.commands.sleep = Some(SleepClaim::Release);
        ctx.sleep_blocked = false;
    }
}

fn power_off_update(ctx: &mut FsmContext) -> Option<StateId> {
    ctx.signalled(ExternalSignal::AcquisitionWake)
        .then_some(StateId::PowerUp)
}

// ═══════════════════════════════════════════════════════════════════════════
//  POWER_UP
// ═══════════════════════════════════════════════════════════════════════════

fn power_up_enter(ctx: &mut FsmContext) {
    ctx.commands.sleep = Some(SleepClaim::Block);
    ctx.sleep_blocked = true;
    ctx.commands.rails = Some(true);
    ctx.commands.rail_settle = true;
}

fn power_up_update(ctx: &mut FsmContext) -> Option<StateId> {
    ctx.signalled(ExternalSignal::RailsSettled)
        .then_some(StateId::WriteStart)
}

// ═══════════════════════════════════════════════════════════════════════════
//  WRITE_START / WRITE_COMPLETE
// ═══════════════════════════════════════════════════════════════════════════

fn write_start_enter(ctx: &mut FsmContext) {
    ctx.commands.start_write = true;
}

fn write_start_update(ctx: &mut FsmContext) -> Option<StateId> {
    ctx.signalled(ExternalSignal::WriteDone)
        .then_some(StateId::WriteComplete)
}

fn write_complete_enter(ctx: &mut FsmContext) {
    ctx.commands.conversion_wait = true;
}

fn write_complete_update(ctx: &mut FsmContext) -> Option<StateId> {
    ctx.signalled(ExternalSignal::ConversionDone)
        .then_some(StateId::ReadStart)
}

// ═══════════════════════════════════════════════════════════════════════════
//  READ_START / READ_COMPLETE
// ═══════════════════════════════════════════════════════════════════════════

fn read_start_enter(ctx: &mut FsmContext) {
    ctx.commands.start_read = true;
}

fn read_start_update(ctx: &mut FsmContext) -> Option<StateId> {
    ctx.signalled(ExternalSignal::ReadDone)
        .then_some(StateId::ReadComplete)
}

fn read_complete_enter(ctx: &mut FsmContext) {
    match ctx.raw.take() {
        Some(raw) => {
            let humidity = humidity_from_raw(u16::from_be_bytes(raw));
            info!("ACQ | humidity {:.2} %RH", humidity);
            ctx.humidity = Some(humidity);
            ctx.samples += 1;
        }
        None => debug!("ACQ | read completed without data"),
    }
}

fn read_complete_update(_ctx: &mut FsmContext) -> Option<StateId> {
    Some(StateId::PowerOff)
}
