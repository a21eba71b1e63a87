//! Function-pointer state machine driving the humidity acquisition
//! pipeline.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  StateTable                                                  │
//! │  ┌───────────────┬───────────┬──────────┬──────────────────┐ │
//! │  │ StateId       │ on_enter  │ on_exit  │ on_update        │ │
//! │  ├───────────────┼───────────┼──────────┼──────────────────┤ │
//! │  │ PowerOff      │ fn(ctx)   │    -     │ fn(ctx)->Option<>│ │
//! │  │ PowerUp       │ fn(ctx)   │    -     │ fn(ctx)->Option<>│ │
//! │  │ WriteStart    │ fn(ctx)   │    -     │ fn(ctx)->Option<>│ │
//! │  │ WriteComplete │ fn(ctx)   │    -     │ fn(ctx)->Option<>│ │
//! │  │ ReadStart     │ fn(ctx)   │    -     │ fn(ctx)->Option<>│ │
//! │  │ ReadComplete  │ fn(ctx)   │    -     │ fn(ctx)->Option<>│ │
//! │  └───────────────┴───────────┴──────────┴──────────────────┘ │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The engine is stepped once per acquisition signal.  `on_update` of the
//! current state inspects `ctx.signal`; `Some(next)` runs `on_exit` of the
//! current state, then `on_enter` of the next.  Handlers never touch the
//! bus: they post requests into `ctx.commands`, which the sensor hub
//! carries out after each step.

pub mod context;
pub mod states;

use context::FsmContext;
use log::info;

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Acquisition states.
/// Must stay in sync with the table built in [`states::build_state_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StateId {
    PowerOff = 0,
    PowerUp = 1,
    WriteStart = 2,
    WriteComplete = 3,
    ReadStart = 4,
    ReadComplete = 5,
}

impl StateId {
    pub const COUNT: usize = 6;

    /// Convert an index back to `StateId`.  Out-of-range indices assert in
    /// debug builds and fall back to `PowerOff`.
    pub fn from_index(idx: usize) -> Self {
        match idx {
            0 => Self::PowerOff,
            1 => Self::PowerUp,
            2 => Self::WriteStart,
            3 => Self::WriteComplete,
            4 => Self::ReadStart,
            5 => Self::ReadComplete,
            _ => {
                debug_assert!(false, "invalid state index: {idx}");
                Self::PowerOff
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Function-pointer type aliases
// ---------------------------------------------------------------------------

/// `on_enter` / `on_exit` action.
pub type StateActionFn = fn(&mut FsmContext);

/// Per-step handler.  `Some(next)` triggers a transition.
pub type StateUpdateFn = fn(&mut FsmContext) -> Option<StateId>;

// ---------------------------------------------------------------------------
// State descriptor (one row in the table)
// ---------------------------------------------------------------------------

pub struct StateDescriptor {
    pub id: StateId,
    pub name: &'static str,
    pub on_enter: Option<StateActionFn>,
    pub on_exit: Option<StateActionFn>,
    pub on_update: StateUpdateFn,
}

// ---------------------------------------------------------------------------
// FSM engine
// ---------------------------------------------------------------------------

pub struct Fsm {
    /// Indexed by `StateId as usize`.
    table: [StateDescriptor; StateId::COUNT],
    current: usize,
    tick_count: u64,
    state_entry_tick: u64,
}

impl Fsm {
    pub fn new(table: [StateDescriptor; StateId::COUNT], initial: StateId) -> Self {
        Self {
            table,
            current: initial as usize,
            tick_count: 0,
            state_entry_tick: 0,
        }
    }

    /// Run the initial `on_enter`.  Call once, before the first `tick()`.
    pub fn start(&mut self, ctx: &mut FsmContext) {
        info!("FSM starting in state: {}", self.table[self.current].name);
        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }

    /// Step the machine once.  Returns `true` if a transition was taken.
    pub fn tick(&mut self, ctx: &mut FsmContext) -> bool {
        self.tick_count += 1;
        ctx.ticks_in_state = self.tick_count - self.state_entry_tick;
        ctx.total_ticks = self.tick_count;

        match (self.table[self.current].on_update)(ctx) {
            Some(next_id) => {
                self.transition(next_id, ctx);
                true
            }
            None => false,
        }
    }

    /// Jump straight to `next` (bus errors abort to `PowerOff`).
    pub fn force_transition(&mut self, next: StateId, ctx: &mut FsmContext) {
        if next as usize != self.current {
            self.transition(next, ctx);
        }
    }

    pub fn current_state(&self) -> StateId {
        StateId::from_index(self.current)
    }

    pub fn current_name(&self) -> &'static str {
        self.table[self.current].name
    }

    pub fn ticks_in_current_state(&self) -> u64 {
        self.tick_count - self.state_entry_tick
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn transition(&mut self, next_id: StateId, ctx: &mut FsmContext) {
        let next_idx = next_id as usize;

        info!(
            "FSM transition: {} -> {}",
            self.table[self.current].name, self.table[next_idx].name
        );

        if let Some(exit) = self.table[self.current].on_exit {
            exit(ctx);
        }

        self.current = next_idx;
        self.state_entry_tick = self.tick_count;
        ctx.ticks_in_state = 0;

        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }
}
