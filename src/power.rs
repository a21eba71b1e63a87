//! Sleep governor.
//!
//! Picks the deepest energy mode compatible with outstanding resource
//! claims.  A claim `block_below(mode)` forbids entering `mode` or any
//! deeper mode until the matching `release(mode)`.  Claims nest: each
//! mode keeps a counter.
//!
//! ```text
//!   EM0 (run) ── EM1 (sleep) ── EM2 (deep sleep) ── EM3 (stop)
//!                 ▲ I2C in flight      ▲ acquisition idle
//! ```

use log::debug;

/// Energy modes, shallowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum EnergyMode {
    /// Fully running.
    Em0 = 0,
    /// CPU sleep, peripherals clocked.
    Em1 = 1,
    /// Deep sleep: high-frequency clocks off, LF clock and RAM retained.
    Em2 = 2,
    /// Stop: only asynchronous wake sources.
    Em3 = 3,
}

impl EnergyMode {
    const fn index(self) -> usize {
        self as usize
    }

    const fn shallower(self) -> Self {
        match self {
            Self::Em0 | Self::Em1 => Self::Em0,
            Self::Em2 => Self::Em1,
            Self::Em3 => Self::Em2,
        }
    }
}

/// Deepest mode reachable without any claim.  EM3 stops the LF clock
/// that drives the soft timers, so the loop never goes below EM2.
pub const DEEPEST_WITH_TIMERS: EnergyMode = EnergyMode::Em2;

/// Reference-counted energy-mode claims.
#[derive(Debug, Default)]
pub struct SleepGovernor {
    blocks: [u8; 4],
}

impl SleepGovernor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forbid `mode` and everything deeper.
    pub fn block_below(&mut self, mode: EnergyMode) {
        let count = &mut self.blocks[mode.index()];
        *count = count.saturating_add(1);
        debug!("sleep: block {:?} (claims={})", mode, *count);
    }

    /// Release a claim taken with [`block_below`](Self::block_below).
    /// Releasing an unclaimed mode is a no-op.
    pub fn release(&mut self, mode: EnergyMode) {
        let count = &mut self.blocks[mode.index()];
        *count = count.saturating_sub(1);
        debug!("sleep: release {:?} (claims={})", mode, *count);
    }

    pub fn is_blocked(&self, mode: EnergyMode) -> bool {
        self.blocks[..=mode.index()].iter().any(|&c| c > 0)
    }

    /// Deepest mode currently permitted by the claims.
    pub fn deepest_allowed(&self) -> EnergyMode {
        let mut mode = DEEPEST_WITH_TIMERS;
        while mode != EnergyMode::Em0 && self.is_blocked(mode) {
            mode = mode.shallower();
        }
        mode
    }

    /// Mode to enter in the idle portion of the loop.  Pending work keeps
    /// the core running.
    pub fn select(&self, queue_empty: bool) -> EnergyMode {
        if queue_empty {
            self.deepest_allowed()
        } else {
            EnergyMode::Em0
        }
    }
}
